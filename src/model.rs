use crate::nav::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAction {
    Navigate(Node),
    Back,
    Accept,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub text: String,
    pub kind: String,
    pub matching_terms: Vec<String>,
    pub selectable: bool,
    pub on_enter: Option<ItemAction>,
    pub back: bool,
    pub padding_top: u16,
}

impl Item {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: String::new(),
            matching_terms: Vec::new(),
            selectable: true,
            on_enter: None,
            back: false,
            padding_top: 0,
        }
    }

    pub fn back_to(label: &str) -> Self {
        let mut item = Self::new("..").kind(label).on_enter(ItemAction::Back);
        item.back = true;
        item
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn matching_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matching_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_enter(mut self, action: ItemAction) -> Self {
        self.on_enter = Some(action);
        self
    }

    pub fn unselectable(mut self) -> Self {
        self.selectable = false;
        self.on_enter = None;
        self
    }

    pub fn padding_top(mut self, lines: u16) -> Self {
        self.padding_top = lines;
        self
    }

    pub fn matches(&self, filter: &str) -> bool {
        let needle = filter.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.text.to_ascii_lowercase().contains(&needle)
            || self
                .matching_terms
                .iter()
                .any(|term| term.to_ascii_lowercase().contains(&needle))
    }
}

pub fn sort_items(items: &mut [Item]) {
    items.sort_by(|left, right| left.text.cmp(&right.text));
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceIngress {
    pub host: String,
    pub ca_data: Vec<u8>,
}
