use anyhow::Result;
use ratatui::text::Line;

use crate::input::Action;
use crate::model::{Item, ItemAction};
use crate::nav::{Session, Step};

const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    Apply(ItemAction),
}

#[derive(Debug)]
pub struct App {
    session: Session,
    items: Vec<Item>,
    selected: usize,
    mode: InputMode,
    filter: String,
    status: String,
    loading: bool,
    running: bool,
    termination: Option<String>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(Session::default())
    }
}

impl App {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            items: Vec::new(),
            selected: 0,
            mode: InputMode::Normal,
            filter: String::new(),
            status: String::new(),
            loading: false,
            running: true,
            termination: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn breadcrumbs(&self) -> Line<'static> {
        self.session.breadcrumbs()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self) {
        self.loading = true;
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn termination(&self) -> Option<&str> {
        self.termination.as_deref()
    }

    pub fn visible_items(&self) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|item| item.back || item.matches(&self.filter))
            .collect()
    }

    pub fn selected_index(&self) -> Option<usize> {
        let visible = self.visible_items();
        visible
            .get(self.selected)
            .filter(|item| item.selectable)
            .map(|_| self.selected)
    }

    pub fn set_items(&mut self, listing: Result<Vec<Item>>) {
        self.loading = false;
        match listing {
            Ok(items) => {
                self.items = items;
                self.status.clear();
            }
            Err(error) => {
                self.items.clear();
                self.status = format!("{error:#}");
            }
        }
        self.select_first();
    }

    pub fn finish_step(&mut self, step: Result<Step>) -> bool {
        self.loading = false;
        match step {
            Ok(Step::Moved(session)) => {
                self.session = session;
                self.items.clear();
                self.filter.clear();
                self.mode = InputMode::Normal;
                self.selected = 0;
                true
            }
            Ok(Step::Terminated(message)) => {
                self.termination = Some(message);
                self.running = false;
                false
            }
            Err(error) => {
                self.status = format!("{error:#}");
                false
            }
        }
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Quit => {
                self.running = false;
                AppCommand::None
            }
            Action::Down => {
                self.move_selection(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_selection(-1);
                AppCommand::None
            }
            Action::PageDown => {
                self.move_selection(PAGE_SIZE as isize);
                AppCommand::None
            }
            Action::PageUp => {
                self.move_selection(-(PAGE_SIZE as isize));
                AppCommand::None
            }
            Action::Top => {
                self.select_first();
                AppCommand::None
            }
            Action::Bottom => {
                if let Some(last) = self.selectable_positions().last() {
                    self.selected = *last;
                }
                AppCommand::None
            }
            Action::Enter => self.enter_selected(),
            Action::Back => {
                if self.session.node().as_back().is_some() {
                    AppCommand::Apply(ItemAction::Back)
                } else {
                    AppCommand::None
                }
            }
            Action::StartFilter => {
                self.mode = InputMode::Filter;
                AppCommand::None
            }
            Action::SubmitInput => {
                self.mode = InputMode::Normal;
                self.enter_selected()
            }
            Action::CancelInput => {
                self.mode = InputMode::Normal;
                self.filter.clear();
                self.select_first();
                AppCommand::None
            }
            Action::Backspace => {
                self.filter.pop();
                self.select_first();
                AppCommand::None
            }
            Action::InputChar(c) => {
                self.filter.push(c);
                self.select_first();
                AppCommand::None
            }
        }
    }

    fn enter_selected(&self) -> AppCommand {
        let visible = self.visible_items();
        match visible.get(self.selected) {
            Some(item) if item.selectable => item
                .on_enter
                .clone()
                .map_or(AppCommand::None, AppCommand::Apply),
            _ => AppCommand::None,
        }
    }

    fn selectable_positions(&self) -> Vec<usize> {
        self.visible_items()
            .iter()
            .enumerate()
            .filter(|(_, item)| item.selectable)
            .map(|(position, _)| position)
            .collect()
    }

    // The ".." row is only preselected when nothing else can be.
    fn select_first(&mut self) {
        let visible = self.visible_items();
        let first_forward = visible
            .iter()
            .position(|item| item.selectable && !item.back);
        let first_any = visible.iter().position(|item| item.selectable);
        self.selected = first_forward.or(first_any).unwrap_or(0);
    }

    fn move_selection(&mut self, delta: isize) {
        let positions = self.selectable_positions();
        if positions.is_empty() {
            return;
        }
        let current = positions
            .iter()
            .position(|position| *position == self.selected)
            .unwrap_or(0);
        let last = positions.len() as isize - 1;
        let target = (current as isize + delta).clamp(0, last) as usize;
        self.selected = positions[target];
    }
}
