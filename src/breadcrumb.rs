use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

const NEUTRAL: Color = Color::Rgb(154, 156, 167);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreadcrumbStyle {
    pub previous_level: Style,
    pub current_level: Style,
}

impl Default for BreadcrumbStyle {
    fn default() -> Self {
        Self {
            previous_level: Style::default().fg(NEUTRAL),
            current_level: Style::default(),
        }
    }
}

impl BreadcrumbStyle {
    pub fn dimmed(&self) -> Self {
        Self {
            previous_level: self.previous_level,
            current_level: self.previous_level,
        }
    }

    pub fn current(&self, text: impl Into<String>) -> Span<'static> {
        Span::styled(text.into(), self.current_level)
    }
}

pub fn to_line(spans: Vec<Span<'static>>) -> Line<'static> {
    Line::from(spans)
}

pub fn plain_text(line: &Line<'_>) -> String {
    line.spans
        .iter()
        .map(|span| span.content.as_ref())
        .collect::<String>()
}
