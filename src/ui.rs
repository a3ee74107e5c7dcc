use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::app::{App, InputMode};
use crate::model::Item;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_list(frame, root[1], app);
    render_footer(frame, root[2], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        " spacectx ",
        Style::default()
            .fg(Color::Black)
            .bg(ACCENT)
            .add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::raw(" "));
    spans.extend(app.breadcrumbs().spans);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG).fg(Color::White)),
        area,
    );
}

fn render_list(frame: &mut Frame, area: Rect, app: &App) {
    let visible = app.visible_items();
    let rows = visible.iter().map(|item| list_row(item)).collect::<Vec<_>>();

    let title = if app.filter().is_empty() {
        format!("Items ({})", visible.len())
    } else {
        format!("Items ({}) filter: {}", visible.len(), app.filter())
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    let list = List::new(rows)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.selected_index());
    frame.render_stateful_widget(list, area, &mut state);
}

fn list_row(item: &Item) -> ListItem<'static> {
    let text_style = if item.selectable {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(MUTED).add_modifier(Modifier::ITALIC)
    };

    let mut spans = vec![Span::styled(item.text.clone(), text_style)];
    if !item.kind.is_empty() {
        spans.push(Span::styled(format!("  {}", item.kind), Style::default().fg(MUTED)));
    }

    let mut lines = vec![Line::default(); usize::from(item.padding_top)];
    lines.push(Line::from(spans));
    ListItem::new(lines)
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let line = match app.mode() {
        InputMode::Filter => Line::from(vec![
            Span::styled(" / ", Style::default().fg(Color::Black).bg(WARN)),
            Span::raw(format!(" {}", app.filter())),
        ]),
        InputMode::Normal if app.loading() => Line::from(Span::styled(
            " loading...",
            Style::default().fg(WARN),
        )),
        InputMode::Normal if !app.status().is_empty() => Line::from(Span::styled(
            format!(" {}", app.status()),
            Style::default().fg(ERROR),
        )),
        InputMode::Normal => Line::from(Span::styled(
            " enter/l select  h/backspace back  / filter  q quit",
            Style::default().fg(MUTED),
        )),
    };
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);
}
