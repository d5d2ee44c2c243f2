use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use infradeck_core::app::App;
use infradeck_core::form::{Form, FormField};

use super::styles;

const LABEL_WIDTH: usize = 26;
const PREFIX: &str = " > ";

/// Text shown for a field's value; choice fields get cycle arrows and an
/// option counter
pub fn display_value(field: &FormField, awaiting: bool) -> String {
    if !field.is_choice() {
        return field.value().to_string();
    }
    let options = field.options();
    if options.is_empty() {
        return if awaiting {
            "loading options...".to_string()
        } else if field.value().is_empty() {
            "‹ no options ›".to_string()
        } else {
            format!("‹ {} ›", field.value())
        };
    }
    let position = options
        .iter()
        .position(|o| o == field.value())
        .map(|i| format!("{}/{}", i + 1, options.len()))
        .unwrap_or_else(|| format!("-/{}", options.len()));
    format!("‹ {} › ({})", field.value(), position)
}

fn field_line(field: &FormField, focused: bool, awaiting: bool) -> Line<'static> {
    let marker = if field.is_dirty() { "•" } else { " " };
    let label = format!("{} {:<width$}", marker, field.label(), width = LABEL_WIDTH - 2);
    let value = display_value(field, awaiting && field.is_choice() && field.options().is_empty());

    let (label_style, value_style) = if focused {
        (styles::accent().add_modifier(Modifier::BOLD), styles::selection())
    } else {
        (styles::text_dim(), styles::text())
    };
    Line::from(vec![
        Span::styled(label, label_style),
        Span::styled(PREFIX, styles::text_muted()),
        Span::styled(value, value_style),
    ])
}

pub fn draw_form(f: &mut Frame, area: Rect, app: &App, form: &Form, title: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(true))
        .title(title.to_string());
    let inner = block.inner(rows[0]);

    // keep the focused field on screen
    let visible = inner.height as usize;
    let skip = (form.focus() + 1).saturating_sub(visible);

    let lines: Vec<Line> = form
        .fields()
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, field)| field_line(field, i == form.focus(), form.awaiting_lookup()))
        .collect();
    f.render_widget(Paragraph::new(lines).block(block), rows[0]);

    let focused = form.focused();
    if !focused.is_choice() {
        let column = LABEL_WIDTH + PREFIX.len() + focused.cursor();
        let x = inner.x.saturating_add(column as u16);
        let y = inner.y + (form.focus() - skip) as u16;
        if x < inner.right() && y < inner.bottom() {
            f.set_cursor_position(Position::new(x, y));
        }
    }

    let help = app
        .settings
        .catalog
        .get(focused.key())
        .map(|d| d.help.clone())
        .unwrap_or_default();
    let help_block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(false))
        .title(" Help ");
    f.render_widget(
        Paragraph::new(Span::styled(help, styles::text_dim()))
            .block(help_block)
            .wrap(Wrap { trim: true }),
        rows[1],
    );
}
