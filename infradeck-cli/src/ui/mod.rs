pub mod theme;

mod form;
mod launcher;

pub use theme::styles;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap},
};

use infradeck_core::app::{App, Busy, Scene};
use infradeck_core::pipeline::PlanKind;

use crate::environment::EnvStatus;

const TITLE: &str = "Infrastructure Catalog";

/// Render one frame: header, scene body, status line, key hints, and the
/// busy overlay on top when a pipeline runs.
pub fn draw(f: &mut Frame, app: &App, env: &EnvStatus) {
    let area = f.area();
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // header + rule
            Constraint::Min(3),    // body
            Constraint::Length(1), // status
            Constraint::Length(1), // key hints
        ])
        .split(area);

    draw_header(f, outer[0], env);

    match &app.scene {
        Scene::Launcher => launcher::draw_launcher(f, outer[1], app),
        Scene::EditTable { offset } => launcher::draw_variables(f, outer[1], app, *offset),
        Scene::CreateForm(scene) => {
            let title = format!(
                " New deployment [Preset: {}] (F2/F3 to switch) ",
                app.active_preset_name()
            );
            form::draw_form(f, outer[1], app, &scene.form, &title);
        }
        Scene::EditForm(scene) => {
            let title = format!(" Edit {} ", scene.deployment);
            form::draw_form(f, outer[1], app, &scene.form, &title);
        }
    }

    draw_status(f, outer[2], app);
    f.render_widget(Paragraph::new(footer_line(&app.scene)), outer[3]);

    if let Some(busy) = &app.busy {
        draw_busy(f, area, busy);
    }
}

fn draw_header(f: &mut Frame, area: Rect, env: &EnvStatus) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let mut spans = vec![Span::styled(format!(" {} ", TITLE), styles::header()), Span::raw("   ")];
    spans.extend(indicator_spans(env));
    f.render_widget(Paragraph::new(Line::from(spans)), rows[0]);

    let rule = "─".repeat(rows[1].width as usize);
    f.render_widget(Paragraph::new(Span::styled(rule, styles::border(false))), rows[1]);
}

/// AWS, Vault and git indicators, green when usable
pub fn indicator_spans(env: &EnvStatus) -> Vec<Span<'static>> {
    let mut spans = Vec::new();

    match &env.aws {
        Some((profile, region)) => {
            spans.push(Span::styled(format!("AWS {}@{}", profile, region), styles::success()))
        }
        None => spans.push(Span::styled("AWS ✗", styles::error())),
    }
    spans.push(Span::raw("  "));

    if env.vault {
        spans.push(Span::styled("Vault ✓", styles::success()));
    } else {
        spans.push(Span::styled("Vault ✗", styles::error()));
    }
    spans.push(Span::raw("  "));

    match &env.git {
        Some(git) if git.dirty => spans.push(Span::styled(format!("git {}*", git.branch), styles::warn())),
        Some(git) => spans.push(Span::styled(format!("git {}", git.branch), styles::success())),
        None => spans.push(Span::styled("git ?", styles::error())),
    }
    spans
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let line = match &app.status {
        Some(status) => Line::from(Span::styled(
            format!(" {}", first_line(&status.text)),
            styles::severity(status.severity),
        )),
        None => Line::from(""),
    };
    f.render_widget(Paragraph::new(line), area);
}

/// Provisioner output can span many lines; the status bar shows the first
fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

pub fn key_hints(scene: &Scene) -> &'static [(&'static str, &'static str)] {
    match scene {
        Scene::Launcher => &[
            ("↑/↓", "Select"),
            ("n", "New"),
            ("e", "Edit"),
            ("v", "Variables"),
            ("a", "Apply"),
            ("r", "Refresh"),
            ("q", "Quit"),
        ],
        Scene::EditTable { .. } => &[("↑/↓", "Scroll"), ("e", "Edit"), ("Esc", "Back")],
        Scene::CreateForm(_) => &[
            ("↑/↓", "Field"),
            ("←/→", "Cycle"),
            ("F2/F3", "Preset"),
            ("Enter", "Create"),
            ("Esc", "Cancel"),
        ],
        Scene::EditForm(_) => &[
            ("↑/↓", "Field"),
            ("←/→", "Cycle"),
            ("Enter", "Save"),
            ("Ctrl+A", "Apply"),
            ("Esc", "Cancel"),
        ],
    }
}

fn footer_line(scene: &Scene) -> Line<'static> {
    let mut spans = vec![Span::raw(" ")];
    for (i, (key, action)) in key_hints(scene).iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" │ ", styles::text_muted()));
        }
        spans.push(Span::styled(format!("[{}]", key), styles::key_hint()));
        spans.push(Span::styled(format!(" {}", action), styles::text_dim()));
    }
    Line::from(spans)
}

/// Fixed-size rect centred in `area`, shrunk to fit
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_busy(f: &mut Frame, area: Rect, busy: &Busy) {
    let rect = centered_rect(60, 7, area);
    f.render_widget(Clear, rect);

    let verb = match busy.kind {
        PlanKind::Create => "Creating",
        PlanKind::Apply => "Applying",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(true))
        .title(format!(" {} {} ", verb, busy.deployment));
    let inner = block.inner(rect);
    f.render_widget(block, rect);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let step = busy.step.as_deref().unwrap_or("starting");
    let text = vec![
        Line::from(Span::styled(format!("Step {}/{}: {}", busy.index + 1, busy.total.max(1), step), styles::text())),
        Line::from(Span::styled("Please wait. Press q to quit.", styles::text_muted())),
    ];
    f.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), rows[0]);

    let ratio = if busy.total == 0 {
        0.0
    } else {
        (busy.index as f64 / busy.total as f64).clamp(0.0, 1.0)
    };
    f.render_widget(Gauge::default().gauge_style(styles::accent()).ratio(ratio), rows[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::GitStatus;
    use ratatui::{Terminal, backend::TestBackend};

    pub(super) fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_centered_rect_fits_small_area() {
        let area = Rect::new(0, 0, 40, 5);
        let rect = centered_rect(60, 7, area);
        assert_eq!(rect, Rect::new(0, 0, 40, 5));

        let rect = centered_rect(10, 2, Rect::new(0, 0, 20, 10));
        assert_eq!(rect, Rect::new(5, 4, 10, 2));
    }

    #[test]
    fn test_indicators_mark_dirty_branch() {
        let env = EnvStatus {
            aws: None,
            vault: true,
            git: Some(GitStatus {
                branch: "main".into(),
                dirty: true,
            }),
        };
        let text: String = indicator_spans(&env).iter().map(|s| s.content.to_string()).collect();
        assert_eq!(text, "AWS ✗  Vault ✓  git main*");
    }

    #[test]
    fn test_first_line_of_status() {
        assert_eq!(first_line("apply failed:\nError: quota"), "apply failed:");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn test_key_hints_per_scene() {
        assert!(key_hints(&Scene::Launcher).iter().any(|(k, _)| *k == "n"));
        assert!(key_hints(&Scene::EditTable { offset: 0 }).iter().any(|(k, _)| *k == "Esc"));
    }

    #[test]
    fn test_busy_overlay_renders_step() {
        let backend = TestBackend::new(80, 12);
        let mut terminal = Terminal::new(backend).unwrap();
        let busy = Busy {
            kind: PlanKind::Create,
            deployment: "proxmox_web_dmz_01".into(),
            step: Some("init".into()),
            index: 5,
            total: 9,
        };
        terminal.draw(|f| draw_busy(f, f.area(), &busy)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("Creating proxmox_web_dmz_01"));
        assert!(text.contains("Step 6/9: init"));
    }
}
