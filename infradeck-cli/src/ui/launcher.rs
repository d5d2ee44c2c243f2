use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};

use infradeck_core::app::App;
use infradeck_core::catalog::FieldCatalog;
use infradeck_core::codec::{self, VariableSet};

use super::styles;

/// Label/value pairs for a deployment's variables, in file order. Catalog
/// fields show their label and editable text; anything else is shown raw.
pub fn preview_rows(catalog: &FieldCatalog, variables: &VariableSet) -> Vec<(String, String)> {
    variables
        .iter()
        .map(|(key, raw)| match catalog.get(key) {
            Some(d) => (d.label.clone(), codec::to_form_text(d.kind, raw)),
            None => (key.to_string(), raw.to_string()),
        })
        .collect()
}

pub fn draw_launcher(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    draw_deployments(f, cols[0], app);

    let rows = app
        .selected_deployment()
        .map(|d| preview_rows(&app.settings.catalog, &d.variables))
        .unwrap_or_default();
    draw_pairs(f, cols[1], " Variables ", &rows, 0);
}

fn draw_deployments(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(true))
        .title(format!(" Deployments ({}) ", app.listing.rows.len()));

    if let Some(reason) = &app.listing_error {
        let text = vec![
            Line::from(Span::styled("Could not read the apps directory:", styles::error())),
            Line::from(Span::styled(reason.clone(), styles::text_dim())),
            Line::from(""),
            Line::from(Span::styled("Press r to retry.", styles::text_muted())),
        ];
        f.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), area);
        return;
    }

    if app.listing.rows.is_empty() {
        let text = Line::from(Span::styled(
            "No deployments yet. Press n to create one.",
            styles::text_muted(),
        ));
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let header = Row::new(["Name", "Description", "State", "Last Action"]).style(styles::title());
    let rows = app.listing.rows.iter().map(|d| {
        Row::new(vec![
            Cell::from(d.name.clone()),
            Cell::from(d.description.clone()).style(styles::text_dim()),
            Cell::from(format!("{} {}", d.state.icon(), d.state.label())).style(styles::state(d.state)),
            Cell::from(d.last_action.clone()).style(styles::text_muted()),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(35),
            Constraint::Percentage(30),
            Constraint::Length(14),
            Constraint::Length(17),
        ],
    )
    .header(header)
    .block(block)
    .row_highlight_style(styles::selection())
    .highlight_symbol("▸ ");

    let mut state = TableState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(table, area, &mut state);
}

/// Read-only variables table of the selected deployment
pub fn draw_variables(f: &mut Frame, area: Rect, app: &App, offset: usize) {
    let (title, rows) = match app.selected_deployment() {
        Some(d) => (
            format!(" {} ", d.name),
            preview_rows(&app.settings.catalog, &d.variables),
        ),
        None => (" Variables ".to_string(), Vec::new()),
    };
    draw_pairs(f, area, &title, &rows, offset);
}

fn draw_pairs(f: &mut Frame, area: Rect, title: &str, pairs: &[(String, String)], offset: usize) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(false))
        .title(title.to_string());

    let rows = pairs.iter().skip(offset).map(|(label, value)| {
        Row::new(vec![
            Cell::from(label.clone()).style(styles::text_dim()),
            Cell::from(value.clone()).style(styles::text()),
        ])
    });
    let table = Table::new(rows, [Constraint::Percentage(45), Constraint::Percentage(55)])
        .header(Row::new(["Field", "Value"]).style(styles::title()))
        .block(block);
    f.render_widget(table, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use infradeck_core::app::Settings;
    use infradeck_core::model::{DeploymentSummary, LifecycleState};
    use infradeck_core::pipeline::BackendSettings;
    use infradeck_core::preset::{Preset, PresetStore};
    use infradeck_core::reducer::{AppEvent, reduce};
    use infradeck_core::registry::Listing;
    use ratatui::{Terminal, backend::TestBackend};

    use crate::ui::tests::buffer_text;

    fn catalog() -> FieldCatalog {
        FieldCatalog::from_str(
            "fields:\n  vm_memory: { label: Memory, type: integer }\n  vm_disk_size: { label: Disks, type: list }\n",
        )
        .unwrap()
    }

    fn app(rows: Vec<DeploymentSummary>) -> App {
        let settings = Settings {
            catalog: catalog(),
            presets: PresetStore::new(vec![Preset::new("default")]).unwrap(),
            form_fields: vec!["vm_memory".into()],
            preserve_on_preset_switch: vec![],
            dependency: None,
            provider: "proxmox".into(),
            apps_dir: PathBuf::from("/srv/apps"),
            template_dir: PathBuf::from("/srv/template"),
            backend: BackendSettings::default(),
        };
        let mut app = App::new(settings);
        reduce(&mut app, AppEvent::ListingLoaded(Ok(Listing { rows, issues: vec![] })));
        app
    }

    fn summary(name: &str, state: LifecycleState) -> DeploymentSummary {
        let mut variables = VariableSet::new();
        variables.insert("vm_memory", "8192");
        variables.insert("vm_disk_size", "[\"100G\", \"50G\"]");
        variables.insert("vm_tags", "[\"web\"]");
        DeploymentSummary {
            name: name.into(),
            description: "Public web".into(),
            state,
            last_action: "2026-10-18T09:30".into(),
            last_modified: String::new(),
            path: PathBuf::from("/srv/apps").join(name),
            variables,
        }
    }

    #[test]
    fn test_preview_rows_use_labels_and_form_text() {
        let rows = preview_rows(&catalog(), &summary("a", LifecycleState::Ready).variables);
        assert_eq!(
            rows,
            vec![
                ("Memory".to_string(), "8192".to_string()),
                ("Disks".to_string(), "100G,50G".to_string()),
                ("vm_tags".to_string(), "[\"web\"]".to_string()),
            ]
        );
    }

    #[test]
    fn test_launcher_lists_rows_with_state() {
        let app = app(vec![summary("proxmox_web_dmz_01", LifecycleState::Deployed)]);
        let mut terminal = Terminal::new(TestBackend::new(120, 10)).unwrap();
        terminal.draw(|f| draw_launcher(f, f.area(), &app)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("proxmox_web_dmz_01"));
        assert!(text.contains("DEPLOYED"));
        assert!(text.contains("Memory"));
    }

    #[test]
    fn test_launcher_shows_listing_error() {
        let mut app = app(vec![]);
        reduce(&mut app, AppEvent::ListingLoaded(Err("permission denied".into())));
        let mut terminal = Terminal::new(TestBackend::new(100, 10)).unwrap();
        terminal.draw(|f| draw_launcher(f, f.area(), &app)).unwrap();
        assert!(buffer_text(&terminal).contains("permission denied"));
    }
}
