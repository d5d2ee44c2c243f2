use std::path::Path;

use anyhow::Context;
use serde_json::json;

use infradeck_core::model::DeploymentSummary;
use infradeck_core::registry;

use crate::bootstrap;

const HEADERS: [&str; 4] = ["NAME", "DESCRIPTION", "STATE", "LAST ACTION"];

/// Print the deployment summary, as a table or as JSON
pub fn run_list(config_path: Option<&Path>, as_json: bool) -> anyhow::Result<()> {
    let (_, config) = bootstrap::load_config(config_path)?;
    let apps_dir = config.apps_dir();
    let listing = registry::list(&apps_dir, &config.description_field)
        .with_context(|| format!("failed to list deployments in {}", apps_dir.display()))?;

    if as_json {
        let rows: Vec<_> = listing.rows.iter().map(row_json).collect();
        let issues: Vec<_> = listing
            .issues
            .iter()
            .map(|i| json!({ "deployment": i.deployment, "message": i.message }))
            .collect();
        let doc = json!({ "deployments": rows, "issues": issues });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if listing.rows.is_empty() {
        println!("No deployments in {}", apps_dir.display());
        return Ok(());
    }
    print!("{}", render_table(&listing.rows));
    for issue in &listing.issues {
        eprintln!("warning: {}: {}", issue.deployment, issue.message);
    }
    Ok(())
}

fn row_json(row: &DeploymentSummary) -> serde_json::Value {
    json!({
        "name": row.name,
        "description": row.description,
        "state": row.state,
        "last_action": row.last_action,
        "last_modified": row.last_modified,
        "path": row.path,
    })
}

/// Left-aligned columns sized to their widest cell
pub fn render_table(rows: &[DeploymentSummary]) -> String {
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|r| {
            [
                r.name.clone(),
                r.description.clone(),
                r.state.label().to_string(),
                r.last_action.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let format_row = |row: [&str; 4]| {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = w))
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", line.trim_end())
    };

    let mut out = format_row(HEADERS);
    for row in &cells {
        out.push_str(&format_row([row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use infradeck_core::codec::VariableSet;
    use infradeck_core::model::LifecycleState;
    use std::path::PathBuf;

    fn row(name: &str, description: &str, state: LifecycleState, last: &str) -> DeploymentSummary {
        DeploymentSummary {
            name: name.into(),
            description: description.into(),
            state,
            last_action: last.into(),
            last_modified: String::new(),
            path: PathBuf::from("/srv/apps").join(name),
            variables: VariableSet::new(),
        }
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let out = render_table(&[
            row("proxmox_web_dmz_01", "Public web", LifecycleState::Deployed, "2026-10-18T09:30"),
            row("stray", "", LifecycleState::Unknown, ""),
        ]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[0].ends_with("LAST ACTION"));
        assert_eq!(
            lines[1],
            "proxmox_web_dmz_01  Public web   DEPLOYED  2026-10-18T09:30"
        );
        assert_eq!(lines[2], "stray                            UNKNOWN");
    }

    #[test]
    fn test_row_json_uses_state_label() {
        let value = row_json(&row("a", "d", LifecycleState::Initialized, ""));
        assert_eq!(value["state"], "INITIALIZED");
        assert_eq!(value["path"], "/srv/apps/a");
    }
}
