use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::VariableSet;

pub type FieldKey = String;

/// How a field's value is typed once it leaves the form
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ValueKind {
    #[default]
    String,
    Integer,
    StringList,
}

impl ValueKind {
    pub fn label(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::StringList => "list",
        }
    }
}

/// A preset or variable value whose shape is only known at load time
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DynamicValue {
    String(String),
    Integer(i64),
    List(Vec<String>),
}

impl DynamicValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            DynamicValue::String(_) => ValueKind::String,
            DynamicValue::Integer(_) => ValueKind::Integer,
            DynamicValue::List(_) => ValueKind::StringList,
        }
    }

    /// Text shown in an input field: strings verbatim, integers in decimal,
    /// lists comma-joined with comma-holding items in double quotes.
    pub fn to_form_text(&self) -> String {
        match self {
            DynamicValue::String(s) => s.clone(),
            DynamicValue::Integer(n) => n.to_string(),
            DynamicValue::List(items) => items
                .iter()
                .map(|item| {
                    if item.contains(',') {
                        format!("\"{}\"", item)
                    } else {
                        item.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_form_text())
    }
}

/// Interaction policy for a form field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// Arbitrary text with normal cursor editing
    FreeText,
    /// Value must be one of `options`; typing is rejected
    CyclicChoice {
        options: Vec<String>,
        /// Options arrive at runtime from an inventory lookup
        dynamic: bool,
    },
}

impl InputMode {
    pub fn is_choice(&self) -> bool {
        matches!(self, InputMode::CyclicChoice { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub key: FieldKey,
    pub label: String,
    pub help: String,
    pub read_only: bool,
    pub kind: ValueKind,
    pub input: InputMode,
}

impl FieldDescriptor {
    pub fn text(key: &str, kind: ValueKind) -> Self {
        Self {
            key: key.to_string(),
            label: key.to_string(),
            help: String::new(),
            read_only: false,
            kind,
            input: InputMode::FreeText,
        }
    }

    pub fn choice(key: &str, options: &[&str]) -> Self {
        Self {
            input: InputMode::CyclicChoice {
                options: options.iter().map(|s| s.to_string()).collect(),
                dynamic: false,
            },
            ..Self::text(key, ValueKind::String)
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// How far a deployment's provisioning has progressed
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleState {
    #[default]
    Unknown,
    Ready,
    Initialized,
    Deployed,
}

impl LifecycleState {
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Unknown => "UNKNOWN",
            LifecycleState::Ready => "READY",
            LifecycleState::Initialized => "INITIALIZED",
            LifecycleState::Deployed => "DEPLOYED",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            LifecycleState::Unknown => "?",
            LifecycleState::Ready => "○",
            LifecycleState::Initialized => "◐",
            LifecycleState::Deployed => "●",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the launcher listing, recomputed on every refresh
#[derive(Clone, Debug)]
pub struct DeploymentSummary {
    pub name: String,
    pub description: String,
    pub state: LifecycleState,
    /// `YYYY-MM-DDTHH:MM` prefix of the state record timestamp
    pub last_action: String,
    pub last_modified: String,
    pub path: PathBuf,
    pub variables: VariableSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_text_per_kind() {
        assert_eq!(DynamicValue::String("web".into()).to_form_text(), "web");
        assert_eq!(DynamicValue::Integer(8192).to_form_text(), "8192");
        assert_eq!(
            DynamicValue::List(vec!["100G".into(), "50G".into()]).to_form_text(),
            "100G,50G"
        );
        assert_eq!(DynamicValue::List(vec![]).to_form_text(), "");
    }

    #[test]
    fn test_lifecycle_ordering() {
        assert!(LifecycleState::Unknown < LifecycleState::Ready);
        assert!(LifecycleState::Ready < LifecycleState::Initialized);
        assert!(LifecycleState::Initialized < LifecycleState::Deployed);
    }

    #[test]
    fn test_lifecycle_serde_labels() {
        let yaml = serde_yaml::to_string(&LifecycleState::Initialized).unwrap();
        assert_eq!(yaml.trim(), "INITIALIZED");
        let parsed: LifecycleState = serde_yaml::from_str("DEPLOYED").unwrap();
        assert_eq!(parsed, LifecycleState::Deployed);
    }
}
