//! Form engine
//!
//! An ordered list of string-backed fields with exactly one focused field.
//! Values are edited as text and only typed at the boundaries: presets are
//! stringified on the way in and [`Form::submit`] encodes them on the way out.
//!
//! Fields are fixed at construction; only values, options and focus change
//! afterwards, so the focus index is always valid.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec;
use crate::model::{FieldDescriptor, FieldKey, InputMode, ValueKind};
use crate::preset::Preset;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("form has no editable fields")]
    NoFields,
    #[error("{label} must be a whole number (got '{value}')")]
    InvalidInteger { label: String, value: String },
}

/// A declared "changing `trigger` refreshes `dependent`'s options" edge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub trigger: FieldKey,
    pub dependent: FieldKey,
}

/// Returned by [`Form::cycle`] when the cycled field is a dependency trigger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshNeeded {
    pub dependent: FieldKey,
    pub trigger_value: String,
}

/// What happened when a lookup result was handed to the form
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupApplied {
    /// Options replaced; carries the new option count
    Updated(usize),
    /// Lookup failed; options and value were cleared
    Cleared(String),
    /// A newer request is outstanding, result ignored
    Stale,
}

#[derive(Clone, Debug)]
pub struct FormField {
    pub descriptor: FieldDescriptor,
    value: String,
    initial: String,
    cursor: usize,
    options: Vec<String>,
}

impl FormField {
    fn new(descriptor: FieldDescriptor, value: String) -> Self {
        let options = match &descriptor.input {
            InputMode::CyclicChoice { options, .. } => options.clone(),
            InputMode::FreeText => Vec::new(),
        };
        let cursor = value.chars().count();
        Self {
            descriptor,
            initial: value.clone(),
            value,
            cursor,
            options,
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn label(&self) -> &str {
        &self.descriptor.label
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn is_choice(&self) -> bool {
        self.descriptor.input.is_choice()
    }

    pub fn is_dirty(&self) -> bool {
        self.value != self.initial
    }

    fn set_value(&mut self, value: String) {
        self.cursor = value.chars().count();
        self.value = value;
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len())
    }

    fn encoded(&self) -> Result<String, FormError> {
        if self.descriptor.kind == ValueKind::Integer {
            let trimmed = self.value.trim();
            if !trimmed.is_empty() && trimmed.parse::<i64>().is_err() {
                return Err(FormError::InvalidInteger {
                    label: self.descriptor.label.clone(),
                    value: self.value.clone(),
                });
            }
        }
        Ok(codec::encode_value(self.descriptor.kind, &self.value))
    }
}

/// Pick the option `delta` steps away from `current`. A value that is not in
/// `options` snaps to the first option.
pub fn cycle_option(current: &str, options: &[String], delta: i32) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    match options.iter().position(|o| o == current) {
        Some(idx) => {
            let len = options.len() as i64;
            let next = (idx as i64 + delta as i64).rem_euclid(len) as usize;
            Some(options[next].clone())
        }
        None => Some(options[0].clone()),
    }
}

#[derive(Clone, Debug)]
pub struct Form {
    fields: Vec<FormField>,
    focus: usize,
    dependency: Option<Dependency>,
    awaiting: Option<u64>,
}

impl Form {
    /// Build a form from descriptors and their starting text.
    pub fn new(
        fields: impl IntoIterator<Item = (FieldDescriptor, String)>,
    ) -> Result<Self, FormError> {
        let fields: Vec<FormField> = fields
            .into_iter()
            .map(|(descriptor, value)| FormField::new(descriptor, value))
            .collect();
        if fields.is_empty() {
            return Err(FormError::NoFields);
        }
        Ok(Self {
            fields,
            focus: 0,
            dependency: None,
            awaiting: None,
        })
    }

    /// Fresh form with every field populated from `preset` (or empty).
    pub fn from_preset(descriptors: Vec<FieldDescriptor>, preset: &Preset) -> Result<Self, FormError> {
        Self::new(descriptors.into_iter().map(|d| {
            let text = preset
                .get(&d.key)
                .map(|v| v.to_form_text())
                .unwrap_or_default();
            (d, text)
        }))
    }

    /// Attach the trigger → dependent edge. Ignored unless both fields exist.
    pub fn with_dependency(mut self, dependency: Option<Dependency>) -> Self {
        self.dependency = dependency.filter(|d| {
            self.index_of(&d.trigger).is_some() && self.index_of(&d.dependent).is_some()
        });
        self
    }

    pub fn dependency(&self) -> Option<&Dependency> {
        self.dependency.as_ref()
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focused(&self) -> &FormField {
        &self.fields[self.focus]
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.key() == key)
    }

    pub fn field(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.key() == key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.field(key).map(|f| f.value())
    }

    /// Overwrite a field's text. Returns false for unknown keys.
    pub fn set_value(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self.index_of(key) {
            Some(idx) => {
                self.fields[idx].set_value(value.into());
                true
            }
            None => false,
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.fields.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
    }

    pub fn focus_key(&mut self, key: &str) -> bool {
        match self.index_of(key) {
            Some(idx) => {
                self.focus = idx;
                true
            }
            None => false,
        }
    }

    /// Cycle the focused field. No-op on free-text fields.
    pub fn cycle(&mut self, delta: i32) -> Option<RefreshNeeded> {
        let key = self.focused().key().to_string();
        self.cycle_field(&key, delta)
    }

    /// Move a choice field `delta` options along its list. Cycling the
    /// dependency trigger requests a refresh when its value changed, or when
    /// the dependent field has no options yet (a single-option trigger).
    pub fn cycle_field(&mut self, key: &str, delta: i32) -> Option<RefreshNeeded> {
        let idx = self.index_of(key)?;
        let field = &mut self.fields[idx];
        if !field.is_choice() {
            return None;
        }
        let next = cycle_option(&field.value, &field.options, delta)?;
        let changed = next != field.value;
        if changed {
            field.set_value(next);
        }

        let dependency = self.dependency.as_ref()?;
        if dependency.trigger != key {
            return None;
        }
        let dependent_empty = self
            .field(&dependency.dependent)
            .is_some_and(|f| f.options.is_empty());
        if !changed && !dependent_empty {
            return None;
        }
        self.refresh_dependent()
    }

    /// Invalidate the dependent field's options and request them again for
    /// the trigger's current value. `None` when there is no dependency or
    /// the trigger is empty.
    pub fn refresh_dependent(&mut self) -> Option<RefreshNeeded> {
        let dependency = self.dependency.clone()?;
        let trigger_value = self.value(&dependency.trigger)?.to_string();
        if trigger_value.is_empty() {
            return None;
        }
        if let Some(idx) = self.index_of(&dependency.dependent) {
            self.fields[idx].options.clear();
        }
        Some(RefreshNeeded {
            dependent: dependency.dependent,
            trigger_value,
        })
    }

    /// Insert a character at the cursor. Rejected on choice fields.
    pub fn insert_char(&mut self, c: char) -> bool {
        let field = &mut self.fields[self.focus];
        if field.is_choice() || c.is_control() {
            return false;
        }
        let at = field.byte_index(field.cursor);
        field.value.insert(at, c);
        field.cursor += 1;
        true
    }

    pub fn backspace(&mut self) -> bool {
        let field = &mut self.fields[self.focus];
        if field.is_choice() || field.cursor == 0 {
            return false;
        }
        let at = field.byte_index(field.cursor - 1);
        field.value.remove(at);
        field.cursor -= 1;
        true
    }

    pub fn delete(&mut self) -> bool {
        let field = &mut self.fields[self.focus];
        if field.is_choice() || field.cursor >= field.value.chars().count() {
            return false;
        }
        let at = field.byte_index(field.cursor);
        field.value.remove(at);
        true
    }

    pub fn cursor_left(&mut self) {
        let field = &mut self.fields[self.focus];
        field.cursor = field.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let field = &mut self.fields[self.focus];
        field.cursor = (field.cursor + 1).min(field.value.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.fields[self.focus].cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        let field = &mut self.fields[self.focus];
        field.cursor = field.value.chars().count();
    }

    /// Overwrite every field present in `preset`, except keys in `preserve`.
    pub fn apply_preset(&mut self, preset: &Preset, preserve: &[String]) {
        for field in &mut self.fields {
            if preserve.iter().any(|k| k == field.key()) {
                continue;
            }
            if let Some(value) = preset.get(field.key()) {
                field.set_value(value.to_form_text());
            }
        }
    }

    /// Record that a lookup with `token` is the one the form is waiting for.
    pub fn expect_lookup(&mut self, token: u64) {
        self.awaiting = Some(token);
    }

    pub fn awaiting_lookup(&self) -> bool {
        self.awaiting.is_some()
    }

    /// Apply an inventory lookup result to the dependent field. Only the most
    /// recently issued request is honoured.
    pub fn apply_lookup(
        &mut self,
        dependent: &str,
        token: u64,
        result: Result<Vec<String>, String>,
    ) -> LookupApplied {
        if self.awaiting != Some(token) {
            return LookupApplied::Stale;
        }
        self.awaiting = None;

        let Some(idx) = self.index_of(dependent) else {
            return LookupApplied::Stale;
        };
        let field = &mut self.fields[idx];
        match result {
            Ok(options) => {
                let keep = options.iter().any(|o| *o == field.value);
                if !keep {
                    let first = options.first().cloned().unwrap_or_default();
                    field.set_value(first);
                }
                let count = options.len();
                field.options = options;
                LookupApplied::Updated(count)
            }
            Err(reason) => {
                field.options.clear();
                field.set_value(String::new());
                LookupApplied::Cleared(reason)
            }
        }
    }

    /// Encoded `key -> raw value` for every field
    pub fn submit(&self) -> Result<BTreeMap<String, String>, FormError> {
        self.fields
            .iter()
            .map(|f| Ok((f.key().to_string(), f.encoded()?)))
            .collect()
    }

    /// Encoded values for fields edited since the form was built
    pub fn changed(&self) -> Result<BTreeMap<String, String>, FormError> {
        self.fields
            .iter()
            .filter(|f| f.is_dirty())
            .map(|f| Ok((f.key().to_string(), f.encoded()?)))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.fields.iter().any(|f| f.is_dirty())
    }

    /// Record `written` (key to raw value) as the saved baseline. A field
    /// edited again since the save stays dirty.
    pub fn commit_keys(&mut self, written: &BTreeMap<String, String>) {
        for field in &mut self.fields {
            let Some(raw) = written.get(field.key()) else {
                continue;
            };
            field.initial = match field.encoded() {
                Ok(current) if current == *raw => field.value.clone(),
                _ => codec::to_form_text(field.descriptor.kind, raw),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DynamicValue;

    fn sample_form() -> Form {
        let zone = FieldDescriptor::choice("zone", &["standard", "admin", "dmz"]);
        let cluster = FieldDescriptor::choice("cluster", &["cl10400", "cl12600k"]);
        let mut template = FieldDescriptor::text("vm_template", ValueKind::String);
        template.input = InputMode::CyclicChoice {
            options: vec![],
            dynamic: true,
        };
        Form::new([
            (FieldDescriptor::text("vm_app", ValueKind::String), "web".to_string()),
            (FieldDescriptor::text("vm_memory", ValueKind::Integer), "4096".to_string()),
            (FieldDescriptor::text("vm_disk_size", ValueKind::StringList), "40G".to_string()),
            (zone, "standard".to_string()),
            (cluster, "cl10400".to_string()),
            (template, "ubuntu-a".to_string()),
        ])
        .unwrap()
        .with_dependency(Some(Dependency {
            trigger: "cluster".into(),
            dependent: "vm_template".into(),
        }))
    }

    #[test]
    fn test_empty_form_rejected() {
        let err = Form::new(Vec::<(FieldDescriptor, String)>::new()).unwrap_err();
        assert_eq!(err, FormError::NoFields);
    }

    #[test]
    fn test_focus_wraps_and_stays_in_range() {
        let mut form = sample_form();
        let n = form.len();
        for _ in 0..n {
            form.focus_next();
            assert!(form.focus() < n);
        }
        assert_eq!(form.focus(), 0);

        form.focus_prev();
        assert_eq!(form.focus(), n - 1);
        for _ in 0..(3 * n + 1) {
            form.focus_prev();
            assert!(form.focus() < n);
        }
    }

    #[test]
    fn test_cycle_wraps_both_directions() {
        let mut form = sample_form();
        form.focus_key("zone");
        for _ in 0..3 {
            form.cycle(1);
        }
        assert_eq!(form.value("zone"), Some("standard"));

        form.cycle(-1);
        assert_eq!(form.value("zone"), Some("dmz"));
    }

    #[test]
    fn test_cycle_unknown_value_snaps_to_first() {
        let mut form = sample_form();
        form.set_value("zone", "legacy");
        form.focus_key("zone");
        form.cycle(1);
        assert_eq!(form.value("zone"), Some("standard"));
    }

    #[test]
    fn test_cycle_free_text_is_noop() {
        let mut form = sample_form();
        assert!(form.cycle(1).is_none());
        assert_eq!(form.value("vm_app"), Some("web"));
    }

    #[test]
    fn test_cycle_empty_options_is_noop() {
        let mut form = sample_form();
        form.focus_key("vm_template");
        assert!(form.cycle(1).is_none());
        assert_eq!(form.value("vm_template"), Some("ubuntu-a"));
    }

    #[test]
    fn test_trigger_cycle_requests_refresh() {
        let mut form = sample_form();
        form.focus_key("cluster");
        let refresh = form.cycle(1).unwrap();
        assert_eq!(refresh.dependent, "vm_template");
        assert_eq!(refresh.trigger_value, "cl12600k");
        assert!(form.field("vm_template").unwrap().options().is_empty());
    }

    #[test]
    fn test_single_option_trigger_refreshes_until_options_arrive() {
        let cluster = FieldDescriptor::choice("cluster", &["cl10400"]);
        let template = FieldDescriptor {
            input: InputMode::CyclicChoice {
                options: vec![],
                dynamic: true,
            },
            ..FieldDescriptor::text("vm_template", ValueKind::String)
        };
        let mut form = Form::new([(cluster, "cl10400".to_string()), (template, String::new())])
            .unwrap()
            .with_dependency(Some(Dependency {
                trigger: "cluster".into(),
                dependent: "vm_template".into(),
            }));

        let refresh = form.cycle(1).unwrap();
        assert_eq!(refresh.trigger_value, "cl10400");

        form.expect_lookup(1);
        form.apply_lookup("vm_template", 1, Ok(vec!["ubuntu-server-24.04.1".into()]));
        assert!(form.cycle(1).is_none());
    }

    #[test]
    fn test_text_input_rejected_on_choice() {
        let mut form = sample_form();
        form.focus_key("zone");
        assert!(!form.insert_char('x'));
        assert!(!form.backspace());
        assert_eq!(form.value("zone"), Some("standard"));
    }

    #[test]
    fn test_text_editing_at_cursor() {
        let mut form = sample_form();
        form.cursor_home();
        assert!(form.insert_char('m'));
        assert_eq!(form.value("vm_app"), Some("mweb"));
        form.cursor_end();
        assert!(form.backspace());
        assert_eq!(form.value("vm_app"), Some("mwe"));
        form.cursor_home();
        assert!(form.delete());
        assert_eq!(form.value("vm_app"), Some("we"));
        form.cursor_right();
        form.insert_char('é');
        form.cursor_left();
        assert!(form.delete());
        assert_eq!(form.value("vm_app"), Some("we"));
    }

    #[test]
    fn test_apply_preset_respects_preserve_list() {
        let mut form = sample_form();
        let preset = Preset::new("large")
            .with("vm_memory", DynamicValue::Integer(16384))
            .with("vm_disk_size", DynamicValue::List(vec!["100G".into(), "50G".into()]))
            .with("zone", DynamicValue::String("dmz".into()))
            .with("cluster", DynamicValue::String("cl12600k".into()));

        form.apply_preset(&preset, &["zone".to_string(), "cluster".to_string()]);

        assert_eq!(form.value("vm_memory"), Some("16384"));
        assert_eq!(form.value("vm_disk_size"), Some("100G,50G"));
        assert_eq!(form.value("zone"), Some("standard"));
        assert_eq!(form.value("cluster"), Some("cl10400"));
        assert_eq!(form.value("vm_app"), Some("web"));
    }

    #[test]
    fn test_submit_encodes_by_kind() {
        let mut form = sample_form();
        form.set_value("vm_disk_size", "100G,50G");
        let out = form.submit().unwrap();
        assert_eq!(out["vm_app"], "\"web\"");
        assert_eq!(out["vm_memory"], "4096");
        assert_eq!(out["vm_disk_size"], "[\"100G\", \"50G\"]");
        assert_eq!(out["zone"], "\"standard\"");
    }

    #[test]
    fn test_submit_rejects_bad_integer() {
        let mut form = sample_form();
        form.set_value("vm_memory", "lots");
        assert!(matches!(
            form.submit(),
            Err(FormError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn test_changed_only_reports_dirty_fields() {
        let mut form = sample_form();
        assert!(form.changed().unwrap().is_empty());
        form.set_value("vm_memory", "8192");
        let changed = form.changed().unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed["vm_memory"], "8192");

        form.commit_keys(&changed);
        assert!(!form.is_dirty());
    }

    #[test]
    fn test_commit_keys_keeps_edits_made_after_the_save() {
        let mut form = sample_form();
        form.set_value("vm_memory", "8192");
        let written = form.changed().unwrap();

        form.set_value("vm_memory", "9000");
        form.set_value("vm_app", "api");
        form.commit_keys(&written);

        let pending = form.changed().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending["vm_memory"], "9000");
        assert_eq!(pending["vm_app"], "\"api\"");
    }

    #[test]
    fn test_lookup_success_selects_first_when_current_missing() {
        let mut form = sample_form();
        form.expect_lookup(1);
        let applied = form.apply_lookup(
            "vm_template",
            1,
            Ok(vec!["ubuntu-b".into(), "ubuntu-c".into()]),
        );
        assert_eq!(applied, LookupApplied::Updated(2));
        assert_eq!(form.value("vm_template"), Some("ubuntu-b"));
        assert!(!form.awaiting_lookup());
    }

    #[test]
    fn test_lookup_success_keeps_listed_value() {
        let mut form = sample_form();
        form.expect_lookup(4);
        form.apply_lookup("vm_template", 4, Ok(vec!["x".into(), "ubuntu-a".into()]));
        assert_eq!(form.value("vm_template"), Some("ubuntu-a"));
    }

    #[test]
    fn test_lookup_failure_clears_value_and_options() {
        let mut form = sample_form();
        form.expect_lookup(2);
        let applied = form.apply_lookup("vm_template", 2, Err("no credentials".into()));
        assert_eq!(applied, LookupApplied::Cleared("no credentials".into()));
        let field = form.field("vm_template").unwrap();
        assert_eq!(field.value(), "");
        assert!(field.options().is_empty());
    }

    #[test]
    fn test_stale_lookup_ignored() {
        let mut form = sample_form();
        form.expect_lookup(1);
        form.expect_lookup(2);
        let applied = form.apply_lookup("vm_template", 1, Ok(vec!["old".into()]));
        assert_eq!(applied, LookupApplied::Stale);
        assert_eq!(form.value("vm_template"), Some("ubuntu-a"));

        let applied = form.apply_lookup("vm_template", 2, Ok(vec!["new".into()]));
        assert_eq!(applied, LookupApplied::Updated(1));
        assert_eq!(form.value("vm_template"), Some("new"));
    }
}
