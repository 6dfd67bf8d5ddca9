//! Declarative merge of a donor fragment into a target fragment.

use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Keep the target's value, even when the donor has one.
    Preserve,
    /// Keep the target's value unless it equals the sentinel.
    PreserveUnless(Value),
    /// Take the donor's value when it has one.
    Replace,
    /// Append donor list entries whose key is not already in the target list.
    AppendUniqueBy(String),
    /// Merge two objects field by field.
    Deep(MergeRules),
}

/// What happens to fields that no rule names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlisted {
    Keep,
    Overlay,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeRules {
    fields: Vec<(String, Rule)>,
    unlisted: Unlisted,
    target_fields_only: bool,
}

impl MergeRules {
    pub fn keep_unlisted() -> Self {
        Self {
            fields: Vec::new(),
            unlisted: Unlisted::Keep,
            target_fields_only: false,
        }
    }

    pub fn overlay_unlisted() -> Self {
        Self {
            unlisted: Unlisted::Overlay,
            ..Self::keep_unlisted()
        }
    }

    pub fn field(mut self, name: &str, rule: Rule) -> Self {
        if self.is_protected(name) {
            return self;
        }
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), rule));
        self
    }

    /// Marks fields as `Preserve`; a protected field ignores later rules.
    pub fn protect(mut self, names: &[&str]) -> Self {
        for name in names {
            self = self.field(name, Rule::Preserve);
        }
        self
    }

    /// Never add a field the target does not already have.
    pub fn target_fields_only(mut self) -> Self {
        self.target_fields_only = true;
        self
    }

    pub fn rule_for(&self, name: &str) -> Option<&Rule> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    fn is_protected(&self, name: &str) -> bool {
        matches!(self.rule_for(name), Some(Rule::Preserve))
    }
}

/// Merges `donor` into `target`. Non-object fragments are treated as empty
/// objects, so the result is always an object built from `target`.
pub fn merge(target: &Value, donor: &Value, rules: &MergeRules) -> Value {
    let empty = Map::new();
    let target = target.as_object().unwrap_or(&empty);
    let donor = donor.as_object().unwrap_or(&empty);
    Value::Object(merge_maps(target, donor, rules))
}

pub fn merge_maps(
    target: &Map<String, Value>,
    donor: &Map<String, Value>,
    rules: &MergeRules,
) -> Map<String, Value> {
    let mut out = Map::new();

    for (name, current) in target {
        if let Some(value) = merge_field(name, Some(current), donor.get(name), rules) {
            out.insert(name.clone(), value);
        }
    }

    if !rules.target_fields_only {
        for (name, incoming) in donor {
            if target.contains_key(name) {
                continue;
            }
            if let Some(value) = merge_field(name, None, Some(incoming), rules) {
                out.insert(name.clone(), value);
            }
        }
    }

    out
}

fn merge_field(
    name: &str,
    current: Option<&Value>,
    incoming: Option<&Value>,
    rules: &MergeRules,
) -> Option<Value> {
    if rules.is_protected(name) {
        return current.cloned();
    }

    let rule = match rules.rule_for(name) {
        Some(rule) => rule,
        None => {
            return match rules.unlisted {
                Unlisted::Keep => current.cloned(),
                Unlisted::Overlay => incoming.or(current).cloned(),
            }
        }
    };

    match rule {
        Rule::Preserve => current.cloned(),
        Rule::PreserveUnless(sentinel) => match current {
            Some(value) if value != sentinel => Some(value.clone()),
            _ => incoming.or(current).cloned(),
        },
        Rule::Replace => incoming.or(current).cloned(),
        Rule::AppendUniqueBy(key) => match (current, incoming) {
            (_, None) => current.cloned(),
            (current, Some(incoming)) => Some(append_unique(current, incoming, key)),
        },
        Rule::Deep(inner) => match (current, incoming) {
            (None, None) => None,
            (current, incoming) => Some(merge(
                current.unwrap_or(&Value::Null),
                incoming.unwrap_or(&Value::Null),
                inner,
            )),
        },
    }
}

fn append_unique(current: Option<&Value>, incoming: &Value, key: &str) -> Value {
    let mut merged: Vec<Value> = current
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut seen: HashSet<String> = merged
        .iter()
        .filter_map(|entry| identity(entry, key))
        .collect();

    for entry in incoming.as_array().map(Vec::as_slice).unwrap_or(&[]) {
        match identity(entry, key) {
            Some(id) if seen.contains(&id) => {}
            Some(id) => {
                seen.insert(id);
                merged.push(entry.clone());
            }
            None => merged.push(entry.clone()),
        }
    }

    Value::Array(merged)
}

// "444" and 444 name the same model.
fn identity(entry: &Value, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}
