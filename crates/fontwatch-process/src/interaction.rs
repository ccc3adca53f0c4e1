//! User interactions requested by a process.
//!
//! An interaction is a small form: the roles allowed to answer it and a
//! list of fields. A field may carry a `condition: [fieldName, value]` and
//! is then only shown and required when the named field holds that value.
//! Conditions are one level deep: a conditioned field can't gate another.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProcessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Read-only text.
    Info,
    /// Single line input.
    Line,
    /// Multi-line input.
    Text,
    /// One of a fixed set of options.
    Choice,
    /// Yes or no.
    Binary,
}

/// One field of an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionField {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// `(label, value)` pairs of a choice.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<(String, Value)>,
}

impl InteractionField {
    fn input(kind: FieldKind, name: &str, label: &str) -> Self {
        Self {
            kind,
            name: Some(name.to_string()),
            label: Some(label.to_string()),
            content: None,
            options: Vec::new(),
            condition: None,
        }
    }
}

/// A form shown to the users allowed to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub roles: Vec<String>,
    pub fields: Vec<InteractionField>,
}

impl Interaction {
    pub fn new<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            fields: Vec::new(),
        }
    }

    pub fn info(mut self, content: impl Into<String>) -> Self {
        self.fields.push(InteractionField {
            kind: FieldKind::Info,
            name: None,
            label: None,
            content: Some(content.into()),
            options: Vec::new(),
            condition: None,
        });
        self
    }

    pub fn line(mut self, name: &str, label: &str) -> Self {
        self.fields.push(InteractionField::input(FieldKind::Line, name, label));
        self
    }

    pub fn text(mut self, name: &str, label: &str) -> Self {
        self.fields.push(InteractionField::input(FieldKind::Text, name, label));
        self
    }

    pub fn binary(mut self, name: &str, label: &str) -> Self {
        self.fields.push(InteractionField::input(FieldKind::Binary, name, label));
        self
    }

    pub fn choice<I, L, V>(mut self, name: &str, label: &str, options: I) -> Self
    where
        I: IntoIterator<Item = (L, V)>,
        L: Into<String>,
        V: Into<String>,
    {
        let mut field = InteractionField::input(FieldKind::Choice, name, label);
        field.options = options.into_iter().map(|(l, v)| (l.into(), v.into())).collect();
        self.fields.push(field);
        self
    }

    /// Conditions the last added field on `field == value`.
    pub fn when(mut self, field: &str, value: impl Into<Value>) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.condition = Some((field.to_string(), value.into()));
        }
        self
    }

    /// Checks names and the one-level condition rule.
    pub fn validate(&self) -> Result<()> {
        for field in &self.fields {
            if field.kind != FieldKind::Info && field.name.is_none() {
                return Err(ProcessError::Interaction(format!("{:?} field without a name", field.kind)));
            }
            let Some((gate, _)) = &field.condition else {
                continue;
            };
            let target = self
                .fields
                .iter()
                .find(|f| f.name.as_deref() == Some(gate.as_str()))
                .ok_or_else(|| ProcessError::Interaction(format!("condition on unknown field '{gate}'")))?;
            if target.condition.is_some() {
                return Err(ProcessError::Interaction(format!(
                    "field '{gate}' is conditioned and can't gate another field"
                )));
            }
        }
        Ok(())
    }

    /// Whether `field` is shown for the given answer values.
    pub fn is_active(&self, field: &InteractionField, answer: &Value) -> bool {
        match &field.condition {
            Some((gate, value)) => answer.get(gate) == Some(value),
            None => true,
        }
    }
}
