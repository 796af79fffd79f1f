//! Alert records, queries and catalog metadata
//!
//! Only the fields the manager reads are typed. Everything else the remote
//! service sends is kept in each record's `extra` map and written back out
//! unchanged.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Transitional states synthesized locally by enable/disable
pub mod alert_state {
    /// Reported by `enable_alert` before the service confirms
    pub const STARTING: &str = "Starting";
    /// Reported by `disable_alert` before the service confirms
    pub const STOPPING: &str = "Stopping";
}

/// Condition target / property type marking a ticker symbol
pub const SYMBOL_TYPE: &str = "symbol";

/// Identifier that the service may send as a string or a number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Text(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::Text(value)
    }
}

impl Id {
    /// Blank text carries no identity
    pub fn is_blank(&self) -> bool {
        matches!(self, Id::Text(text) if text.trim().is_empty())
    }
}

/// An alert definition owned by a user within an alert system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Alert {
    /// An alert addressed to `user_id` within `alert_system`
    pub fn new(user_id: impl Into<String>, alert_system: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            alert_system: Some(alert_system.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, alert_id: impl Into<Id>) -> Self {
        self.alert_id = Some(alert_id.into());
        self
    }

    pub fn with_type(mut self, alert_type: impl Into<String>) -> Self {
        self.alert_type = Some(alert_type.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// A copy of this alert in the given state
    pub fn with_state(&self, state: &str) -> Self {
        let mut alert = self.clone();
        alert.alert_state = Some(state.to_string());
        alert
    }

    /// Best-effort decode of a notification object that does not fit the
    /// typed model
    ///
    /// Fields with the expected shape are lifted out; everything else stays in
    /// `extra`, so the alert still serializes back to the same object.
    pub(crate) fn from_loose(mut fields: Map<String, Value>) -> Self {
        let alert_id = fields
            .get("alert_id")
            .and_then(|value| Id::deserialize(value).ok());
        if alert_id.is_some() {
            fields.remove("alert_id");
        }

        Self {
            alert_id,
            user_id: take_text(&mut fields, "user_id"),
            alert_system: take_text(&mut fields, "alert_system"),
            alert_type: take_text(&mut fields, "alert_type"),
            alert_state: take_text(&mut fields, "alert_state"),
            name: take_text(&mut fields, "name"),
            conditions: Vec::new(),
            extra: fields,
        }
    }
}

fn take_text(fields: &mut Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name) {
        Some(Value::String(_)) => match fields.remove(name) {
            Some(Value::String(text)) => Some(text),
            _ => None,
        },
        _ => None,
    }
}

/// A single trigger condition of an alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_id: Option<Id>,
    #[serde(default)]
    pub property: Property,
    #[serde(default)]
    pub operator: Operator,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Condition {
    pub fn new(property: Property, operator: Operator) -> Self {
        Self {
            property,
            operator,
            ..Default::default()
        }
    }

    /// A condition on a property of the symbol `identifier`
    pub fn on_symbol(identifier: impl Into<String>, operand: impl Into<Value>) -> Self {
        Self::new(
            Property {
                target: Target::symbol(identifier),
                ..Default::default()
            },
            Operator::with_operand(operand),
        )
    }
}

/// A measurable property of a target (price, volume, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<Id>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub target: Target,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_operators: Vec<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The thing a property is measured on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<Id>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Target {
    pub fn symbol(identifier: impl Into<String>) -> Self {
        Self {
            kind: Some(SYMBOL_TYPE.to_string()),
            identifier: Some(identifier.into()),
            ..Default::default()
        }
    }
}

/// A comparison operator, with its operand when used inside a condition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Operator {
    pub fn with_operand(operand: impl Into<Value>) -> Self {
        Self {
            operand: Some(operand.into()),
            ..Default::default()
        }
    }

    /// The operand rendered as the service compares it: strings verbatim,
    /// numbers and booleans in their JSON form
    pub fn operand_text(&self) -> Option<String> {
        self.operand.as_ref().and_then(value_text)
    }
}

/// Selects a user's alerts within an alert system, or a single alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<AlertFilter>,
}

impl AlertQuery {
    /// All alerts of `user_id` within `alert_system`
    pub fn for_user(user_id: impl Into<String>, alert_system: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            alert_system: Some(alert_system.into()),
            ..Default::default()
        }
    }

    /// A single alert by id
    pub fn for_alert(alert_id: impl Into<Id>) -> Self {
        Self {
            alert_id: Some(alert_id.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: AlertFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Client-side post-filters for `retrieve_alerts`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionFilter>,
}

impl AlertFilter {
    pub fn is_empty(&self) -> bool {
        self.alert_type.is_none()
            && self.symbol.is_none()
            && self.target.as_ref().map_or(true, |t| t.identifier.is_none())
            && self.condition.as_ref().map_or(true, |c| c.operand.is_none())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Value>,
}

/// Per-publisher-type delivery defaults for a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublisherTypeDefault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_type_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_window_timezone: Option<String>,
    #[serde(default)]
    pub allow_window_start: Option<String>,
    #[serde(default)]
    pub allow_window_end: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub active_alert_types: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PublisherTypeDefault {
    /// Blank delivery-window bounds mean "no bound"
    pub fn normalized(mut self) -> Self {
        if self.allow_window_start.as_deref() == Some("") {
            self.allow_window_start = None;
        }
        if self.allow_window_end.as_deref() == Some("") {
            self.allow_window_end = None;
        }
        self
    }
}

pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
