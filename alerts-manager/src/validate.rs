//! Shape checks run before any remote call
//!
//! The manager calls the validator synchronously and performs no adapter
//! call when it fails. [`ShapeValidator`] only checks that the identifiers
//! each operation relies on are present; richer rules belong in a custom
//! [`AlertValidator`].

use crate::error::ValidationError;
use crate::model::{Alert, AlertQuery, Id};

/// Validator contract consulted by the manager
pub trait AlertValidator: Send + Sync {
    /// Checks an alert about to be created
    fn for_create(&self, alert: &Alert) -> Result<(), ValidationError>;

    /// Checks an alert about to be replaced
    fn for_edit(&self, alert: &Alert) -> Result<(), ValidationError>;

    /// Checks an alert used to address a single existing alert
    fn for_query(&self, alert: &Alert) -> Result<(), ValidationError>;

    /// Checks a query addressing a user's alerts
    fn for_user(&self, query: &AlertQuery) -> Result<(), ValidationError>;
}

/// Presence checks on the identifiers each operation needs
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeValidator;

impl AlertValidator for ShapeValidator {
    fn for_create(&self, alert: &Alert) -> Result<(), ValidationError> {
        require(&alert.user_id, "user_id")?;
        require(&alert.alert_system, "alert_system")?;

        if alert.conditions.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "conditions",
                reason: "at least one condition is required".to_string(),
            });
        }

        Ok(())
    }

    fn for_edit(&self, alert: &Alert) -> Result<(), ValidationError> {
        require_id(&alert.alert_id, "alert_id")?;
        self.for_create(alert)
    }

    fn for_query(&self, alert: &Alert) -> Result<(), ValidationError> {
        require_id(&alert.alert_id, "alert_id")
    }

    fn for_user(&self, query: &AlertQuery) -> Result<(), ValidationError> {
        require(&query.user_id, "user_id")?;
        require(&query.alert_system, "alert_system")
    }
}

fn require(value: &Option<String>, field: &'static str) -> Result<(), ValidationError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

fn require_id(value: &Option<Id>, field: &'static str) -> Result<(), ValidationError> {
    match value {
        Some(id) if !id.is_blank() => Ok(()),
        _ => Err(ValidationError::MissingField(field)),
    }
}
