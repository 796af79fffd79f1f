//! Builder for creating and configuring the AlertManager.
//!
//! # Example
//!
//! ```rust,ignore
//! use alerts_manager::{AlertManagerBuilder, ManagerConfig, TransportMode};
//! use std::sync::Arc;
//!
//! let config = ManagerConfig::new()
//!     .with_host("alerts.example.com")
//!     .with_mode(TransportMode::Rest);
//!
//! let adapter = Arc::new(MyRestAdapter::new(config.base_url()?));
//!
//! let manager = AlertManagerBuilder::new()
//!     .with_config(config)
//!     .with_adapter(adapter)
//!     .build()?;
//! ```

use std::sync::Arc;

use crate::adapter::AlertAdapter;
use crate::config::ManagerConfig;
use crate::error::{AlertError, Result};
use crate::manager::AlertManager;
use crate::validate::{AlertValidator, ShapeValidator};

/// Builder for creating and configuring an AlertManager.
///
/// # Validation
///
/// `build()` fails with [`AlertError::Configuration`] when:
/// - no adapter was supplied
/// - the configuration does not pass [`ManagerConfig::validate`]
#[derive(Default)]
pub struct AlertManagerBuilder {
    config: ManagerConfig,
    adapter: Option<Arc<dyn AlertAdapter>>,
    validator: Option<Arc<dyn AlertValidator>>,
}

impl AlertManagerBuilder {
    /// Create a new builder with default configuration and shape validation
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the transport adapter
    ///
    /// The caller picks the adapter matching `config.mode`.
    pub fn with_adapter(mut self, adapter: Arc<dyn AlertAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Replace the default [`ShapeValidator`]
    pub fn with_validator(mut self, validator: Arc<dyn AlertValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self) -> Result<AlertManager> {
        self.config.validate()?;

        let adapter = self.adapter.ok_or_else(|| {
            AlertError::Configuration("An alert adapter is required".to_string())
        })?;

        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(ShapeValidator));

        tracing::debug!(
            "Building AlertManager in {} mode with adapter {}",
            self.config.mode,
            adapter.name()
        );

        Ok(AlertManager::from_parts(self.config, adapter, validator))
    }
}
