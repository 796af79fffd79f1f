//! Transport adapter capability contract
//!
//! An adapter speaks to the remote alert service over one transport (REST
//! polling or a persistent socket). The manager only depends on this trait;
//! concrete transports live outside this crate.
//!
//! Every operation has a default body returning
//! [`AdapterError::Unsupported`], so an adapter only implements what its
//! transport offers.

use async_trait::async_trait;
use serde_json::Value;

use alerts_common::Disposable;

use crate::error::{AdapterError, AdapterResult};
use crate::model::{Alert, AlertQuery, Operator, Property, PublisherTypeDefault, Target};
use crate::subscription::AlertSink;

/// Operations a transport adapter provides to the [`AlertManager`](crate::AlertManager)
#[async_trait]
pub trait AlertAdapter: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str {
        "adapter"
    }

    /// Establish the connection to the remote service
    async fn connect(&self) -> AdapterResult<()> {
        Err(AdapterError::Unsupported("connect"))
    }

    async fn create_alert(&self, _alert: &Alert) -> AdapterResult<Alert> {
        Err(AdapterError::Unsupported("create_alert"))
    }

    async fn retrieve_alert(&self, _alert: &Alert) -> AdapterResult<Alert> {
        Err(AdapterError::Unsupported("retrieve_alert"))
    }

    async fn delete_alert(&self, _query: &AlertQuery) -> AdapterResult<()> {
        Err(AdapterError::Unsupported("delete_alert"))
    }

    async fn enable_alert(&self, _query: &AlertQuery) -> AdapterResult<()> {
        Err(AdapterError::Unsupported("enable_alert"))
    }

    async fn disable_alert(&self, _query: &AlertQuery) -> AdapterResult<()> {
        Err(AdapterError::Unsupported("disable_alert"))
    }

    async fn retrieve_alerts(&self, _query: &AlertQuery) -> AdapterResult<Vec<Alert>> {
        Err(AdapterError::Unsupported("retrieve_alerts"))
    }

    /// Open the transport-level subscription for one (user, alert system) key
    ///
    /// Called when the first local subscriber appears for the key, and again
    /// by a waiting subscriber if a previous attempt failed. While
    /// the returned binding is live, the adapter reports remote changes for
    /// the key through `sink`. The binding is disposed when the last local
    /// subscriber goes away.
    ///
    /// This hook runs synchronously inside `subscribe_alerts`; it should start
    /// the remote subscription and return rather than deliver notifications
    /// before returning. Other subscribers for the same key block until it
    /// returns, so it must not subscribe to that key itself.
    fn subscribe_alerts(&self, _query: &AlertQuery, _sink: AlertSink) -> AdapterResult<Disposable> {
        Err(AdapterError::Unsupported("subscribe_alerts"))
    }

    async fn get_targets(&self) -> AdapterResult<Vec<Target>> {
        Err(AdapterError::Unsupported("get_targets"))
    }

    async fn get_properties(&self) -> AdapterResult<Vec<Property>> {
        Err(AdapterError::Unsupported("get_properties"))
    }

    async fn get_operators(&self) -> AdapterResult<Vec<Operator>> {
        Err(AdapterError::Unsupported("get_operators"))
    }

    async fn get_publisher_types(&self) -> AdapterResult<Value> {
        Err(AdapterError::Unsupported("get_publisher_types"))
    }

    async fn get_publisher_type_defaults(&self, _query: &AlertQuery) -> AdapterResult<Value> {
        Err(AdapterError::Unsupported("get_publisher_type_defaults"))
    }

    async fn assign_publisher_type_default(
        &self,
        _defaults: &PublisherTypeDefault,
    ) -> AdapterResult<Value> {
        Err(AdapterError::Unsupported("assign_publisher_type_default"))
    }

    async fn get_market_data_configuration(&self, _query: &Value) -> AdapterResult<Value> {
        Err(AdapterError::Unsupported("get_market_data_configuration"))
    }

    async fn assign_market_data_configuration(&self, _configuration: &Value) -> AdapterResult<Value> {
        Err(AdapterError::Unsupported("assign_market_data_configuration"))
    }

    async fn get_server_version(&self) -> AdapterResult<Value> {
        Err(AdapterError::Unsupported("get_server_version"))
    }
}
