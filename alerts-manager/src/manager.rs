//! The AlertManager
//!
//! Front door for alert operations: validates requests, forwards them to the
//! transport adapter, and multiplexes alert subscriptions so that any number
//! of local subscribers share one remote subscription per (user, alert system).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use alerts_common::{Disposable, Scheduler};

use crate::adapter::AlertAdapter;
use crate::config::ManagerConfig;
use crate::error::{AlertError, Result};
use crate::filter;
use crate::model::{alert_state, Alert, AlertQuery, Operator, Property, PublisherTypeDefault, Target};
use crate::subscription::{AlertSink, SubscriptionKey, SubscriptionMultiplexer};
use crate::validate::{AlertValidator, ShapeValidator};

/// Client-side alert manager
///
/// All remote work is delegated to an [`AlertAdapter`]; the manager adds
/// validation, client-side filtering and shared subscriptions.
///
/// # Example
///
/// ```rust,ignore
/// use alerts_manager::{AlertManagerBuilder, AlertQuery, ManagerConfig};
/// use std::sync::Arc;
///
/// let manager = AlertManagerBuilder::new()
///     .with_config(ManagerConfig::from_env()?)
///     .with_adapter(Arc::new(my_socket_adapter))
///     .build()?;
///
/// manager.connect_with_retry().await?;
///
/// let subscription = manager.subscribe_alerts(
///     &AlertQuery::for_user("me", "alerts.example.com"),
///     |alert| println!("changed: {:?}", alert.alert_id),
///     |alert| println!("deleted: {:?}", alert.alert_id),
/// )?;
///
/// // Later
/// subscription.dispose();
/// ```
///
/// # Enable/disable notifications
///
/// `enable_alert` and `disable_alert` notify local change listeners with a
/// copy of the alert in the `Starting`/`Stopping` state *before* the remote
/// call is made, whether or not that call succeeds. The authoritative state
/// arrives later through the adapter's own mutation notification; no revert
/// is sent when the remote call fails.
pub struct AlertManager {
    config: ManagerConfig,
    adapter: Arc<dyn AlertAdapter>,
    validator: Arc<dyn AlertValidator>,
    multiplexer: SubscriptionMultiplexer,
    scheduler: Scheduler,
    lifecycle: Disposable,
}

impl AlertManager {
    /// Create a manager with default configuration and shape validation
    pub fn new(adapter: Arc<dyn AlertAdapter>) -> Self {
        Self::from_parts(ManagerConfig::default(), adapter, Arc::new(ShapeValidator))
    }

    pub(crate) fn from_parts(
        config: ManagerConfig,
        adapter: Arc<dyn AlertAdapter>,
        validator: Arc<dyn AlertValidator>,
    ) -> Self {
        let multiplexer = SubscriptionMultiplexer::new(Arc::clone(&adapter));
        let scheduler = Scheduler::new();

        // Bindings close before the scheduler stops
        let lifecycle = Disposable::composite(vec![
            multiplexer.as_disposable(),
            scheduler.as_disposable(),
        ]);

        tracing::debug!(
            "Created AlertManager for {} using adapter {}",
            config.host,
            adapter.name()
        );

        Self {
            config,
            adapter,
            validator,
            multiplexer,
            scheduler,
            lifecycle,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Scheduler owned by this manager, disposed with it
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Connect the adapter once
    pub async fn connect(&self) -> Result<()> {
        self.ensure_live()?;

        self.adapter.connect().await?;
        tracing::info!("Connected to alert service via {}", self.adapter.name());
        Ok(())
    }

    /// Connect the adapter, retrying with the configured reconnect policy
    ///
    /// Fails with [`SchedulerError::AttemptsExhausted`](alerts_common::SchedulerError::AttemptsExhausted)
    /// when the policy runs out, or with a scheduler error if the manager is
    /// disposed while retrying.
    pub async fn connect_with_retry(&self) -> Result<()> {
        self.ensure_live()?;

        let adapter = Arc::clone(&self.adapter);
        let description = format!("connect {}", adapter.name());

        let connecting = self.scheduler.backoff(
            move || {
                let adapter = Arc::clone(&adapter);
                async move { adapter.connect().await.map(Some) }
            },
            self.config.reconnect,
            description,
        )?;

        connecting.await?;
        tracing::info!("Connected to alert service via {}", self.adapter.name());
        Ok(())
    }

    pub async fn create_alert(&self, alert: &Alert) -> Result<Alert> {
        self.validator.for_create(alert)?;

        Ok(self.adapter.create_alert(alert).await?)
    }

    pub async fn retrieve_alert(&self, alert: &Alert) -> Result<Alert> {
        self.validator.for_query(alert)?;

        Ok(self.adapter.retrieve_alert(alert).await?)
    }

    /// Replace an alert by deleting it and creating it again
    ///
    /// Not atomic: if creation fails after the deletion succeeded, the alert
    /// no longer exists.
    pub async fn edit_alert(&self, alert: &Alert) -> Result<Alert> {
        self.validator.for_edit(alert)?;
        let query = query_for(alert)?;

        self.adapter.delete_alert(&query).await?;
        Ok(self.adapter.create_alert(alert).await?)
    }

    /// Start an alert, announcing `Starting` to local listeners first
    pub async fn enable_alert(&self, alert: &Alert) -> Result<()> {
        self.validator.for_query(alert)?;
        let query = query_for(alert)?;

        self.multiplexer
            .notify_alert_mutated(&alert.with_state(alert_state::STARTING));

        Ok(self.adapter.enable_alert(&query).await?)
    }

    /// Stop an alert, announcing `Stopping` to local listeners first
    pub async fn disable_alert(&self, alert: &Alert) -> Result<()> {
        self.validator.for_query(alert)?;
        let query = query_for(alert)?;

        self.multiplexer
            .notify_alert_mutated(&alert.with_state(alert_state::STOPPING));

        Ok(self.adapter.disable_alert(&query).await?)
    }

    pub async fn delete_alert(&self, alert: &Alert) -> Result<()> {
        self.validator.for_query(alert)?;
        let query = query_for(alert)?;

        Ok(self.adapter.delete_alert(&query).await?)
    }

    /// All alerts of the query's user, narrowed by `query.filter` when present
    pub async fn retrieve_alerts(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        self.validator.for_user(query)?;

        let alerts = self.adapter.retrieve_alerts(query).await?;

        Ok(match &query.filter {
            Some(f) if !f.is_empty() => filter::apply(alerts, f),
            _ => alerts,
        })
    }

    /// Share the alert feed of `query.user_id` within `query.alert_system`
    ///
    /// See [`SubscriptionMultiplexer::subscribe`].
    pub fn subscribe_alerts<C, D>(&self, query: &AlertQuery, on_change: C, on_delete: D) -> Result<Disposable>
    where
        C: Fn(Alert) + Send + Sync + 'static,
        D: Fn(Arc<Alert>) + Send + Sync + 'static,
    {
        self.multiplexer.subscribe(query, on_change, on_delete)
    }

    /// Entry point for adapters delivering a changed alert
    pub fn notify_mutated(&self, raw: Value) {
        self.multiplexer.notify_mutated(raw);
    }

    /// Entry point for adapters delivering a deleted alert
    pub fn notify_deleted(&self, raw: Value) {
        self.multiplexer.notify_deleted(raw);
    }

    /// A detached handle adapters can use to deliver notifications
    pub fn sink(&self) -> AlertSink {
        self.multiplexer.sink()
    }

    pub async fn get_targets(&self) -> Result<Vec<Target>> {
        Ok(self.adapter.get_targets().await?)
    }

    pub async fn get_properties(&self) -> Result<Vec<Property>> {
        Ok(self.adapter.get_properties().await?)
    }

    pub async fn get_operators(&self) -> Result<Vec<Operator>> {
        Ok(self.adapter.get_operators().await?)
    }

    pub async fn get_publisher_types(&self) -> Result<Value> {
        Ok(self.adapter.get_publisher_types().await?)
    }

    pub async fn get_publisher_type_defaults(&self, query: &AlertQuery) -> Result<Value> {
        Ok(self.adapter.get_publisher_type_defaults(query).await?)
    }

    /// Store delivery defaults; blank window bounds are sent as "no bound"
    pub async fn assign_publisher_type_default(&self, defaults: PublisherTypeDefault) -> Result<Value> {
        let defaults = defaults.normalized();

        Ok(self.adapter.assign_publisher_type_default(&defaults).await?)
    }

    pub async fn get_market_data_configuration(&self, query: &Value) -> Result<Value> {
        Ok(self.adapter.get_market_data_configuration(query).await?)
    }

    pub async fn assign_market_data_configuration(&self, configuration: &Value) -> Result<Value> {
        Ok(self.adapter.assign_market_data_configuration(configuration).await?)
    }

    pub async fn get_server_version(&self) -> Result<Value> {
        Ok(self.adapter.get_server_version().await?)
    }

    /// Subscriber counts for every key with live interest
    pub fn subscription_stats(&self) -> HashMap<SubscriptionKey, usize> {
        self.multiplexer.stats()
    }

    pub fn ref_count(&self, user_id: &str, alert_system: &str) -> usize {
        self.multiplexer
            .ref_count(&SubscriptionKey::new(user_id, alert_system))
    }

    pub fn is_subscribed(&self, user_id: &str, alert_system: &str) -> bool {
        self.multiplexer
            .is_subscribed(&SubscriptionKey::new(user_id, alert_system))
    }

    /// Close all transport subscriptions, then cancel every scheduled action
    ///
    /// Idempotent. Subscription handles issued earlier become harmless no-ops.
    pub fn dispose(&self) {
        if !self.lifecycle.is_disposed() {
            tracing::debug!("Disposing AlertManager");
        }
        self.lifecycle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle.is_disposed()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(AlertError::Disposed)
        } else {
            Ok(())
        }
    }
}

fn query_for(alert: &Alert) -> Result<AlertQuery> {
    alert
        .alert_id
        .clone()
        .filter(|id| !id.is_blank())
        .map(AlertQuery::for_alert)
        .ok_or_else(|| AlertError::missing("alert.alert_id"))
}

impl Drop for AlertManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertManager")
            .field("host", &self.config.host)
            .field("mode", &self.config.mode)
            .field("adapter", &self.adapter.name())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
