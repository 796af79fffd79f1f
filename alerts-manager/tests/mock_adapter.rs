//! Mock adapter implementation for testing.
//!
//! `MockAdapter` records every call the manager makes, keeps the sinks it is
//! handed so tests can push notifications as if they came from the service,
//! and supports configurable failure modes to test error paths.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use alerts_manager::{
    AdapterError, AdapterResult, Alert, AlertAdapter, AlertQuery, AlertSink, Disposable, Id,
    Operator, Property, PublisherTypeDefault, Target,
};
use async_trait::async_trait;
use serde_json::{json, Value};

/// One transport-level subscription opened through the mock
#[derive(Clone, Debug)]
pub struct OpenedBinding {
    pub query: AlertQuery,
    pub sink: AlertSink,
    pub binding: Disposable,
}

#[derive(Clone, Default)]
pub struct MockAdapter {
    calls: Arc<Mutex<Vec<String>>>,
    opened: Arc<Mutex<Vec<OpenedBinding>>>,
    alerts: Arc<Mutex<Vec<Alert>>>,
    assigned_defaults: Arc<Mutex<Vec<PublisherTypeDefault>>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
    closed_count: Arc<AtomicU32>,
    connect_failures_left: Arc<AtomicU32>,
    should_fail_subscribe: Arc<AtomicBool>,
    should_fail_create: Arc<AtomicBool>,
    should_fail_enable: Arc<AtomicBool>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `alerts` from `retrieve_alerts`
    pub fn with_alerts(alerts: Vec<Alert>) -> Self {
        let adapter = Self::new();
        *adapter.alerts.lock().unwrap() = alerts;
        adapter
    }

    /// Fail the next `times` calls to `connect`
    pub fn fail_connect(&self, times: u32) {
        self.connect_failures_left.store(times, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.should_fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.should_fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_enable(&self, fail: bool) {
        self.should_fail_enable.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Number of transport-level subscriptions opened
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    /// Number of transport-level subscriptions closed
    pub fn closed_count(&self) -> u32 {
        self.closed_count.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<OpenedBinding> {
        self.opened.lock().unwrap().clone()
    }

    /// Sink of the most recently opened transport subscription
    pub fn last_sink(&self) -> AlertSink {
        self.opened
            .lock()
            .unwrap()
            .last()
            .map(|opened| opened.sink.clone())
            .expect("no transport subscription has been opened")
    }

    pub fn assigned_defaults(&self) -> Vec<PublisherTypeDefault> {
        self.assigned_defaults.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

fn id_of(query: &AlertQuery) -> String {
    query.alert_id.as_ref().map(Id::to_string).unwrap_or_default()
}

#[async_trait]
impl AlertAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.record("connect");

        let failing = self
            .connect_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();

        if failing {
            Err(AdapterError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn create_alert(&self, alert: &Alert) -> AdapterResult<Alert> {
        let id = alert.alert_id.as_ref().map_or_else(|| "new".to_string(), Id::to_string);
        self.record(format!("create {id}"));

        if self.should_fail_create.load(Ordering::SeqCst) {
            return Err(AdapterError::Remote {
                status: 500,
                message: "create failed".to_string(),
            });
        }

        let mut created = alert.clone();
        if created.alert_id.is_none() {
            created.alert_id = Some(Id::from("generated-1"));
        }
        Ok(created)
    }

    async fn retrieve_alert(&self, alert: &Alert) -> AdapterResult<Alert> {
        let id = alert.alert_id.as_ref().map(Id::to_string).unwrap_or_default();
        self.record(format!("retrieve {id}"));

        self.alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.alert_id == alert.alert_id)
            .cloned()
            .ok_or(AdapterError::Remote {
                status: 404,
                message: format!("alert {id} not found"),
            })
    }

    async fn delete_alert(&self, query: &AlertQuery) -> AdapterResult<()> {
        self.record(format!("delete {}", id_of(query)));
        Ok(())
    }

    async fn enable_alert(&self, query: &AlertQuery) -> AdapterResult<()> {
        self.record(format!("enable {}", id_of(query)));

        if self.should_fail_enable.load(Ordering::SeqCst) {
            return Err(AdapterError::NotConnected);
        }
        Ok(())
    }

    async fn disable_alert(&self, query: &AlertQuery) -> AdapterResult<()> {
        self.record(format!("disable {}", id_of(query)));
        Ok(())
    }

    async fn retrieve_alerts(&self, query: &AlertQuery) -> AdapterResult<Vec<Alert>> {
        self.record(format!(
            "retrieve_alerts {}",
            query.user_id.as_deref().unwrap_or_default()
        ));
        Ok(self.alerts.lock().unwrap().clone())
    }

    fn subscribe_alerts(&self, query: &AlertQuery, sink: AlertSink) -> AdapterResult<Disposable> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.record(format!(
            "subscribe {}/{}",
            query.user_id.as_deref().unwrap_or_default(),
            query.alert_system.as_deref().unwrap_or_default()
        ));

        if self.should_fail_subscribe.load(Ordering::SeqCst) {
            return Err(AdapterError::Transport("subscribe rejected".to_string()));
        }

        let binding = {
            let closed = Arc::clone(&self.closed_count);
            Disposable::from_action(move || {
                closed.fetch_add(1, Ordering::SeqCst);
            })
        };

        self.opened.lock().unwrap().push(OpenedBinding {
            query: query.clone(),
            sink,
            binding: binding.clone(),
        });

        Ok(binding)
    }

    async fn get_targets(&self) -> AdapterResult<Vec<Target>> {
        Ok(vec![Target::symbol("AAPL")])
    }

    async fn get_properties(&self) -> AdapterResult<Vec<Property>> {
        Ok(serde_json::from_value(json!([
            {"property_id": 1, "target": {"target_id": 1}, "valid_operators": [1], "group": "Price"}
        ]))?)
    }

    async fn get_operators(&self) -> AdapterResult<Vec<Operator>> {
        Ok(serde_json::from_value(json!([
            {"operator_id": 1, "operator_name": "gt"}
        ]))?)
    }

    async fn assign_publisher_type_default(
        &self,
        defaults: &PublisherTypeDefault,
    ) -> AdapterResult<Value> {
        self.assigned_defaults.lock().unwrap().push(defaults.clone());
        Ok(serde_json::to_value(defaults)?)
    }

    async fn get_server_version(&self) -> AdapterResult<Value> {
        Ok(json!({"semver": "1.2.3"}))
    }
}
