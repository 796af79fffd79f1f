//! Shared alert subscriptions keyed by (user, alert system)
//!
//! Many local callers may subscribe to the same alert feed. The
//! [`SubscriptionMultiplexer`] keeps one record per key, opens a single
//! transport-level subscription when the first caller arrives, and closes it
//! when the last caller's handle is disposed. Notifications coming back from
//! the adapter are routed to the record's change/delete events.
//!
//! # Record invariants
//!
//! - At most one record exists per key; records are never removed, so a key
//!   whose count returns to zero reuses the same events later.
//! - A record with `subscribers == 0` holds no transport binding.
//! - A record with `subscribers > 0` holds exactly one binding once its
//!   establishment has settled. While the establishment hook runs the record
//!   is marked as establishing, and every other subscriber for the key waits
//!   for that attempt. If it fails, a waiting subscriber makes the next
//!   attempt, so the key never stays subscribed without a binding.
//! - Notifications reach listeners only while the key has subscribers and
//!   the multiplexer is not disposed.
//!
//! The lookup-or-create and the count change happen inside one map entry
//! lock. Bindings are created and disposed outside the lock; a binding whose
//! establishment was superseded (released to zero, or closed by disposal)
//! while the hook was running is disposed on arrival.
//!
//! The establishment hook must not subscribe to its own key; that subscriber
//! would wait on itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;

use alerts_common::{Disposable, Event, FireReport};

use crate::adapter::AlertAdapter;
use crate::error::{AlertError, Result};
use crate::model::{Alert, AlertQuery};

/// Identity of a shared subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub user_id: String,
    pub alert_system: String,
}

impl SubscriptionKey {
    pub fn new(user_id: impl Into<String>, alert_system: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            alert_system: alert_system.into(),
        }
    }

    /// Key of a subscribe request; both identifiers must be non-empty
    pub fn from_query(query: &AlertQuery) -> Result<Self> {
        let user_id = non_empty(&query.user_id).ok_or_else(|| AlertError::missing("query.user_id"))?;
        let alert_system =
            non_empty(&query.alert_system).ok_or_else(|| AlertError::missing("query.alert_system"))?;

        Ok(Self::new(user_id, alert_system))
    }

    /// Key named by an alert's own ownership fields
    pub fn from_alert(alert: &Alert) -> Option<Self> {
        Some(Self::new(
            alert.user_id.as_deref()?,
            alert.alert_system.as_deref()?,
        ))
    }

    /// The query handed to the adapter's establishment hook
    pub fn to_query(&self) -> AlertQuery {
        AlertQuery::for_user(self.user_id.clone(), self.alert_system.clone())
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.alert_system)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// One in-flight run of the adapter's establishment hook
#[derive(Default)]
struct Establishment {
    settled: Mutex<bool>,
    ready: Condvar,
}

impl Establishment {
    fn settle(&self) {
        *self.settled.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.ready.notify_all();
    }

    fn wait(&self) {
        let settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
        let _settled = self
            .ready
            .wait_while(settled, |settled| !*settled)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

enum BindingState {
    Idle,
    Establishing(Arc<Establishment>),
    Bound(Disposable),
}

impl BindingState {
    fn is_run_of(&self, establishment: &Arc<Establishment>) -> bool {
        matches!(self, BindingState::Establishing(current) if Arc::ptr_eq(current, establishment))
    }

    fn take_bound(&mut self) -> Option<Disposable> {
        match std::mem::replace(self, BindingState::Idle) {
            BindingState::Bound(binding) => Some(binding),
            other => {
                *self = other;
                None
            }
        }
    }
}

/// What a subscriber still has to do once its count is registered
enum Role {
    Bound,
    Wait(Arc<Establishment>),
    Establish(Arc<Establishment>),
}

struct SubscriptionRecord {
    change_event: Event<Alert>,
    delete_event: Event<Arc<Alert>>,
    subscribers: usize,
    binding: BindingState,
}

impl SubscriptionRecord {
    fn new(key: &SubscriptionKey) -> Self {
        Self {
            change_event: Event::new(format!("alert changes {key}")),
            delete_event: Event::new(format!("alert deletions {key}")),
            subscribers: 0,
            binding: BindingState::Idle,
        }
    }

    fn role(&mut self) -> Role {
        match &self.binding {
            BindingState::Bound(_) => Role::Bound,
            BindingState::Establishing(run) => Role::Wait(Arc::clone(run)),
            BindingState::Idle => {
                let run = Arc::new(Establishment::default());
                self.binding = BindingState::Establishing(Arc::clone(&run));
                Role::Establish(run)
            }
        }
    }
}

/// Keyed record store shared by the multiplexer and its sinks
struct SubscriptionStore {
    records: DashMap<SubscriptionKey, SubscriptionRecord>,
    closed: AtomicBool,
}

impl SubscriptionStore {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Role of a subscriber already counted for `key`, after an
    /// establishment it waited on has settled
    fn role(&self, key: &SubscriptionKey) -> Result<Role> {
        if self.is_closed() {
            return Err(AlertError::Disposed);
        }

        match self.records.get_mut(key) {
            Some(mut record) if record.subscribers > 0 => Ok(record.role()),
            _ => Err(AlertError::Disposed),
        }
    }

    /// Store the binding of `run`; false when it was superseded and disposed
    fn attach(&self, key: &SubscriptionKey, run: &Arc<Establishment>, binding: Disposable) -> bool {
        let stale = match self.records.get_mut(key) {
            Some(mut record) if record.binding.is_run_of(run) => {
                if record.subscribers > 0 && !self.is_closed() {
                    record.binding = BindingState::Bound(binding);
                    None
                } else {
                    record.binding = BindingState::Idle;
                    Some(binding)
                }
            }
            _ => Some(binding),
        };

        match stale {
            Some(binding) => {
                tracing::debug!("Discarding stale transport binding for {}", key);
                binding.dispose();
                false
            }
            None => true,
        }
    }

    /// Forget a failed establishment so the next subscriber retries
    fn abandon(&self, key: &SubscriptionKey, run: &Arc<Establishment>) {
        if let Some(mut record) = self.records.get_mut(key) {
            if record.binding.is_run_of(run) {
                record.binding = BindingState::Idle;
            }
        }
    }

    fn release(&self, key: &SubscriptionKey) {
        let binding = match self.records.get_mut(key) {
            Some(mut record) => {
                let previous = record.subscribers;
                record.subscribers = previous.saturating_sub(1);

                tracing::debug!(
                    "Alert subscription count for {}: {} -> {}",
                    key,
                    previous,
                    record.subscribers
                );

                if record.subscribers == 0 {
                    record.binding.take_bound()
                } else {
                    None
                }
            }
            None => {
                tracing::warn!("Released alert subscription for {} but no record exists", key);
                None
            }
        };

        if let Some(binding) = binding {
            tracing::debug!("Closing transport subscription for {}", key);
            binding.dispose();
        }
    }

    fn route_mutated(&self, alert: &Alert) -> Option<FireReport> {
        let key = SubscriptionKey::from_alert(alert)?;
        let event = self.live_record(&key, |record| record.change_event.clone())?;

        Some(event.fire(alert))
    }

    fn route_deleted(&self, alert: Arc<Alert>) -> Option<FireReport> {
        let key = SubscriptionKey::from_alert(&alert)?;
        let event = self.live_record(&key, |record| record.delete_event.clone())?;

        Some(event.fire(&alert))
    }

    fn live_record<R>(
        &self,
        key: &SubscriptionKey,
        read: impl FnOnce(&SubscriptionRecord) -> R,
    ) -> Option<R> {
        if self.is_closed() {
            return None;
        }

        self.records
            .get(key)
            .filter(|record| record.subscribers > 0)
            .map(|record| read(record.value()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let bindings: Vec<(SubscriptionKey, Disposable)> = self
            .records
            .iter_mut()
            .filter_map(|mut entry| {
                let key = entry.key().clone();
                let record = entry.value_mut();
                record.subscribers = 0;
                match std::mem::replace(&mut record.binding, BindingState::Idle) {
                    BindingState::Bound(binding) => Some((key, binding)),
                    _ => None,
                }
            })
            .collect();

        tracing::debug!(
            "Closing {} transport subscriptions on disposal",
            bindings.len()
        );

        for (key, binding) in bindings {
            tracing::trace!("Closing transport subscription for {}", key);
            binding.dispose();
        }
    }
}

/// Settles an establishment run however the hook returns
///
/// Without an attached binding the run is abandoned and the establishing
/// subscriber's interest is released. Waiting subscribers are woken either
/// way.
struct PendingEstablishment<'a> {
    store: &'a SubscriptionStore,
    key: &'a SubscriptionKey,
    run: Arc<Establishment>,
    attached: bool,
}

impl PendingEstablishment<'_> {
    fn attach(mut self, binding: Disposable) -> Result<()> {
        self.attached = true;

        if self.store.attach(self.key, &self.run, binding) {
            Ok(())
        } else {
            Err(AlertError::Disposed)
        }
    }
}

impl Drop for PendingEstablishment<'_> {
    fn drop(&mut self) {
        if !self.attached {
            self.store.abandon(self.key, &self.run);
            self.store.release(self.key);
        }
        self.run.settle();
    }
}

/// Parse a raw notification; only non-object input is dropped
fn parse_notification(raw: Value) -> Option<Alert> {
    let Value::Object(fields) = raw else {
        tracing::trace!("Ignoring non-object alert notification");
        return None;
    };

    match Alert::deserialize(&Value::Object(fields.clone())) {
        Ok(alert) => Some(alert),
        Err(e) => {
            tracing::debug!("Decoding alert notification loosely: {}", e);
            Some(Alert::from_loose(fields))
        }
    }
}

/// Callback handle given to the adapter with each transport-level subscription
///
/// The sink does not keep the multiplexer alive; once it is gone, reported
/// notifications are silently dropped.
#[derive(Clone)]
pub struct AlertSink {
    store: Weak<SubscriptionStore>,
}

impl AlertSink {
    /// Report a created or changed alert as received from the service
    pub fn alert_mutated(&self, raw: Value) {
        if let (Some(store), Some(alert)) = (self.store.upgrade(), parse_notification(raw)) {
            store.route_mutated(&alert);
        }
    }

    /// Report a deleted alert as received from the service
    pub fn alert_deleted(&self, raw: Value) {
        if let (Some(store), Some(alert)) = (self.store.upgrade(), parse_notification(raw)) {
            store.route_deleted(Arc::new(alert));
        }
    }

    /// Whether the owning multiplexer still exists and is not disposed
    pub fn is_live(&self) -> bool {
        self.store.upgrade().map_or(false, |store| !store.is_closed())
    }
}

impl fmt::Debug for AlertSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertSink").field("live", &self.is_live()).finish()
    }
}

/// Reference-counted fan-out of alert notifications per (user, alert system)
pub struct SubscriptionMultiplexer {
    store: Arc<SubscriptionStore>,
    adapter: Arc<dyn AlertAdapter>,
    lifecycle: Disposable,
}

impl SubscriptionMultiplexer {
    pub fn new(adapter: Arc<dyn AlertAdapter>) -> Self {
        let store = Arc::new(SubscriptionStore {
            records: DashMap::new(),
            closed: AtomicBool::new(false),
        });

        let lifecycle = {
            let store = Arc::clone(&store);
            Disposable::from_action(move || store.close())
        };

        Self {
            store,
            adapter,
            lifecycle,
        }
    }

    /// Register interest in the alerts of `query.user_id` within `query.alert_system`
    ///
    /// The first subscriber for a key makes the adapter open the transport
    /// subscription. `on_change` receives its own copy of every mutated alert;
    /// `on_delete` receives the deleted alert as reported.
    ///
    /// Disposing the returned handle releases this caller's interest and
    /// removes both callbacks. It is idempotent and never affects other
    /// handles beyond the shared count.
    ///
    /// # Errors
    ///
    /// * `AlertError::InvalidArgument` - `user_id` or `alert_system` is missing
    /// * `AlertError::Disposed` - the multiplexer has been disposed
    /// * `AlertError::Adapter` - the establishment hook failed
    pub fn subscribe<C, D>(&self, query: &AlertQuery, on_change: C, on_delete: D) -> Result<Disposable>
    where
        C: Fn(Alert) + Send + Sync + 'static,
        D: Fn(Arc<Alert>) + Send + Sync + 'static,
    {
        let key = SubscriptionKey::from_query(query)?;

        if self.store.is_closed() {
            return Err(AlertError::Disposed);
        }

        let (change_event, delete_event, mut role) = {
            let mut record = self
                .store
                .records
                .entry(key.clone())
                .or_insert_with(|| SubscriptionRecord::new(&key));

            let previous = record.subscribers;
            record.subscribers += 1;

            tracing::debug!(
                "Alert subscription count for {}: {} -> {}",
                key,
                previous,
                record.subscribers
            );

            (
                record.change_event.clone(),
                record.delete_event.clone(),
                record.role(),
            )
        };

        loop {
            match role {
                Role::Bound => break,
                Role::Wait(run) => {
                    tracing::trace!("Waiting for transport subscription for {}", key);
                    run.wait();
                    role = self.store.role(&key)?;
                }
                Role::Establish(run) => {
                    self.establish(&key, run)?;
                    break;
                }
            }
        }

        let change_registration = change_event.register(on_change);
        let delete_registration = delete_event.register(on_delete);

        let interest = {
            let store = Arc::downgrade(&self.store);
            Disposable::from_action(move || {
                if let Some(store) = store.upgrade() {
                    store.release(&key);
                }
            })
        };

        Ok(Disposable::composite(vec![
            interest,
            change_registration,
            delete_registration,
        ]))
    }

    fn establish(&self, key: &SubscriptionKey, run: Arc<Establishment>) -> Result<()> {
        tracing::debug!(
            "Opening transport subscription for {} via {}",
            key,
            self.adapter.name()
        );

        let pending = PendingEstablishment {
            store: &self.store,
            key,
            run,
            attached: false,
        };

        match self.adapter.subscribe_alerts(&key.to_query(), self.sink()) {
            Ok(binding) => pending.attach(binding),
            Err(e) => {
                tracing::warn!("Failed to open transport subscription for {}: {}", key, e);
                Err(e.into())
            }
        }
    }

    /// Route a raw mutation notification from the adapter
    ///
    /// Non-object input is ignored, as are alerts whose key currently has no
    /// subscribers. Objects that do not fit the typed model are decoded
    /// loosely and still routed by their `user_id` and `alert_system`.
    pub fn notify_mutated(&self, raw: Value) {
        if let Some(alert) = parse_notification(raw) {
            self.notify_alert_mutated(&alert);
        }
    }

    /// Route a raw deletion notification from the adapter
    pub fn notify_deleted(&self, raw: Value) {
        if let Some(alert) = parse_notification(raw) {
            self.notify_alert_deleted(Arc::new(alert));
        }
    }

    /// Deliver a copy of `alert` to the change listeners of its key
    pub fn notify_alert_mutated(&self, alert: &Alert) -> Option<FireReport> {
        self.store.route_mutated(alert)
    }

    /// Deliver `alert` to the delete listeners of its key
    pub fn notify_alert_deleted(&self, alert: Arc<Alert>) -> Option<FireReport> {
        self.store.route_deleted(alert)
    }

    /// A sink routing adapter notifications into this multiplexer
    pub fn sink(&self) -> AlertSink {
        AlertSink {
            store: Arc::downgrade(&self.store),
        }
    }

    /// Current subscriber count for every key with live interest
    pub fn stats(&self) -> HashMap<SubscriptionKey, usize> {
        self.store
            .records
            .iter()
            .filter(|entry| entry.subscribers > 0)
            .map(|entry| (entry.key().clone(), entry.subscribers))
            .collect()
    }

    /// Current subscriber count for `key`
    pub fn ref_count(&self, key: &SubscriptionKey) -> usize {
        self.store
            .records
            .get(key)
            .map_or(0, |record| record.subscribers)
    }

    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.ref_count(key) > 0
    }

    /// Whether a transport binding is currently held for `key`
    pub fn has_binding(&self, key: &SubscriptionKey) -> bool {
        self.store
            .records
            .get(key)
            .map_or(false, |record| matches!(record.binding, BindingState::Bound(_)))
    }

    /// Close every transport subscription and reject new subscribers
    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.store.is_closed()
    }

    pub fn as_disposable(&self) -> Disposable {
        self.lifecycle.clone()
    }
}

impl Drop for SubscriptionMultiplexer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SubscriptionMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionMultiplexer")
            .field("adapter", &self.adapter.name())
            .field("keys", &self.store.records.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
