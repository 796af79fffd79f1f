//! # alerts-manager
//!
//! Client-side coordination layer in front of a remote alert service.
//!
//! The [`AlertManager`] validates and forwards alert operations to a
//! pluggable [`AlertAdapter`] (REST or socket transport), and multiplexes
//! alert subscriptions: any number of local subscribers for the same
//! (user, alert system) share a single transport-level subscription, which is
//! opened for the first subscriber and closed after the last one leaves.
//!
//! ```rust,ignore
//! use alerts_manager::prelude::*;
//!
//! let manager = AlertManagerBuilder::new()
//!     .with_adapter(adapter)
//!     .build()?;
//!
//! let handle = manager.subscribe_alerts(
//!     &AlertQuery::for_user("me", "alerts.example.com"),
//!     |changed| println!("{:?}", changed.alert_state),
//!     |deleted| println!("{:?} deleted", deleted.alert_id),
//! )?;
//!
//! handle.dispose();
//! ```

pub mod adapter;
pub mod builder;
pub mod config;
pub mod error;
pub mod filter;
pub mod manager;
pub mod metadata;
pub mod model;
pub mod subscription;
pub mod validate;

pub use adapter::AlertAdapter;
pub use builder::AlertManagerBuilder;
pub use config::{ManagerConfig, TransportMode};
pub use error::{AdapterError, AdapterResult, AlertError, Result, ValidationError};
pub use manager::AlertManager;
pub use metadata::PropertyNode;
pub use model::{
    alert_state, Alert, AlertFilter, AlertQuery, Condition, ConditionFilter, Id, Operator, Property,
    PublisherTypeDefault, Target, TargetFilter,
};
pub use subscription::{AlertSink, SubscriptionKey, SubscriptionMultiplexer};
pub use validate::{AlertValidator, ShapeValidator};

pub use alerts_common::{BackoffPolicy, Disposable};

/// Common imports for adapter authors and applications
pub mod prelude {
    pub use crate::{
        Alert, AlertAdapter, AlertError, AlertManager, AlertManagerBuilder, AlertQuery, AlertSink,
        Disposable, ManagerConfig, TransportMode,
    };
}
