//! # Evflow
//!
//! Evflow is an event-driven workflow execution engine. A workflow is a
//! graph of activities connected by named events: an activity publishes
//! events, other activities subscribe to them, and an activity runs once
//! every event it subscribes to has arrived.
//!
//! ## Core Features
//!
//! - **At-least-once delivery**: Messages are retried a bounded number of times and never silently dropped
//! - **Exactly-once joins**: Multi-input activities are triggered once under any ordering or duplication of events
//! - **Optimistic concurrency**: All shared state lives in ETag guarded stores, there is no global lock
//! - **Pluggable Storage**: Supports in-memory storage (testing) and PostgreSQL (production)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use evflow::{ActivityModel, ActivityRegistry, EngineBuilder, WorkflowModel};
//!
//! let engine = EngineBuilder::new().factory(registry).build()?;
//! engine.launch();
//!
//! let workflow = WorkflowModel::new("order", "1")
//!     .activity(ActivityModel::new("place").publish("placed"))
//!     .activity(ActivityModel::new("charge").subscribe("placed"));
//! engine.deploy(&workflow)?;
//! let handle = engine.start_new("order", "1", "tenant-a").await?;
//! ```

mod builder;
mod common;
mod config;
mod dispatcher;
mod engine;
mod error;
pub mod events;
mod model;
pub mod runtime;
pub mod store;
mod utils;
pub mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::{JsonSerializer, Serializer, SerializerExt};
pub use config::{Config, PostgresConfig, ProcessorConfig, StoreConfig, StoreType, WorkflowConfig};
pub use engine::{Engine, ExecutionHandle};
pub use error::EvflowError;
pub use model::*;
pub use runtime::{ChannelEvent, ChannelOptions};
pub use store::data::{ExecutionEntity, ExecutionStatus};
pub use workflow::{Activity, ActivityContext, ActivityFactory, ActivityOutput, ActivityRegistry};

/// Result type alias for Evflow operations.
pub type Result<T> = std::result::Result<T, EvflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
