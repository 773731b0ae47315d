//! Workflow definitions and the user activity contract.

mod activity;
mod context;
mod definition;

pub use activity::{Activity, ActivityFactory, ActivityOutput, ActivityRegistry, FnActivity};
pub use context::ActivityContext;
pub use definition::WorkflowDefinition;
