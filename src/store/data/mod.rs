mod activity;
mod event;
mod execution;

pub use activity::ActivityStateEntity;
pub use event::EventEntity;
pub use execution::{ActivityFailure, ExecutionEntity, ExecutionStatus};
