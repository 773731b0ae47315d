mod activity;
mod workflow;

pub use activity::ActivityModel;
pub use workflow::{ErrorStrategy, WorkflowModel};
