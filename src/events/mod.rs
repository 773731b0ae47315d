//! Message types exchanged by the engine.
//!
//! Two message families travel through the queues: [`EventMessage`] carries
//! a published [`Event`] on the data plane and [`ControlMessage`] carries an
//! orchestration directive on the control plane. [`Notice`] is broadcast to
//! observers and never drives execution.

mod control;
mod event;
mod execution;
mod notice;

pub use control::{ControlMessage, ControlMessageType, ErrorInfo, ErrorKind};
pub use event::{Event, EventMessage};
pub use execution::WorkflowExecutionInfo;
pub use notice::{Notice, NoticeKind};

/// Common envelope contract for everything a message processor handles.
pub trait Message: std::fmt::Debug + Clone + Send + Sync + 'static {
    /// Unique id of this message instance.
    fn id(&self) -> &str;

    /// The execution this message belongs to.
    fn execution(&self) -> &WorkflowExecutionInfo;

    /// Builds the error report sent when this message is dropped after its
    /// last attempt. Returns `None` for messages that are error reports
    /// themselves.
    fn delivery_failure(
        &self,
        reason: &str,
    ) -> Option<ControlMessage>;
}
