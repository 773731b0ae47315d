use crate::events::{ErrorInfo, WorkflowExecutionInfo};

/// What happened to an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    ActivityCompleted,
    ActivityFailed(ErrorInfo),
    Completed,
    Failed(ErrorInfo),
    TimedOut,
}

impl NoticeKind {
    pub fn str(&self) -> &str {
        match self {
            NoticeKind::ActivityCompleted => "ActivityCompleted",
            NoticeKind::ActivityFailed(_) => "ActivityFailed",
            NoticeKind::Completed => "Completed",
            NoticeKind::Failed(_) => "Failed",
            NoticeKind::TimedOut => "TimedOut",
        }
    }
}

/// Observability notice broadcast on the engine channel.
#[derive(Debug, Clone)]
pub struct Notice {
    pub execution: WorkflowExecutionInfo,
    /// Activity the notice is about, empty for execution level notices.
    pub activity: String,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn new(
        execution: &WorkflowExecutionInfo,
        activity: &str,
        kind: NoticeKind,
    ) -> Self {
        Self {
            execution: execution.clone(),
            activity: activity.to_string(),
            kind,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.kind, NoticeKind::Completed)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, NoticeKind::Failed(_) | NoticeKind::TimedOut)
    }
}
