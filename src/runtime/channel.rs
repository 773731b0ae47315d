use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::{
    EvflowError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Notice, WorkflowExecutionInfo},
};

macro_rules! dispatch_notice {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().unwrap().clone();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_notice_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().unwrap().clone();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

const NOTICE_QUEUE_SIZE: usize = 2048;

pub type NoticeHandle = Arc<dyn Fn(&Notice) + Send + Sync>;
pub type NoticeHandleAsync = Arc<dyn Fn(&Notice) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the execution id
    /// eg. 3f2a*
    pub execution_id: String,

    /// use the glob pattern to match the activity name
    /// eg. charge_*
    pub activity: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            execution_id: "*".to_string(),
            activity: "*".to_string(),
        }
    }
}

#[allow(unused)]
impl ChannelOptions {
    pub fn new(
        execution_id: String,
        activity: String,
    ) -> Self {
        Self {
            execution_id,
            activity,
        }
    }

    pub fn with_execution(execution: &WorkflowExecutionInfo) -> Self {
        Self {
            execution_id: execution.execution_id.clone(),
            activity: "*".to_string(),
        }
    }

    pub fn with_activity(activity: String) -> Self {
        Self {
            execution_id: "*".to_string(),
            activity,
        }
    }
}

/// Broadcast of [`Notice`]s to observers.
#[derive(Clone)]
pub struct Channel {
    notice_queue: Arc<BroadcastQueue<Notice>>,

    notices: ShareLock<Vec<NoticeHandle>>,
    notices_async: ShareLock<Vec<NoticeHandleAsync>>,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            notice_queue: BroadcastQueue::new(NOTICE_QUEUE_SIZE),
            notices: Arc::new(RwLock::new(Vec::new())),
            notices_async: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn publish(
        &self,
        notice: Notice,
    ) {
        let _ = self.notice_queue.send(notice);
    }

    pub(crate) fn listen(&self) {
        let mut notice_queue = self.notice_queue.subscribe();
        let notices = self.notices.clone();
        let notices_async = self.notices_async.clone();

        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Ok(n) = notice_queue.recv() => {
                        let notice = n.clone();
                        dispatch_notice!(notices, &notice);
                        dispatch_notice_async!(notices_async, &n);
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Filtered registration of notice callbacks.
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: (globset::GlobMatcher, globset::GlobMatcher),
}

#[allow(unused)]
impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let compile = |pattern: &str| {
            globset::Glob::new(pattern).map(|g| g.compile_matcher()).map_err(|e| EvflowError::Config(format!("invalid glob {}: {}", pattern, e)))
        };
        Ok(Self {
            channel,
            glob: (compile(&options.execution_id)?, compile(&options.activity)?),
        })
    }

    /// Called once per execution that completes.
    pub fn on_complete(
        &self,
        f: impl Fn(WorkflowExecutionInfo) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.notices.write().unwrap().push(Arc::new(move |n| {
            if n.is_complete() && is_match(&glob, n) {
                f(n.execution.clone());
            }
        }));
    }

    /// Called once per execution that fails or times out.
    pub fn on_error(
        &self,
        f: impl Fn(&Notice) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.notices.write().unwrap().push(Arc::new(move |n| {
            if n.is_error() && is_match(&glob, n) {
                f(n);
            }
        }));
    }

    pub fn on_notice(
        &self,
        f: impl Fn(&Notice) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.notices.write().unwrap().push(Arc::new(move |n| {
            if is_match(&glob, n) {
                f(n);
            }
        }));
    }

    pub fn on_notice_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Notice) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let glob = self.glob.clone();

        self.channel.notices_async.write().unwrap().push(Arc::new(move |n| {
            if is_match(&glob, n) {
                f(n)
            } else {
                Box::pin(async {})
            }
        }));
    }
}

/// Execution level notices carry an empty activity and only match the `*` activity pattern.
fn is_match(
    glob: &(globset::GlobMatcher, globset::GlobMatcher),
    n: &Notice,
) -> bool {
    let (pat_execution, pat_activity) = glob;
    pat_execution.is_match(&n.execution.execution_id) && pat_activity.is_match(&n.activity)
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tokio::runtime::Handle;

    use crate::{
        events::{ErrorInfo, ErrorKind, Notice, NoticeKind, WorkflowExecutionInfo},
        runtime::{Channel, ChannelEvent, ChannelOptions},
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_filters_by_execution() {
        let channel = Arc::new(Channel::new(Handle::current()));
        let watched = WorkflowExecutionInfo::new("wf", "1", "p");
        let other = WorkflowExecutionInfo::new("wf", "1", "p");

        let completed = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(0));
        let event = ChannelEvent::channel(channel.clone(), ChannelOptions::with_execution(&watched)).unwrap();
        let sink = completed.clone();
        event.on_complete(move |info| sink.lock().unwrap().push(info.execution_id));
        let sink = errors.clone();
        event.on_error(move |_| *sink.lock().unwrap() += 1);
        channel.listen();

        channel.publish(Notice::new(&other, "", NoticeKind::Completed));
        channel.publish(Notice::new(&watched, "a1", NoticeKind::ActivityCompleted));
        channel.publish(Notice::new(&watched, "", NoticeKind::Completed));
        channel.publish(Notice::new(&watched, "", NoticeKind::Failed(ErrorInfo::new(ErrorKind::Timeout, "late", None))));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*completed.lock().unwrap(), vec![watched.execution_id.clone()]);
        assert_eq!(*errors.lock().unwrap(), 1);
        channel.shutdown();
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let channel = Arc::new(Channel::new(rt.handle().clone()));
        let options = ChannelOptions::with_activity("[".to_string());
        assert!(ChannelEvent::channel(channel, options).is_err());
    }
}
