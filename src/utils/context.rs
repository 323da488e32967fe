use crate::models::error::SError;
use crate::models::task_status::TaskStatus;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::spawn_blocking;
use tokio::task_local;

task_local! {
     static CHANNEL: UnboundedSender<TaskStatus>;
}

pub struct TaskContext;

impl TaskContext {
    /// Runs a blocking engine operation on the blocking pool with `channel` installed as the
    /// event sink, so the caller's runtime stays responsive.
    pub async fn provide<F, R>(channel: UnboundedSender<TaskStatus>, f: F) -> Result<R, SError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        spawn_blocking(move || CHANNEL.sync_scope(channel, f))
            .await
            .map_err(|e| SError::AsyncRuntimeError(e.to_string()))
    }

    pub fn emit(status: TaskStatus) -> Result<(), SError> {
        CHANNEL
            .try_with(|c| {
                c.send(status)
                    .map_err(|e| SError::UpdateStatusError(e.to_string()))
            })
            .unwrap_or_else(|_| Err(SError::ContextUnprovided))
    }

    /// Fire-and-forget variant for call sites that may run without a listener.
    pub fn notify(status: TaskStatus) {
        let _ = Self::emit(status);
    }
}
