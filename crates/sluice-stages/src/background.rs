use std::future::Future;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, warn};

struct Task {
  cancel: CancellationToken,
  handle: JoinHandle<()>,
}

/// At most one cancellable background task owned by a stage.
#[derive(Default)]
pub(crate) struct Background {
  task: Mutex<Option<Task>>,
}

impl Background {
  /// Spawn `work` in `span`, replacing (and cancelling) any previous task.
  pub(crate) fn spawn<F, Fut>(&self, span: Span, work: F)
  where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(work(cancel.clone()).instrument(span));
    if let Some(previous) = self.task.lock().replace(Task { cancel, handle }) {
      previous.cancel.cancel();
    }
  }

  /// Cancel the task and wait for it to finish.
  pub(crate) async fn stop(&self) {
    let task = self.task.lock().take();
    if let Some(task) = task {
      task.cancel.cancel();
      if let Err(e) = task.handle.await {
        warn!(error = %e, "background_task_failed");
      }
    }
  }
}
