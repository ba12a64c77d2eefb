use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::store::StoreError;

/// Where debounced content ends up.
#[async_trait]
pub trait SaveTarget: Send + Sync {
    async fn save(&self, file_id: &str, content: &str) -> Result<(), StoreError>;
}

/// Debounced write-back of one file's edit stream.
///
/// Each edit restarts the quiet timer. Once the stream has been quiet for the
/// debounce interval the latest buffer is written, unless it is empty or
/// equal to what was last saved. Dropping the edit stream (via [`close`])
/// flushes a pending buffer under the same rules.
///
/// [`close`]: AutoSaver::close
pub struct AutoSaver {
    edits: mpsc::UnboundedSender<String>,
    saved: watch::Receiver<String>,
    task: JoinHandle<()>,
}

impl AutoSaver {
    pub fn spawn(
        target: Arc<dyn SaveTarget>,
        file_id: impl Into<String>,
        last_saved: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        let (edits, rx) = mpsc::unbounded_channel();
        let last_saved = last_saved.into();
        let (saved_tx, saved) = watch::channel(last_saved.clone());
        let file_id = file_id.into();
        info!(file_id=%file_id, debounce_ms = debounce.as_millis() as u64, "autosave started");
        let task = tokio::spawn(run(target, file_id, last_saved, debounce, rx, saved_tx));
        Self { edits, saved, task }
    }

    /// Replaces the pending buffer.
    pub fn edit(&self, content: impl Into<String>) {
        if self.edits.send(content.into()).is_err() {
            debug!("autosave task already stopped; edit dropped");
        }
    }

    pub fn last_saved(&self) -> String {
        self.saved.borrow().clone()
    }

    /// Notified after every successful write.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.saved.clone()
    }

    /// Flushes anything pending and waits for the task to finish. Returns the
    /// last successfully saved content.
    pub async fn close(self) -> String {
        let Self { edits, saved, task } = self;
        drop(edits);
        if let Err(e) = task.await {
            error!(err=%e, "autosave task failed");
        }
        let last = saved.borrow().clone();
        last
    }
}

async fn run(
    target: Arc<dyn SaveTarget>,
    file_id: String,
    mut last_saved: String,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<String>,
    saved_tx: watch::Sender<String>,
) {
    let mut pending: Option<String> = None;
    loop {
        let next = if pending.is_some() {
            tokio::select! {
                edit = rx.recv() => edit,
                _ = sleep(debounce) => {
                    if let Some(content) = pending.take() {
                        flush(&*target, &file_id, &mut last_saved, content, &saved_tx).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };
        match next {
            Some(content) => pending = Some(content),
            None => break,
        }
    }
    if let Some(content) = pending.take() {
        flush(&*target, &file_id, &mut last_saved, content, &saved_tx).await;
    }
    debug!(file_id=%file_id, "autosave stopped");
}

async fn flush(
    target: &dyn SaveTarget,
    file_id: &str,
    last_saved: &mut String,
    content: String,
    saved_tx: &watch::Sender<String>,
) {
    if content.is_empty() || content == *last_saved {
        debug!(file_id=%file_id, "nothing to autosave");
        return;
    }
    match target.save(file_id, &content).await {
        Ok(()) => {
            info!(file_id=%file_id, bytes = content.len(), "autosaved");
            saved_tx.send_replace(content.clone());
            *last_saved = content;
        }
        Err(e) => error!(file_id=%file_id, err=%e, "autosave failed"),
    }
}
