//! Live processing progress for a document, read from the backend's SSE feed
//!
//! The observer is advisory: it mirrors whatever the server last reported and
//! never affects whether a run succeeds.

use crate::backend::AnalyzerBackend;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Last reported progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub document_id: Option<String>,
    pub percent: u8,
    pub stage: String,
    pub active: bool,
}

struct Subscription {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one open progress stream
pub struct ProgressObserver {
    backend: Arc<dyn AnalyzerBackend>,
    state: Arc<watch::Sender<ProgressState>>,
    generation: Arc<AtomicU64>,
    current: Option<Subscription>,
}

impl ProgressObserver {
    pub fn new(backend: Arc<dyn AnalyzerBackend>) -> Self {
        let (tx, _rx) = watch::channel(ProgressState::default());
        Self {
            backend,
            state: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            current: None,
        }
    }

    /// Open the stream for `document_id`, closing any previous one first
    pub fn start(&mut self, document_id: &str) {
        self.close();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(ProgressState {
            document_id: Some(document_id.to_string()),
            percent: 0,
            stage: String::new(),
            active: true,
        });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch_stream(
            self.backend.clone(),
            document_id.to_string(),
            self.state.clone(),
            self.generation.clone(),
            generation,
            cancel.clone(),
        ));

        self.current = Some(Subscription { cancel, handle });
    }

    /// Close the open stream, if any, and mark progress inactive
    pub fn stop(&mut self) {
        if self.close() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.state.send_if_modified(|state| std::mem::replace(&mut state.active, false));
        }
    }

    fn close(&mut self) -> bool {
        match self.current.take() {
            Some(subscription) => {
                subscription.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the open stream to finish on its own
    pub async fn wait(&mut self) {
        if let Some(subscription) = self.current.take() {
            if let Err(e) = subscription.handle.await {
                warn!(error = %e, "Progress task did not finish cleanly");
            }
        }
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        self.close();
    }
}

async fn watch_stream(
    backend: Arc<dyn AnalyzerBackend>,
    document_id: String,
    state: Arc<watch::Sender<ProgressState>>,
    current_generation: Arc<AtomicU64>,
    generation: u64,
    cancel: CancellationToken,
) {
    let update = |apply: &dyn Fn(&mut ProgressState)| {
        update_if_current(&state, &current_generation, generation, apply)
    };
    let deactivate = |s: &mut ProgressState| s.active = false;

    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = backend.progress_stream(&document_id) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(document_id = %document_id, error = %e, "Failed to open progress stream");
            update(&deactivate);
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(document_id = %document_id, "Progress stream closed");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                let complete = event.is_complete();
                let applied = update(&|s: &mut ProgressState| {
                    s.percent = event.percent();
                    s.stage.clone_from(&event.stage);
                    if complete {
                        s.active = false;
                    }
                });
                if !applied {
                    debug!(document_id = %document_id, "Dropping update from a replaced stream");
                    return;
                }
                debug!(
                    document_id = %document_id,
                    progress = event.progress,
                    stage = %event.stage,
                    "Progress update"
                );
                if complete {
                    info!(document_id = %document_id, "Processing complete");
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(document_id = %document_id, error = %e, "Progress stream failed");
                break;
            }
            None => {
                debug!(document_id = %document_id, "Progress stream ended");
                break;
            }
        }
    }

    update(&deactivate);
}

/// Apply `apply` unless `generation` has been superseded. The generation is
/// read under the channel's write lock, so a restart either lands before the
/// check or overwrites the result.
fn update_if_current(
    state: &watch::Sender<ProgressState>,
    current_generation: &AtomicU64,
    generation: u64,
    apply: &dyn Fn(&mut ProgressState),
) -> bool {
    state.send_if_modified(|s| {
        if current_generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        apply(s);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProgressEvent;
    use crate::testing::{FakeBackend, Resource, StreamEnd};
    use std::time::Duration;

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_runs_to_completion() {
        let backend = Arc::new(FakeBackend::new().with_progress(
            vec![
                ProgressEvent::new(50, "parsing"),
                ProgressEvent::new(100, "done"),
            ],
            StreamEnd::Hang,
        ));
        let mut observer = ProgressObserver::new(backend.clone());

        observer.start("d1");
        assert!(observer.is_active());
        observer.wait().await;

        let state = observer.snapshot();
        assert!(!state.active);
        assert_eq!(state.percent, 100);
        assert_eq!(state.stage, "done");
        assert_eq!(state.document_id.as_deref(), Some("d1"));
        assert_eq!(backend.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_stream_error_clears_active() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_progress(vec![ProgressEvent::new(30, "ocr")], StreamEnd::Error),
        );
        let mut observer = ProgressObserver::new(backend);

        observer.start("d1");
        observer.wait().await;

        let state = observer.snapshot();
        assert!(!state.active);
        assert_eq!(state.percent, 30);
    }

    #[tokio::test]
    async fn test_open_failure_clears_active() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail(Resource::Stream);
        let mut observer = ProgressObserver::new(backend);

        observer.start("d1");
        observer.wait().await;

        assert!(!observer.is_active());
    }

    #[tokio::test]
    async fn test_restart_closes_previous_stream() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_progress(vec![ProgressEvent::new(10, "upload")], StreamEnd::Hang),
        );
        let mut observer = ProgressObserver::new(backend.clone());

        observer.start("d1");
        assert!(eventually(|| backend.open_streams() == 1).await);

        observer.start("d2");
        assert!(eventually(|| backend.calls().stream == 2 && backend.open_streams() == 1).await);
        assert_eq!(observer.snapshot().document_id.as_deref(), Some("d2"));

        observer.stop();
        assert!(!observer.is_active());
        assert!(eventually(|| backend.open_streams() == 0).await);
    }

    #[tokio::test]
    async fn test_drop_closes_stream() {
        let backend =
            Arc::new(FakeBackend::new().with_progress(Vec::new(), StreamEnd::Hang));
        let mut observer = ProgressObserver::new(backend.clone());

        observer.start("d1");
        assert!(eventually(|| backend.open_streams() == 1).await);

        drop(observer);
        assert!(eventually(|| backend.open_streams() == 0).await);
    }

    #[tokio::test]
    async fn test_superseded_stream_leaves_state_alone() {
        let backend: Arc<dyn AnalyzerBackend> = Arc::new(FakeBackend::new().with_progress(
            vec![ProgressEvent::new(60, "old"), ProgressEvent::new(100, "done")],
            StreamEnd::Close,
        ));
        let newer = ProgressState {
            document_id: Some("d2".to_string()),
            percent: 5,
            stage: "upload".to_string(),
            active: true,
        };
        let state = Arc::new(watch::channel(newer.clone()).0);

        // the observer has moved on to generation 2
        watch_stream(
            backend,
            "d1".to_string(),
            state.clone(),
            Arc::new(AtomicU64::new(2)),
            1,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(*state.borrow(), newer);
    }

    #[test]
    fn test_update_if_current_checks_generation() {
        let (tx, _rx) = watch::channel(ProgressState::default());
        let generation = AtomicU64::new(3);
        let halfway = |s: &mut ProgressState| s.percent = 40;

        assert!(!update_if_current(&tx, &generation, 2, &halfway));
        assert_eq!(tx.borrow().percent, 0);

        assert!(update_if_current(&tx, &generation, 3, &halfway));
        assert_eq!(tx.borrow().percent, 40);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_progress(vec![ProgressEvent::new(100, "done")], StreamEnd::Close),
        );
        let mut observer = ProgressObserver::new(backend);
        let mut rx = observer.subscribe();

        observer.start("d1");
        observer.wait().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().percent, 100);
    }
}
