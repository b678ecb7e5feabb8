//! Serialized preview rendering queue
//!
//! UI components request one preview per source file; renders are expensive,
//! so requests are queued and fed one at a time to a single lazily created
//! renderer. The queue owns all of its mutable state (pending requests, the
//! busy flag, the renderer, a cancellation epoch) behind one mutex and is
//! the sole serializer; callers may enqueue from anywhere.
//!
//! A failed or panicking render resolves the request with the renderer's
//! placeholder rather than an error, so one bad file never blocks the rest
//! of a batch. `cancel_all` is the only path that fails a request.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::PdfSuiteError;

/// Renders document bytes to a preview, one response per request.
pub trait PageRenderer: Send + 'static {
    type Preview: Send + 'static;

    fn render(&mut self, bytes: &[u8]) -> Result<Self::Preview, String>;

    /// Stand-in preview used when a render fails.
    fn placeholder(&self) -> Self::Preview;
}

struct PendingPreview<P> {
    name: String,
    bytes: Vec<u8>,
    tx: oneshot::Sender<Result<P, PdfSuiteError>>,
}

struct QueueState<R: PageRenderer> {
    queue: VecDeque<PendingPreview<R::Preview>>,
    busy: bool,
    renderer: Option<R>,
    /// Sender for the request currently being rendered. `cancel_all` takes
    /// it to fail the request without waiting for the render to finish.
    in_flight: Option<oneshot::Sender<Result<R::Preview, PdfSuiteError>>>,
    /// Bumped by `cancel_all`; a render finishing under a stale epoch
    /// discards its result instead of touching the queue.
    epoch: u64,
}

pub struct PreviewQueue<R: PageRenderer> {
    state: Arc<Mutex<QueueState<R>>>,
    factory: Arc<dyn Fn() -> R + Send + Sync>,
}

impl<R: PageRenderer> Clone for PreviewQueue<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<R: PageRenderer> PreviewQueue<R> {
    /// The renderer is not built until the first request needs it.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                queue: VecDeque::new(),
                busy: false,
                renderer: None,
                in_flight: None,
                epoch: 0,
            })),
            factory: Arc::new(factory),
        }
    }

    /// Queue a preview request. Resolves with the rendered preview, the
    /// placeholder if rendering fails, or `Err(Cancelled)` if `cancel_all`
    /// runs before the request completes.
    pub async fn enqueue(
        &self,
        name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<R::Preview, PdfSuiteError> {
        let (tx, rx) = oneshot::channel();
        self.lock().queue.push_back(PendingPreview {
            name: name.into(),
            bytes,
            tx,
        });
        self.drain();

        match rx.await {
            Ok(result) => result,
            // Sender dropped without resolving; treat as teardown.
            Err(_) => Err(PdfSuiteError::Cancelled),
        }
    }

    /// Fail every queued request (and the in-flight one, if any) with a
    /// cancellation error, discard the renderer and reset the queue.
    /// Used on component teardown so no stale preview resolves into a
    /// disposed UI.
    pub fn cancel_all(&self) {
        let (in_flight, pending) = {
            let mut state = self.lock();
            state.epoch += 1;
            state.renderer = None;
            // `busy` stays set while a condemned render runs out, so a new
            // enqueue cannot start a second render beside it.
            let pending: Vec<PendingPreview<R::Preview>> = state.queue.drain(..).collect();
            (state.in_flight.take(), pending)
        };
        let cancelled = pending.len() + usize::from(in_flight.is_some());
        debug!(cancelled, "preview queue cancelled");
        if let Some(tx) = in_flight {
            let _ = tx.send(Err(PdfSuiteError::Cancelled));
        }
        for request in pending {
            let _ = request.tx.send(Err(PdfSuiteError::Cancelled));
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Kick the queue: take the head request if no render is in flight and
    /// process requests one at a time until the queue is empty. Draining
    /// continues after each completion, not only on new enqueues.
    fn drain(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                let (name, bytes, renderer, epoch) = {
                    let mut state = queue.lock();
                    if state.busy {
                        return;
                    }
                    let Some(request) = state.queue.pop_front() else {
                        return;
                    };
                    state.busy = true;
                    state.in_flight = Some(request.tx);
                    (request.name, request.bytes, state.renderer.take(), state.epoch)
                };
                // The factory runs outside the lock so a slow constructor
                // never stalls enqueue or cancel_all.
                let renderer = renderer.unwrap_or_else(|| (queue.factory)());

                let joined = tokio::task::spawn_blocking(move || {
                    let mut renderer = renderer;
                    let result = renderer.render(&bytes);
                    (renderer, result)
                })
                .await;

                let (renderer, preview) = match joined {
                    Ok((renderer, Ok(preview))) => (renderer, preview),
                    Ok((renderer, Err(message))) => {
                        warn!(file = %name, error = %message, "preview render failed, using placeholder");
                        let placeholder = renderer.placeholder();
                        (renderer, placeholder)
                    }
                    Err(_) => {
                        // Renderer panicked and is gone; rebuild it.
                        warn!(file = %name, "preview renderer crashed, using placeholder");
                        let renderer = (queue.factory)();
                        let placeholder = renderer.placeholder();
                        (renderer, placeholder)
                    }
                };

                let resolved = {
                    let mut state = queue.lock();
                    state.busy = false;
                    if state.epoch == epoch {
                        state.renderer = Some(renderer);
                        state.in_flight.take()
                    } else {
                        // cancel_all already failed this request; the stale
                        // result and renderer are discarded. Keep draining:
                        // requests may have arrived while busy was held.
                        None
                    }
                };
                if let Some(tx) = resolved {
                    let _ = tx.send(Ok(preview));
                }
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<R>> {
        self.state.lock().expect("preview queue state poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    struct FakeRenderer {
        log: Arc<Mutex<Vec<String>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl PageRenderer for FakeRenderer {
        type Preview = String;

        fn render(&mut self, bytes: &[u8]) -> Result<String, String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let name = String::from_utf8_lossy(bytes).to_string();
            self.log.lock().unwrap().push(name.clone());
            if name.contains("fail") {
                Err(format!("cannot render {}", name))
            } else {
                Ok(format!("preview:{}", name))
            }
        }

        fn placeholder(&self) -> String {
            "placeholder".to_string()
        }
    }

    struct Harness {
        queue: PreviewQueue<FakeRenderer>,
        log: Arc<Mutex<Vec<String>>>,
        max_in_flight: Arc<AtomicUsize>,
        factory_calls: Arc<AtomicUsize>,
    }

    fn harness() -> Harness {
        let log = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let factory_calls = Arc::new(AtomicUsize::new(0));

        let queue = {
            let log = Arc::clone(&log);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let factory_calls = Arc::clone(&factory_calls);
            PreviewQueue::new(move || {
                factory_calls.fetch_add(1, Ordering::SeqCst);
                FakeRenderer {
                    log: Arc::clone(&log),
                    in_flight: Arc::clone(&in_flight),
                    max_in_flight: Arc::clone(&max_in_flight),
                }
            })
        };
        Harness {
            queue,
            log,
            max_in_flight,
            factory_calls,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_requests_resolve_in_fifo_order() {
        let h = harness();
        let (a, b, c) = tokio::join!(
            h.queue.enqueue("a", b"a".to_vec()),
            h.queue.enqueue("b", b"b".to_vec()),
            h.queue.enqueue("c", b"c".to_vec()),
        );
        assert_eq!(a.unwrap(), "preview:a");
        assert_eq!(b.unwrap(), "preview:b");
        assert_eq!(c.unwrap(), "preview:c");
        assert_eq!(*h.log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_more_than_one_render_in_flight() {
        let h = harness();
        let mut handles = Vec::new();
        for i in 0..8 {
            let queue = h.queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(format!("f{}", i), format!("f{}", i).into_bytes()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(h.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_render_resolves_with_placeholder() {
        let h = harness();
        let (bad, good) = tokio::join!(
            h.queue.enqueue("fail.pdf", b"fail.pdf".to_vec()),
            h.queue.enqueue("ok.pdf", b"ok.pdf".to_vec()),
        );
        // Failure is absorbed, not propagated, and the batch keeps moving.
        assert_eq!(bad.unwrap(), "placeholder");
        assert_eq!(good.unwrap(), "preview:ok.pdf");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_renderer_created_lazily_and_reused() {
        let h = harness();
        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 0);
        h.queue.enqueue("a", b"a".to_vec()).await.unwrap();
        h.queue.enqueue("b", b"b".to_vec()).await.unwrap();
        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_all_rejects_queued_requests() {
        let h = harness();
        // Nothing is draining yet from the queue's perspective: push
        // directly, then cancel before any worker runs.
        let (tx, rx) = oneshot::channel();
        h.queue.lock().queue.push_back(PendingPreview {
            name: "waiting".into(),
            bytes: Vec::new(),
            tx,
        });
        h.queue.cancel_all();

        let result = rx.await.unwrap();
        assert!(matches!(result, Err(PdfSuiteError::Cancelled)));
        assert_eq!(h.queue.pending(), 0);
    }

    struct BlockingRenderer {
        started: mpsc::Sender<()>,
        release: Arc<Mutex<mpsc::Receiver<()>>>,
    }

    impl PageRenderer for BlockingRenderer {
        type Preview = &'static str;

        fn render(&mut self, _bytes: &[u8]) -> Result<&'static str, String> {
            self.started.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok("rendered")
        }

        fn placeholder(&self) -> &'static str {
            "placeholder"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_all_rejects_the_in_flight_request() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let release_rx = Arc::new(Mutex::new(release_rx));

        let queue = {
            let release_rx = Arc::clone(&release_rx);
            PreviewQueue::new(move || BlockingRenderer {
                started: started_tx.clone(),
                release: Arc::clone(&release_rx),
            })
        };

        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue("slow", b"slow".to_vec()).await })
        };

        // Wait until the render is actually in flight, then cancel.
        tokio::task::spawn_blocking(move || started_rx.recv().unwrap())
            .await
            .unwrap();
        queue.cancel_all();

        // The request must already be resolved; the render is still blocked.
        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("in-flight request not resolved by cancel_all")
            .unwrap();
        assert!(matches!(result, Err(PdfSuiteError::Cancelled)));
        release_tx.send(()).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_new_render_waits_for_the_cancelled_one_to_finish() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let release_rx = Arc::new(Mutex::new(release_rx));

        let queue = {
            let release_rx = Arc::clone(&release_rx);
            PreviewQueue::new(move || BlockingRenderer {
                started: started_tx.clone(),
                release: Arc::clone(&release_rx),
            })
        };

        let condemned = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue("slow", b"slow".to_vec()).await })
        };
        let started_rx = tokio::task::spawn_blocking(move || {
            started_rx.recv().unwrap();
            started_rx
        })
        .await
        .unwrap();

        queue.cancel_all();
        assert!(condemned.await.unwrap().unwrap_err().is_cancelled());

        let next = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue("next", b"next".to_vec()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The cancelled render is still running; nothing new may start.
        assert!(matches!(started_rx.try_recv(), Err(mpsc::TryRecvError::Empty)));

        release_tx.send(()).unwrap();
        tokio::task::spawn_blocking(move || started_rx.recv().unwrap())
            .await
            .unwrap();
        release_tx.send(()).unwrap();
        assert_eq!(next.await.unwrap().unwrap(), "rendered");
    }

    struct SlowlyBuiltRenderer;

    impl PageRenderer for SlowlyBuiltRenderer {
        type Preview = &'static str;

        fn render(&mut self, _bytes: &[u8]) -> Result<&'static str, String> {
            Ok("rendered")
        }

        fn placeholder(&self) -> &'static str {
            "placeholder"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_renderer_construction_does_not_hold_the_lock() {
        let queue = PreviewQueue::new(|| {
            std::thread::sleep(Duration::from_millis(200));
            SlowlyBuiltRenderer
        });
        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue("a", b"a".to_vec()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let before = std::time::Instant::now();
        let _ = queue.pending();
        assert!(before.elapsed() < Duration::from_millis(100));
        assert_eq!(pending.await.unwrap().unwrap(), "rendered");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_usable_again_after_cancel_all() {
        let h = harness();
        h.queue.enqueue("a", b"a".to_vec()).await.unwrap();
        h.queue.cancel_all();

        let preview = h.queue.enqueue("b", b"b".to_vec()).await.unwrap();
        assert_eq!(preview, "preview:b");
        // The old renderer was discarded with the cancelled batch.
        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 2);
    }
}
