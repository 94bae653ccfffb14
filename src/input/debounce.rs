//! Software debouncer for a mechanical contact
//!
//! The first raw transition of a burst arms a confirmation timer on the
//! tokio scheduler. Further transitions inside the window only update the
//! latest observed level. When the timer fires the latest level is compared
//! with the last accepted one, and a change is reported at most once per
//! window.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::trace;

type LevelSink = dyn Fn(bool) + Send + Sync;

#[derive(Debug)]
struct Levels {
    accepted: bool,
    latest: bool,
    pending: bool,
}

struct Inner {
    window: Duration,
    levels: Mutex<Levels>,
    on_change: Box<LevelSink>,
    runtime: Handle,
}

/// Filters raw edges on one line into clean level changes
#[derive(Clone)]
pub struct DebouncedEdgeSource {
    inner: Arc<Inner>,
}

impl DebouncedEdgeSource {
    /// Create a debouncer for a line currently at `initial`.
    ///
    /// Must be called from within a tokio runtime; the confirmation timers
    /// are spawned on it even when raw transitions arrive from a foreign
    /// interrupt thread.
    pub fn new<F>(initial: bool, window: Duration, on_change: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        Self::with_runtime(Handle::current(), initial, window, on_change)
    }

    pub fn with_runtime<F>(runtime: Handle, initial: bool, window: Duration, on_change: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                window,
                levels: Mutex::new(Levels {
                    accepted: initial,
                    latest: initial,
                    pending: false,
                }),
                on_change: Box::new(on_change),
                runtime,
            }),
        }
    }

    /// Called by the line driver on every electrical transition
    pub fn on_raw_transition(&self, level: bool) {
        {
            let mut levels = lock(&self.inner.levels);
            levels.latest = level;
            if levels.pending {
                trace!(level, "coalesced into pending window");
                return;
            }
            levels.pending = true;
        }

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(inner.window).await;
            inner.confirm();
        });
    }

    /// Last level that survived the bounce window
    pub fn accepted_level(&self) -> bool {
        lock(&self.inner.levels).accepted
    }
}

impl Inner {
    /// Accept the settled level and report it.
    ///
    /// The sink runs under the lock so reports leave in the order levels
    /// were accepted, even when two confirmations race on worker threads.
    /// It must not call back into this source.
    fn confirm(&self) {
        let mut levels = lock(&self.levels);
        levels.pending = false;
        if levels.latest == levels.accepted {
            return;
        }
        levels.accepted = levels.latest;
        trace!(level = levels.accepted, "level accepted");
        (self.on_change)(levels.accepted);
    }
}

fn lock(levels: &Mutex<Levels>) -> std::sync::MutexGuard<'_, Levels> {
    // A panicking sink cannot leave the levels half-written
    levels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const WINDOW: Duration = Duration::from_millis(10);

    fn source(initial: bool) -> (DebouncedEdgeSource, mpsc::UnboundedReceiver<bool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = DebouncedEdgeSource::new(initial, WINDOW, move |level| {
            let _ = tx.send(level);
        });
        (source, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<bool>) -> Vec<bool> {
        let mut out = Vec::new();
        while let Ok(level) = rx.try_recv() {
            out.push(level);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_last_level_once() {
        let (source, mut rx) = source(false);

        source.on_raw_transition(true);
        source.on_raw_transition(false);
        source.on_raw_transition(true);
        source.on_raw_transition(false);
        source.on_raw_transition(true);

        tokio::time::sleep(WINDOW * 3).await;
        assert_eq!(drain(&mut rx), vec![true]);
        assert!(source.accepted_level());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_settling_on_original_level_emits_nothing() {
        let (source, mut rx) = source(true);

        source.on_raw_transition(false);
        source.on_raw_transition(true);
        source.on_raw_transition(false);
        source.on_raw_transition(true);

        tokio::time::sleep(WINDOW * 3).await;
        assert!(drain(&mut rx).is_empty());
        assert!(source.accepted_level());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_emitted_before_window_elapses() {
        let (source, mut rx) = source(false);

        source.on_raw_transition(true);
        tokio::time::sleep(WINDOW / 2).await;
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(WINDOW).await;
        assert_eq!(drain(&mut rx), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_emit_separate_changes() {
        let (source, mut rx) = source(false);

        source.on_raw_transition(true);
        tokio::time::sleep(WINDOW * 2).await;
        source.on_raw_transition(false);
        source.on_raw_transition(true);
        source.on_raw_transition(false);
        tokio::time::sleep(WINDOW * 2).await;

        assert_eq!(drain(&mut rx), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_level_is_not_a_change() {
        let (source, mut rx) = source(false);

        source.on_raw_transition(false);
        tokio::time::sleep(WINDOW * 2).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_transitions_from_foreign_thread() {
        let (source, mut rx) = source(false);

        let remote = source.clone();
        std::thread::spawn(move || {
            for n in 0..7 {
                remote.on_raw_transition(n % 2 == 0);
            }
        })
        .join()
        .unwrap();

        let level = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no level change")
            .unwrap();
        assert!(level);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_sink_keeps_reports_in_accepted_order() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let source = DebouncedEdgeSource::new(false, Duration::from_millis(1), move |level| {
            std::thread::sleep(Duration::from_millis(3));
            sink.lock().unwrap().push(level);
        });

        let remote = source.clone();
        std::thread::spawn(move || {
            for n in 0..40 {
                remote.on_raw_transition(n % 2 == 0);
                std::thread::sleep(Duration::from_millis(2));
            }
        })
        .join()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let reported = reported.lock().unwrap().clone();
        assert!(!reported.is_empty());
        // Every report is a change from the one before it
        assert!(reported.windows(2).all(|pair| pair[0] != pair[1]));
        assert_eq!(reported.first(), Some(&true));
        assert_eq!(reported.last(), Some(&source.accepted_level()));
    }
}
