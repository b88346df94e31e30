use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::fs::FileSystem;
use crate::watcher::{observe, Observation, WatchSnapshot};

/// Lower bound for the tick interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Background half of the watcher: ticks on a fixed interval and performs
/// the filesystem reads on the blocking pool.
///
/// The owner publishes the current [`WatchSnapshot`] (or `None` while idle)
/// and drains the resulting observations on its own thread.
pub struct Poller {
    snapshot_tx: watch::Sender<Option<WatchSnapshot>>,
    observations: mpsc::UnboundedReceiver<Observation>,
    task: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(handle: &Handle, fs: Arc<dyn FileSystem>, interval: Duration) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (obs_tx, observations) = mpsc::unbounded_channel();
        let task = handle.spawn(poll_loop(fs, interval, snapshot_rx, obs_tx));
        log::debug!("Started file poller ({} ms)", interval.as_millis());
        Self {
            snapshot_tx,
            observations,
            task,
        }
    }

    /// Point the poller at a new session, or pause it with `None`.
    pub fn publish(&self, snapshot: Option<WatchSnapshot>) {
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Take one pending observation without blocking.
    pub fn try_next(&mut self) -> Option<Observation> {
        self.observations.try_recv().ok()
    }

    /// Wait for the next observation.
    pub async fn next(&mut self) -> Option<Observation> {
        self.observations.recv().await
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    fs: Arc<dyn FileSystem>,
    interval: Duration,
    snapshot_rx: watch::Receiver<Option<WatchSnapshot>>,
    obs_tx: mpsc::UnboundedSender<Observation>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if snapshot_rx.has_changed().is_err() || obs_tx.is_closed() {
            break;
        }
        let Some(snapshot) = snapshot_rx.borrow().clone() else {
            continue;
        };

        let fs = Arc::clone(&fs);
        let observation =
            match tokio::task::spawn_blocking(move || observe(&snapshot, fs.as_ref())).await {
                Ok(observation) => observation,
                Err(e) => {
                    log::warn!("File poll task failed: {}", e);
                    continue;
                }
            };

        if obs_tx.send(observation).is_err() {
            break;
        }
    }
    log::debug!("File poller stopped");
}
