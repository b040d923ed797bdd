// Poll scheduler. Runs Poll() on a fixed interval, executes debounced on-demand
// refreshes and rebuild requests from the event listener, and restarts the listener
// when it has exited. Everything runs inline in one task, so polls never overlap.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval_at, sleep_until};
use tracing::Instrument;

use crate::coordinator::Coordinator;
use crate::events::RebuildRequest;

/// Capacity of the on-demand refresh channel; a full channel already holds a request.
pub const REFRESH_CHANNEL_CAPACITY: usize = 1;

/// Cheap handle for requesting an on-demand poll.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Returns false only when the scheduler has shut down.
    pub fn request_refresh(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

pub fn refresh_channel() -> (RefreshHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(REFRESH_CHANNEL_CAPACITY);
    (RefreshHandle { tx }, rx)
}

/// Cooldown debounce with an immediate leading call: a request outside the cooldown
/// runs now; requests inside it collapse into one run when the cooldown ends.
#[derive(Debug)]
pub struct Debouncer {
    cooldown: Duration,
    cooldown_until: Option<Instant>,
    pending: bool,
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            cooldown_until: None,
            pending: false,
        }
    }

    /// Register a request; true when the caller should run it right away.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.cooldown_until.is_none_or(|until| now >= until) {
            self.cooldown_until = Some(now + self.cooldown);
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// When a collapsed request is waiting, the instant it becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        if self.pending { self.cooldown_until } else { None }
    }

    /// Mark the collapsed request as executed; starts a new cooldown.
    pub fn fire(&mut self, now: Instant) {
        self.pending = false;
        self.cooldown_until = Some(now + self.cooldown);
    }
}

/// Coordinator, channels, and shutdown for the worker.
pub struct WorkerDeps {
    pub coordinator: Arc<Coordinator>,
    pub refresh_rx: mpsc::Receiver<()>,
    pub rebuild_rx: mpsc::Receiver<RebuildRequest>,
    pub listener: Option<JoinHandle<()>>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Worker timing config.
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
    pub refresh_cooldown_ms: u64,
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> JoinHandle<()> {
    let worker_span = tracing::span!(
        tracing::Level::DEBUG,
        "worker",
        poll_interval_secs = config.poll_interval_secs
    );
    tokio::spawn(run(deps, config).instrument(worker_span))
}

async fn run(deps: WorkerDeps, config: WorkerConfig) {
    let WorkerDeps {
        coordinator,
        mut refresh_rx,
        mut rebuild_rx,
        mut listener,
        mut shutdown_rx,
    } = deps;

    let period = Duration::from_secs(config.poll_interval_secs);
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut debouncer = Debouncer::new(Duration::from_millis(config.refresh_cooldown_ms));

    loop {
        let debounce_deadline = debouncer.deadline();
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("Worker shutting down");
                break;
            }
            _ = tick.tick() => {
                run_poll(&coordinator, "scheduled").await;
                supervise_listener(&coordinator, &mut listener).await;
            }
            Some(()) = refresh_rx.recv() => {
                if debouncer.request(Instant::now()) {
                    run_poll(&coordinator, "on_demand").await;
                }
            }
            Some(RebuildRequest) = rebuild_rx.recv() => {
                if let Err(e) = coordinator.rebuild().await {
                    tracing::warn!(error = %e, operation = "rebuild", "Event-triggered rebuild failed");
                }
                if debouncer.request(Instant::now()) {
                    run_poll(&coordinator, "event").await;
                }
            }
            _ = sleep_until(debounce_deadline.unwrap_or_else(Instant::now)), if debounce_deadline.is_some() => {
                debouncer.fire(Instant::now());
                run_poll(&coordinator, "debounced").await;
            }
        }
    }

    if let Some(handle) = listener.take() {
        handle.abort();
    }
}

async fn run_poll(coordinator: &Coordinator, trigger: &'static str) {
    match coordinator.poll().await {
        Ok(dataset) => {
            tracing::debug!(trigger, containers = dataset.len(), "Poll completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, trigger, operation = "poll", "Poll failed");
        }
    }
}

/// The listener does not retry on its own; restart it on the current client once it exits.
async fn supervise_listener(coordinator: &Coordinator, listener: &mut Option<JoinHandle<()>>) {
    if listener.as_ref().is_some_and(|h| !h.is_finished()) {
        return;
    }
    match coordinator.start_listener().await {
        Ok(handle) => {
            tracing::info!("Event listener restarted");
            *listener = Some(handle);
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "start_listener", "Event listener restart failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_runs_immediately() {
        let mut d = Debouncer::new(Duration::from_secs(5));
        assert!(d.request(Instant::now()));
        assert!(d.deadline().is_none());
    }

    #[test]
    fn requests_within_cooldown_collapse_into_one() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_secs(5));
        assert!(d.request(start));
        assert!(!d.request(start + Duration::from_secs(1)));
        assert!(!d.request(start + Duration::from_secs(2)));
        assert_eq!(d.deadline(), Some(start + Duration::from_secs(5)));

        d.fire(start + Duration::from_secs(5));
        assert!(d.deadline().is_none());
    }

    #[test]
    fn firing_starts_a_new_cooldown() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_secs(5));
        d.request(start);
        d.request(start + Duration::from_secs(1));
        d.fire(start + Duration::from_secs(5));
        assert!(!d.request(start + Duration::from_secs(6)));
        assert_eq!(d.deadline(), Some(start + Duration::from_secs(10)));
    }

    #[test]
    fn request_after_cooldown_runs_immediately() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_secs(5));
        d.request(start);
        assert!(d.request(start + Duration::from_secs(5)));
        assert!(d.deadline().is_none());
    }

    #[tokio::test]
    async fn refresh_handle_reports_shutdown() {
        let (handle, rx) = refresh_channel();
        assert!(handle.request_refresh());
        assert!(handle.request_refresh());
        drop(rx);
        assert!(!handle.request_refresh());
    }
}
