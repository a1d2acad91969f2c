/// Single-flight worker that turns hotplug signals into refresh passes.
///
/// Idle -> Refreshing on a signal, back to Idle when the pass completes.
/// Any number of signals raised while Refreshing leave one stored permit,
/// so they collapse into exactly one follow-up pass. A stop request moves
/// to Draining, lets an in-flight pass finish, and exits.
use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Notify, oneshot, watch},
    task::JoinHandle,
    time::timeout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Refreshing,
    Draining,
}

/// Level-triggered "refresh wanted" flag. Raising never blocks.
#[derive(Clone, Default)]
pub struct RefreshSignal(Arc<Notify>);

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.notify_one();
    }

    pub(crate) async fn wait(&self) {
        self.0.notified().await
    }
}

pub type RefreshJob = Arc<dyn Fn() + Send + Sync>;

pub struct RefreshCoordinator {
    signal: RefreshSignal,
    state: watch::Receiver<CoordinatorState>,
    shutdown_tx: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl RefreshCoordinator {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(signal: RefreshSignal, job: RefreshJob) -> Self {
        let (state_tx, state) = watch::channel(CoordinatorState::Idle);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(run_worker(signal.clone(), job, state_tx, shutdown_rx));

        Self {
            signal,
            state,
            shutdown_tx,
            worker,
        }
    }

    pub fn signal(&self) -> RefreshSignal {
        self.signal.clone()
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state.clone()
    }

    /// Request Draining and wait up to `limit` for the worker to exit.
    ///
    /// Returns false if the worker was still busy when the limit expired.
    pub async fn stop(self, limit: Duration) -> bool {
        let _ = self.shutdown_tx.send(());
        match timeout(limit, self.worker).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Refresh coordinator task failed: {}", e);
                true
            }
            Err(_) => {
                warn!("Refresh coordinator didn't stop in time");
                false
            }
        }
    }
}

async fn run_worker(
    signal: RefreshSignal,
    job: RefreshJob,
    state: watch::Sender<CoordinatorState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("Refresh coordinator started");

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = signal.wait() => {}
        }

        state.send_replace(CoordinatorState::Refreshing);
        let pass = job.clone();
        let mut in_flight = tokio::task::spawn_blocking(move || pass());

        tokio::select! {
            result = &mut in_flight => {
                if let Err(e) = result {
                    error!("Display refresh failed: {}", e);
                }
                state.send_replace(CoordinatorState::Idle);
            }
            _ = &mut shutdown_rx => {
                state.send_replace(CoordinatorState::Draining);
                info!("Stop requested, finishing in-flight display refresh");
                if let Err(e) = in_flight.await {
                    error!("Display refresh failed: {}", e);
                }
                return;
            }
        }
    }

    state.send_replace(CoordinatorState::Draining);
    debug!("Refresh coordinator stopped");
}
