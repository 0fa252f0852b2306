//! Background poll scheduler.
//!
//! Runs a poll cycle every `poll_interval_secs` and whenever the
//! application asks for one (window focus, after a local send). Manual
//! refresh runs inline, so timer-driven polling only resumes once the
//! reload has finished.
//!
//! Cycles are spawned rather than awaited, so a trigger that arrives while a
//! cycle is in flight hits the synchronizer's re-entrancy guard and becomes a
//! no-op.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::render::Renderer;
use crate::store::MessageStore;
use crate::synchronizer::{ClientError, Synchronizer};

enum Trigger {
    Poll,
    Refresh(oneshot::Sender<Result<usize, ClientError>>),
    Shutdown,
}

/// Spawns the poll loop.
pub struct Poller;

impl Poller {
    /// Start polling in the background.
    ///
    /// The first timer-driven cycle runs one interval after the call; load
    /// the feed with [`Synchronizer::load_initial`] beforehand.
    pub fn spawn<S, R>(sync: Arc<Synchronizer<S, R>>) -> PollerHandle
    where
        S: MessageStore + 'static,
        R: Renderer + 'static,
    {
        let period = sync.config().poll_interval();
        let send_delay = sync.config().send_poll_delay();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(run(sync, rx, period));

        PollerHandle {
            tx,
            task,
            send_delay,
        }
    }
}

async fn run<S, R>(sync: Arc<Synchronizer<S, R>>, mut rx: mpsc::Receiver<Trigger>, period: Duration)
where
    S: MessageStore + 'static,
    R: Renderer + 'static,
{
    tracing::info!("Poller started (interval: {}s)", period.as_secs());

    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => spawn_cycle(&sync),
            trigger = rx.recv() => match trigger {
                Some(Trigger::Poll) => spawn_cycle(&sync),
                Some(Trigger::Refresh(reply)) => {
                    let result = sync.refresh().await;
                    timer.reset();
                    let _ = reply.send(result);
                }
                Some(Trigger::Shutdown) | None => break,
            },
        }
    }

    tracing::info!("Poller stopped");
}

fn spawn_cycle<S, R>(sync: &Arc<Synchronizer<S, R>>)
where
    S: MessageStore + 'static,
    R: Renderer + 'static,
{
    let sync = Arc::clone(sync);
    tokio::spawn(async move {
        sync.poll_for_new_messages().await;
    });
}

/// Handle to a running poller.
pub struct PollerHandle {
    tx: mpsc::Sender<Trigger>,
    task: JoinHandle<()>,
    send_delay: Duration,
}

impl PollerHandle {
    /// Ask for an immediate cycle (window focus, manual "poll now").
    pub async fn poll_now(&self) -> Result<(), ClientError> {
        self.tx
            .send(Trigger::Poll)
            .await
            .map_err(|_| ClientError::SchedulerStopped)
    }

    /// Ask for a cycle after `delay`.
    pub fn poll_after(&self, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Trigger::Poll).await;
        });
    }

    /// Schedule the cycle that follows a local send.
    pub fn notify_sent(&self) {
        self.poll_after(self.send_delay);
    }

    /// Reset and reload the feed, then resume the timer.
    pub async fn refresh(&self) -> Result<usize, ClientError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Trigger::Refresh(reply))
            .await
            .map_err(|_| ClientError::SchedulerStopped)?;
        response.await.map_err(|_| ClientError::SchedulerStopped)?
    }

    /// Whether the poll loop is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the timer and wait for the loop to exit.
    ///
    /// A cycle already in flight is not cancelled.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Trigger::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!("Poller task failed: {}", e);
        }
    }
}
