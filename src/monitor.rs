//! Inactivity monitor: polls the idle probe and powers the host off once.
//!
//! State flow: `Uninitialized → Armed → Fired`. `Fired` is terminal; the
//! loop returns as soon as it is entered, and [`InactivityMonitor::run`]
//! consumes the monitor, so a second shutdown cannot be issued from it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::idle::{self, IdleProbe};
use crate::logging::{Journal, JournalEvent, ShutdownSource};
use crate::power::{self, ShutdownAction};
use crate::threshold::ThresholdStore;

/// Lifecycle of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// No idle limit configured yet; never shuts down.
    Uninitialized,
    /// Comparing each idle sample against the current limit.
    Armed,
    /// Shutdown was attempted. Terminal.
    Fired,
}

/// Why [`InactivityMonitor::run`] returned.
#[derive(Debug)]
pub enum MonitorExit {
    /// The idle limit was reached and the shutdown action succeeded.
    ShutdownTriggered,
    /// The idle limit was reached but the shutdown action failed. Not retried.
    ShutdownFailed(Error),
    /// The cancellation token fired before the limit was reached.
    Cancelled,
}

/// Loop-internal phase. `Fired` has no phase: reaching it ends the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Armed,
}

impl From<Phase> for MonitorState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Uninitialized => MonitorState::Uninitialized,
            Phase::Armed => MonitorState::Armed,
        }
    }
}

enum Step {
    Continue(Phase),
    Finished(MonitorExit),
}

pub struct InactivityMonitor {
    store: Arc<ThresholdStore>,
    probe: Arc<dyn IdleProbe>,
    action: Arc<dyn ShutdownAction>,
    poll_interval: Duration,
    journal: Journal,
    state_tx: watch::Sender<MonitorState>,
    /// Consecutive inconclusive samples, to keep a dead probe from flooding the log.
    probe_failures: u32,
}

impl InactivityMonitor {
    pub fn new(
        store: Arc<ThresholdStore>,
        probe: Arc<dyn IdleProbe>,
        action: Arc<dyn ShutdownAction>,
        poll_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(MonitorState::Uninitialized);
        Self {
            store,
            probe,
            action,
            poll_interval,
            journal: Journal::disabled(),
            state_tx,
            probe_failures: 0,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Observe state transitions. The receiver stays valid after the loop exits.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state_tx.subscribe()
    }

    /// Run until the monitor fires or `cancel` is triggered.
    ///
    /// Cancellation is only observed between polling cycles.
    pub async fn run(mut self, cancel: CancellationToken) -> MonitorExit {
        info!(
            "Starting inactivity monitor with poll interval {:?}",
            self.poll_interval
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut phase = Phase::Uninitialized;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(phase = ?phase, "Inactivity monitor cancelled");
                    return MonitorExit::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            match self.poll_once(phase).await {
                Step::Continue(next) => {
                    if next != phase {
                        self.state_tx.send_replace(next.into());
                        phase = next;
                    }
                }
                Step::Finished(exit) => {
                    self.state_tx.send_replace(MonitorState::Fired);
                    debug!("Inactivity monitor exiting");
                    return exit;
                }
            }
        }
    }

    async fn poll_once(&mut self, phase: Phase) -> Step {
        match phase {
            Phase::Uninitialized => match self.store.get() {
                Some(limit) => {
                    info!("Idle limit set to {}, monitor armed", limit);
                    self.journal.record(JournalEvent::MonitorArmed {
                        limit_seconds: limit.seconds(),
                    });
                    // Compare on the same cycle the limit was seen.
                    match self.check_idle().await {
                        Step::Continue(_) => Step::Continue(Phase::Armed),
                        finished => finished,
                    }
                }
                None => Step::Continue(Phase::Uninitialized),
            },
            Phase::Armed => self.check_idle().await,
        }
    }

    /// Sample idle time and fire if the current limit has been reached.
    async fn check_idle(&mut self) -> Step {
        let idle = match idle::sample_blocking(&self.probe).await {
            Ok(idle) => {
                if self.probe_failures > 0 {
                    info!(
                        "Idle probe recovered after {} failed samples",
                        self.probe_failures
                    );
                    self.probe_failures = 0;
                }
                idle
            }
            Err(e) => {
                self.probe_failures += 1;
                if self.probe_failures == 1 {
                    warn!("Idle sample inconclusive: {}", e);
                } else {
                    debug!("Idle sample inconclusive ({} in a row): {}", self.probe_failures, e);
                }
                return Step::Continue(Phase::Armed);
            }
        };

        // Re-read every cycle so limit changes apply without a restart.
        let Some(limit) = self.store.get() else {
            return Step::Continue(Phase::Armed);
        };

        if !limit.is_reached_by(idle) {
            debug!("Idle for {:.1}s of {}", idle.as_secs_f64(), limit);
            return Step::Continue(Phase::Armed);
        }

        info!(
            "Idle for {:.1}s, limit {} reached, shutting down",
            idle.as_secs_f64(),
            limit
        );

        let result = power::trigger_blocking(&self.action).await;
        self.journal.record(JournalEvent::ShutdownRequested {
            source: ShutdownSource::Monitor,
            idle_seconds: Some(idle.as_secs_f64()),
            limit_seconds: Some(limit.seconds()),
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        });

        match result {
            Ok(()) => Step::Finished(MonitorExit::ShutdownTriggered),
            Err(e) => {
                error!("Shutdown failed, monitor will not retry: {}", e);
                Step::Finished(MonitorExit::ShutdownFailed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    const TICK: Duration = Duration::from_secs(1);

    /// Yields a scripted sequence of samples, then repeats the last one.
    struct ScriptedProbe {
        script: Mutex<VecDeque<Option<u64>>>,
        last: Mutex<Option<u64>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(script: impl IntoIterator<Item = Option<u64>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn seconds(samples: impl IntoIterator<Item = u64>) -> Arc<Self> {
            Self::new(samples.into_iter().map(Some))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IdleProbe for ScriptedProbe {
        fn sample(&self) -> Result<Duration> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                *last = next;
            }
            last.map(Duration::from_secs)
                .ok_or_else(|| Error::ProbeUnavailable("scripted failure".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingShutdown {
        triggers: AtomicUsize,
        fail: bool,
    }

    impl CountingShutdown {
        fn failing() -> Self {
            Self {
                triggers: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn triggers(&self) -> usize {
            self.triggers.load(Ordering::SeqCst)
        }
    }

    impl ShutdownAction for CountingShutdown {
        fn trigger(&self) -> Result<()> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::ShutdownFailed("permission denied".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn monitor(
        store: &Arc<ThresholdStore>,
        probe: &Arc<ScriptedProbe>,
        action: &Arc<CountingShutdown>,
    ) -> InactivityMonitor {
        InactivityMonitor::new(store.clone(), probe.clone(), action.clone(), TICK)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_sample_that_reaches_limit() {
        let store = Arc::new(ThresholdStore::new());
        store.set(5.0).unwrap();
        let probe = ScriptedProbe::seconds([1, 2, 3, 4, 5, 6]);
        let action = Arc::new(CountingShutdown::default());

        let exit = monitor(&store, &probe, &action)
            .run(CancellationToken::new())
            .await;

        assert!(matches!(exit, MonitorExit::ShutdownTriggered));
        assert_eq!(probe.calls(), 5, "must fire on the fifth sample, not later");
        assert_eq!(action.triggers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_on_a_fixed_cadence() {
        let store = Arc::new(ThresholdStore::new());
        store.set(3.0).unwrap();
        let probe = ScriptedProbe::seconds([0, 1, 2, 3]);
        let action = Arc::new(CountingShutdown::default());

        let start = Instant::now();
        monitor(&store, &probe, &action)
            .run(CancellationToken::new())
            .await;

        // First sample is immediate, then one per second.
        assert_eq!(start.elapsed(), TICK * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn never_fires_while_uninitialized() {
        let store = Arc::new(ThresholdStore::new());
        let probe = ScriptedProbe::seconds([10_000]);
        let action = Arc::new(CountingShutdown::default());
        let cancel = CancellationToken::new();

        let monitor = monitor(&store, &probe, &action);
        let state = monitor.subscribe();
        let task = tokio::spawn(monitor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();

        assert!(matches!(task.await.unwrap(), MonitorExit::Cancelled));
        assert_eq!(*state.borrow(), MonitorState::Uninitialized);
        assert_eq!(probe.calls(), 0);
        assert_eq!(action.triggers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn arms_within_one_interval_of_limit_being_set() {
        let store = Arc::new(ThresholdStore::new());
        let probe = ScriptedProbe::seconds([0]);
        let action = Arc::new(CountingShutdown::default());
        let cancel = CancellationToken::new();

        let monitor = monitor(&store, &probe, &action);
        let mut state = monitor.subscribe();
        let task = tokio::spawn(monitor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        store.set(30.0).unwrap();
        let set_at = Instant::now();

        state.changed().await.unwrap();
        assert_eq!(*state.borrow(), MonitorState::Armed);
        assert!(set_at.elapsed() <= TICK);

        cancel.cancel();
        assert!(matches!(task.await.unwrap(), MonitorExit::Cancelled));
        assert_eq!(action.triggers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn uses_freshest_limit_each_cycle() {
        let store = Arc::new(ThresholdStore::new());
        store.set(100.0).unwrap();
        let probe = ScriptedProbe::seconds([10]);
        let action = Arc::new(CountingShutdown::default());

        let monitor = monitor(&store, &probe, &action);
        let task = tokio::spawn(monitor.run(CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(action.triggers(), 0);
        store.set(10.0).unwrap();

        assert!(matches!(task.await.unwrap(), MonitorExit::ShutdownTriggered));
        assert_eq!(probe.calls(), 6);
        assert_eq!(action.triggers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inconclusive_samples_are_retried() {
        let store = Arc::new(ThresholdStore::new());
        store.set(5.0).unwrap();
        let probe = ScriptedProbe::new([None, None, Some(2), None, Some(7)]);
        let action = Arc::new(CountingShutdown::default());

        let exit = monitor(&store, &probe, &action)
            .run(CancellationToken::new())
            .await;

        assert!(matches!(exit, MonitorExit::ShutdownTriggered));
        assert_eq!(probe.calls(), 5);
        assert_eq!(action.triggers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_shutdown_is_terminal() {
        let store = Arc::new(ThresholdStore::new());
        store.set(1.0).unwrap();
        let probe = ScriptedProbe::seconds([5]);
        let action = Arc::new(CountingShutdown::failing());

        let monitor = monitor(&store, &probe, &action);
        let state = monitor.subscribe();
        let exit = monitor.run(CancellationToken::new()).await;

        assert!(matches!(exit, MonitorExit::ShutdownFailed(Error::ShutdownFailed(_))));
        assert_eq!(*state.borrow(), MonitorState::Fired);

        // Nothing keeps sampling or retrying after the loop has returned.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe.calls(), 1);
        assert_eq!(action.triggers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_fires_immediately() {
        let store = Arc::new(ThresholdStore::new());
        store.set(0.0).unwrap();
        let probe = ScriptedProbe::seconds([0]);
        let action = Arc::new(CountingShutdown::default());

        let exit = monitor(&store, &probe, &action)
            .run(CancellationToken::new())
            .await;

        assert!(matches!(exit, MonitorExit::ShutdownTriggered));
        assert_eq!(action.triggers(), 1);
    }

    /// Blocks inside `trigger` until released from the test task.
    struct GatedShutdown {
        started: tokio::sync::Notify,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ShutdownAction for GatedShutdown {
        fn trigger(&self) -> Result<()> {
            self.started.notify_one();
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| Error::ShutdownFailed("never released".to_string()))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn shutdown_command_does_not_stall_the_runtime() {
        let store = Arc::new(ThresholdStore::new());
        store.set(1.0).unwrap();
        let probe = ScriptedProbe::seconds([5]);
        let (release, gate) = std::sync::mpsc::channel();
        let action = Arc::new(GatedShutdown {
            started: tokio::sync::Notify::new(),
            release: Mutex::new(gate),
        });

        let monitor = InactivityMonitor::new(
            store,
            probe,
            action.clone(),
            Duration::from_millis(10),
        );
        let task = tokio::spawn(monitor.run(CancellationToken::new()));

        // Only reachable while the command runs if it is off the runtime thread.
        action.started.notified().await;
        release.send(()).unwrap();

        assert!(matches!(task.await.unwrap(), MonitorExit::ShutdownTriggered));
    }

    #[tokio::test(start_paused = true)]
    async fn journal_records_arming_and_firing() {
        let store = Arc::new(ThresholdStore::new());
        store.set(2.0).unwrap();
        let probe = ScriptedProbe::seconds([1, 2]);
        let action = Arc::new(CountingShutdown::default());
        let (journal, mut rx) = Journal::channel();

        monitor(&store, &probe, &action)
            .with_journal(journal)
            .run(CancellationToken::new())
            .await;

        let armed = rx.recv().await.unwrap();
        assert_eq!(armed.event, JournalEvent::MonitorArmed { limit_seconds: 2.0 });

        let fired = rx.recv().await.unwrap();
        assert_eq!(
            fired.event,
            JournalEvent::ShutdownRequested {
                source: ShutdownSource::Monitor,
                idle_seconds: Some(2.0),
                limit_seconds: Some(2.0),
                success: true,
                error: None,
            }
        );
    }
}
