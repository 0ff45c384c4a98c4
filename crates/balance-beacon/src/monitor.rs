//! Monitor loop: runs the reply pipeline on a timer.
//!
//! One [`EmailMonitor`] owns the timer state. Each tick polls the mailbox,
//! parses every fetched message and hands it to the [`LedgerUpdater`]. At
//! most one tick runs at a time; a tick that comes due while another is in
//! flight is skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{MonitorSettings, SeenPolicy};
use crate::email::{parse_reply, EmailError, FetchedBatch, MailboxConnector, MailboxPoller};
use crate::reply::{LedgerOutcome, LedgerUpdater, ReplyStore};

/// What started a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickTrigger {
    Start,
    Timer,
    Manual,
}

/// Counters of one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub fetched: u32,
    pub matched: u32,
    pub orphaned: u32,
    pub already_processed: u32,
    pub unparseable: u32,
    /// Replies whose ledger update failed; they stay unseen under `after_apply`.
    pub failed: u32,
    pub marked_seen: u32,
}

impl TickReport {
    fn record(&mut self, outcome: &LedgerOutcome) {
        match outcome {
            LedgerOutcome::Matched { .. } => self.matched += 1,
            LedgerOutcome::Orphaned { .. } => self.orphaned += 1,
            LedgerOutcome::AlreadyProcessed => self.already_processed += 1,
        }
    }
}

/// How a tick ended. Nothing else escapes a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was still in flight.
    Skipped,
    Failed(String),
}

/// The last tick that actually ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub trigger: TickTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: TickOutcome,
}

/// Snapshot returned by [`EmailMonitor::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub mailbox_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub tick_in_flight: bool,
    pub skipped_ticks: u64,
    pub seen_policy: SeenPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<TickSummary>,
}

/// Timer lifecycle: `Stopped -> Running -> Stopped`.
enum MonitorState {
    Stopped,
    Running {
        interval_minutes: u32,
        started_at: DateTime<Utc>,
        handle: JoinHandle<()>,
        shutdown: watch::Sender<bool>,
    },
}

impl MonitorState {
    /// Stops the timer task. An in-flight tick runs to completion.
    fn shut_down(self) -> bool {
        match self {
            MonitorState::Stopped => false,
            MonitorState::Running {
                handle, shutdown, ..
            } => {
                let _ = shutdown.send(true);
                handle.abort();
                true
            }
        }
    }
}

/// Clears the in-flight flag when the tick ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Pipeline {
    poller: Option<MailboxPoller>,
    ledger: LedgerUpdater,
    seen_policy: SeenPolicy,
    tick_timeout: Duration,
    tick_in_flight: AtomicBool,
    skipped_ticks: AtomicU64,
    last_tick: Mutex<Option<TickSummary>>,
}

impl Pipeline {
    async fn run_tick(self: Arc<Self>, trigger: TickTrigger) -> TickOutcome {
        if self
            .tick_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            warn!(?trigger, "Previous tick still running, skipping this one");
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.tick_in_flight);

        let started_at = Utc::now();
        let span = info_span!("monitor_tick", ?trigger);
        let outcome = match self.process(started_at).instrument(span).await {
            Ok(report) => {
                info!(
                    fetched = report.fetched,
                    matched = report.matched,
                    orphaned = report.orphaned,
                    failed = report.failed,
                    "Tick completed"
                );
                TickOutcome::Completed(report)
            }
            Err(e) => {
                error!("Tick failed: {}", e);
                TickOutcome::Failed(e.to_string())
            }
        };

        let summary = TickSummary {
            trigger,
            started_at,
            finished_at: Utc::now(),
            outcome: outcome.clone(),
        };
        match self.last_tick.lock() {
            Ok(mut last) => *last = Some(summary),
            Err(_) => warn!("Tick summary lock poisoned"),
        }

        outcome
    }

    async fn process(&self, now: DateTime<Utc>) -> Result<TickReport, EmailError> {
        let poller = self
            .poller
            .as_ref()
            .ok_or(EmailError::ConfigurationMissing)?;

        let FetchedBatch {
            mut session,
            messages,
        } = tokio::time::timeout(
            self.tick_timeout,
            poller.fetch_unseen_since(now, self.seen_policy),
        )
        .await
        .map_err(|_| EmailError::MailboxTimeout(self.tick_timeout.as_secs()))??;

        let mut report = TickReport {
            fetched: messages.len() as u32,
            ..TickReport::default()
        };
        let mut session_usable = true;

        for raw in messages {
            let settled = match parse_reply(&raw.body) {
                Err(e) => {
                    warn!(uid = raw.uid, "Skipping unparseable message: {}", e);
                    report.unparseable += 1;
                    true
                }
                Ok(reply) => match self.ledger.apply(&reply, now) {
                    Ok(outcome) => {
                        report.record(&outcome);
                        true
                    }
                    Err(e) => {
                        error!(
                            uid = raw.uid,
                            message_id = %reply.message_id,
                            "Failed to apply reply: {}", e
                        );
                        report.failed += 1;
                        false
                    }
                },
            };

            if settled && session_usable && self.seen_policy == SeenPolicy::AfterApply {
                match tokio::time::timeout(self.tick_timeout, session.mark_seen(raw.uid)).await {
                    Ok(Ok(())) => report.marked_seen += 1,
                    Ok(Err(e)) => warn!(uid = raw.uid, "Failed to mark message seen: {}", e),
                    Err(_) => {
                        warn!(uid = raw.uid, "Marking message seen timed out");
                        session_usable = false;
                    }
                }
            }
        }

        if session_usable {
            match tokio::time::timeout(self.tick_timeout, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to close mailbox session: {}", e),
                Err(_) => warn!("Closing mailbox session timed out"),
            }
        }

        Ok(report)
    }
}

/// Owns the monitor timer and the reply pipeline.
pub struct EmailMonitor {
    pipeline: Arc<Pipeline>,
    default_interval_minutes: u32,
    state: Mutex<MonitorState>,
}

impl EmailMonitor {
    /// Creates a stopped monitor. Without a connector, starting fails with
    /// [`EmailError::ConfigurationMissing`].
    pub fn new(
        connector: Option<Arc<dyn MailboxConnector>>,
        store: Arc<dyn ReplyStore>,
        settings: &MonitorSettings,
    ) -> Self {
        let poller = connector.map(|c| MailboxPoller::new(c, settings));
        let ledger = LedgerUpdater::new(store)
            .with_match_window_days(i64::from(settings.match_window_days));

        Self {
            pipeline: Arc::new(Pipeline {
                poller,
                ledger,
                seen_policy: settings.seen_policy,
                tick_timeout: Duration::from_secs(settings.tick_timeout_secs),
                tick_in_flight: AtomicBool::new(false),
                skipped_ticks: AtomicU64::new(0),
                last_tick: Mutex::new(None),
            }),
            default_interval_minutes: settings.interval_minutes,
            state: Mutex::new(MonitorState::Stopped),
        }
    }

    /// Starts (or restarts) periodic checks every `interval_minutes`
    /// (default from settings). Runs one check immediately and returns
    /// its outcome.
    pub async fn start_monitoring(
        &self,
        interval_minutes: Option<u32>,
    ) -> Result<TickOutcome, EmailError> {
        if self.pipeline.poller.is_none() {
            return Err(EmailError::ConfigurationMissing);
        }
        let interval_minutes = interval_minutes.unwrap_or(self.default_interval_minutes);
        if interval_minutes == 0 {
            return Err(EmailError::Config(
                "interval must be at least one minute".to_string(),
            ));
        }

        if self.stop_monitoring() {
            info!("Restarting email monitor");
        }

        let first = Arc::clone(&self.pipeline)
            .run_tick(TickTrigger::Start)
            .await;

        let period = Duration::from_secs(u64::from(interval_minutes) * 60);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(timer_loop(Arc::clone(&self.pipeline), period, shutdown_rx));

        let previous = {
            let mut state = self.lock_state()?;
            std::mem::replace(
                &mut *state,
                MonitorState::Running {
                    interval_minutes,
                    started_at: Utc::now(),
                    handle,
                    shutdown,
                },
            )
        };
        // A concurrent start may have armed a timer meanwhile.
        previous.shut_down();

        info!(interval_minutes, "Email monitor started");
        Ok(first)
    }

    /// Cancels future ticks. Returns whether the monitor was running.
    pub fn stop_monitoring(&self) -> bool {
        let previous = match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut *state, MonitorState::Stopped),
            Err(_) => {
                warn!("Monitor state lock poisoned");
                return false;
            }
        };
        let was_running = previous.shut_down();
        if was_running {
            info!("Email monitor stopped");
        }
        was_running
    }

    /// Runs one tick now, subject to the same overlap guard as timer ticks.
    pub async fn check_now(&self) -> Result<TickOutcome, EmailError> {
        if self.pipeline.poller.is_none() {
            return Err(EmailError::ConfigurationMissing);
        }
        Ok(Arc::clone(&self.pipeline)
            .run_tick(TickTrigger::Manual)
            .await)
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|s| matches!(*s, MonitorState::Running { .. }))
            .unwrap_or(false)
    }

    pub fn status(&self) -> MonitorStatus {
        let (running, interval_minutes, started_at) = match self.state.lock() {
            Ok(state) => match &*state {
                MonitorState::Stopped => (false, None, None),
                MonitorState::Running {
                    interval_minutes,
                    started_at,
                    ..
                } => (true, Some(*interval_minutes), Some(*started_at)),
            },
            Err(_) => (false, None, None),
        };

        MonitorStatus {
            running,
            mailbox_configured: self.pipeline.poller.is_some(),
            interval_minutes,
            started_at,
            tick_in_flight: self.pipeline.tick_in_flight.load(Ordering::Acquire),
            skipped_ticks: self.pipeline.skipped_ticks.load(Ordering::Relaxed),
            seen_policy: self.pipeline.seen_policy,
            last_tick: self
                .pipeline
                .last_tick
                .lock()
                .ok()
                .and_then(|last| last.clone()),
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, MonitorState>, EmailError> {
        self.state
            .lock()
            .map_err(|_| EmailError::Config("monitor state lock poisoned".to_string()))
    }
}

impl Drop for EmailMonitor {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            std::mem::replace(&mut *state, MonitorState::Stopped).shut_down();
        }
    }
}

async fn timer_loop(
    pipeline: Arc<Pipeline>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                // Spawned so a slow tick never delays the timer.
                tokio::spawn(Arc::clone(&pipeline).run_tick(TickTrigger::Timer));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
