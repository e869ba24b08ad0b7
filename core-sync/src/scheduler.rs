//! # Auto-Sync Trigger
//!
//! Starts one sync job per day at a configured UTC time of day.
//!
//! ## Overview
//!
//! Configuring an enabled schedule spawns a task that sleeps until the next
//! occurrence of `time_of_day`, asks the launcher to start a job restricted
//! to the past week, then sleeps until the following day. Reconfiguring
//! cancels that task before arming a new one, so at most one occurrence is
//! ever pending.
//!
//! An occurrence that finds a job already running is skipped, not queued.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{AutoSyncSettings, AutoSyncTrigger, JobKind};
//!
//! let trigger = AutoSyncTrigger::new(orchestrator.clone());
//! trigger.configure(AutoSyncSettings {
//!     enabled: true,
//!     time_of_day: NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
//!     kind: JobKind::Incremental,
//!     channel_ref: Some("UC123".to_string()),
//! })?;
//!
//! println!("next run: {:?}", trigger.next_run_time());
//! ```

use crate::job::{JobKind, SyncJobId, TimeFilter};
use crate::orchestrator::SyncOrchestrator;
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use core_runtime::config::AutoSyncDefaults;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Persisted auto-sync schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSyncSettings {
    pub enabled: bool,
    /// Daily trigger time, UTC
    pub time_of_day: NaiveTime,
    pub kind: JobKind,
    pub channel_ref: Option<String>,
}

impl Default for AutoSyncSettings {
    fn default() -> Self {
        Self::from_defaults(&AutoSyncDefaults::default(), JobKind::default())
    }
}

impl AutoSyncSettings {
    /// Seed settings from configuration before anything was persisted
    pub fn from_defaults(defaults: &AutoSyncDefaults, kind: JobKind) -> Self {
        Self {
            enabled: defaults.enabled,
            time_of_day: defaults.time_of_day,
            kind,
            channel_ref: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.channel_ref.as_deref() {
            Some(channel) if !channel.trim().is_empty() => Ok(()),
            _ => Err(SyncError::InvalidSchedule(
                "An enabled schedule needs a channel".to_string(),
            )),
        }
    }
}

/// Something that can start a sync job on the trigger's behalf
#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn launch(
        &self,
        kind: JobKind,
        time_filter: TimeFilter,
        channel_ref: &str,
    ) -> Result<SyncJobId>;
}

#[async_trait]
impl JobLauncher for SyncOrchestrator {
    async fn launch(
        &self,
        kind: JobKind,
        time_filter: TimeFilter,
        channel_ref: &str,
    ) -> Result<SyncJobId> {
        self.start(kind, time_filter, channel_ref).await
    }
}

/// First instant strictly after `after` whose UTC wall clock reads `time_of_day`
pub fn next_occurrence(time_of_day: NaiveTime, after: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = after.date_naive().and_time(time_of_day).and_utc();
    if candidate > after {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

#[derive(Default)]
struct TriggerState {
    settings: AutoSyncSettings,
    next_run: Option<DateTime<Utc>>,
    cancellation_token: Option<CancellationToken>,
}

/// Daily scheduler for default sync jobs
pub struct AutoSyncTrigger {
    launcher: Arc<dyn JobLauncher>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<TriggerState>>,
}

impl AutoSyncTrigger {
    pub fn new(launcher: Arc<dyn JobLauncher>) -> Self {
        Self::with_clock(launcher, Arc::new(SystemClock))
    }

    pub fn with_clock(launcher: Arc<dyn JobLauncher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            launcher,
            clock,
            state: Arc::new(Mutex::new(TriggerState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the schedule
    ///
    /// Any pending occurrence is dropped first. Must be called from within a
    /// tokio runtime when `settings.enabled` is set.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidSchedule`] when enabled without a channel; the
    /// current schedule is left as it was.
    pub fn configure(&self, settings: AutoSyncSettings) -> Result<()> {
        settings.validate()?;

        let mut state = self.lock();
        if let Some(token) = state.cancellation_token.take() {
            token.cancel();
        }
        state.next_run = None;
        state.settings = settings.clone();

        let channel_ref = match (settings.enabled, settings.channel_ref) {
            (true, Some(channel_ref)) => channel_ref,
            _ => {
                info!("Auto-sync disabled");
                return Ok(());
            }
        };

        let first = next_occurrence(settings.time_of_day, self.clock.now());
        let token = CancellationToken::new();
        state.next_run = Some(first);
        state.cancellation_token = Some(token.clone());

        info!(
            time_of_day = %settings.time_of_day.format("%H:%M"),
            kind = %settings.kind,
            next_run = %first,
            "Scheduled auto-sync"
        );

        tokio::spawn(run_schedule(
            Arc::clone(&self.launcher),
            Arc::clone(&self.clock),
            Arc::clone(&self.state),
            token,
            ScheduledJob {
                time_of_day: settings.time_of_day,
                kind: settings.kind,
                channel_ref,
            },
            first,
        ));

        Ok(())
    }

    pub fn next_run_time(&self) -> Option<DateTime<Utc>> {
        self.lock().next_run
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().cancellation_token.is_some()
    }

    pub fn settings(&self) -> AutoSyncSettings {
        self.lock().settings.clone()
    }

    /// Drop the pending occurrence without touching the stored settings
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if let Some(token) = state.cancellation_token.take() {
            token.cancel();
            info!("Auto-sync trigger shut down");
        }
        state.next_run = None;
    }
}

impl Drop for AutoSyncTrigger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ScheduledJob {
    time_of_day: NaiveTime,
    kind: JobKind,
    channel_ref: String,
}

async fn run_schedule(
    launcher: Arc<dyn JobLauncher>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<TriggerState>>,
    token: CancellationToken,
    job: ScheduledJob,
    first: DateTime<Utc>,
) {
    let mut next = first;

    loop {
        let wait = (next - clock.now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        info!(kind = %job.kind, channel = %job.channel_ref, "Starting auto-sync");
        match launcher
            .launch(job.kind, TimeFilter::Week, &job.channel_ref)
            .await
        {
            Ok(job_id) => info!(job_id = %job_id, "Auto-sync job started"),
            Err(SyncError::AlreadyRunning { job_id }) => {
                info!(running = %job_id, "Skipping auto-sync, a job is already running")
            }
            Err(e) => warn!(error = %e, "Auto-sync failed to start"),
        }

        next = next_occurrence(job.time_of_day, next.max(clock.now()));

        {
            let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if token.is_cancelled() {
                return;
            }
            guard.next_run = Some(next);
        }
    }
}
