//! Scheduler: time-driven runs with a process-wide Idle/Running guard.
//!
//! One [`Scheduler`] owns the run state. A trigger that arrives while a run is
//! active is skipped without touching the state, and every exit path of a run
//! (success, error, panic) puts the state back to Idle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use harvester_shared::{DailySlot, Result, RunId, ScheduleConfig, WeeklySlot};

// ---------------------------------------------------------------------------
// Run types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Collect → Normalize → Validate → Merge over every location.
    Full,
    /// Same stages over the first `incremental_locations` locations.
    Incremental,
    /// Normalize → Validate from the raw files on disk; no collection, no merge.
    Maintenance,
}

impl RunKind {
    pub const ALL: [RunKind; 3] = [RunKind::Full, RunKind::Incremental, RunKind::Maintenance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts per error category. Run-level failures surface as
/// [`TriggerOutcome::Failed`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    /// Source calls and page fetches that failed.
    pub source_failures: usize,
    pub extraction_failures: usize,
    /// Fields nulled by the normalizer.
    pub field_defects: usize,
    /// Records excluded from merge by the validator.
    pub invalid_records: usize,
    pub persistence_failures: usize,
    /// Raw files and checkpoints that could not be written.
    pub artifact_failures: usize,
}

impl ErrorCounts {
    pub fn total(&self) -> usize {
        self.source_failures
            + self.extraction_failures
            + self.field_defects
            + self.invalid_records
            + self.persistence_failures
            + self.artifact_failures
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub locations: usize,
    pub candidates: usize,
    pub canonical: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub valid: usize,
    pub invalid: usize,
    pub warned: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: ErrorCounts,
}

impl RunSummary {
    pub fn new(kind: RunKind) -> Self {
        let now = Utc::now();
        Self {
            run_id: RunId::new(),
            kind,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            locations: 0,
            candidates: 0,
            canonical: 0,
            duplicates: 0,
            dropped: 0,
            valid: 0,
            invalid: 0,
            warned: 0,
            created: 0,
            updated: 0,
            errors: ErrorCounts::default(),
        }
    }

    /// Stamp the finish time.
    pub fn finish(mut self, started: Instant) -> Self {
        self.finished_at = Utc::now();
        self.elapsed_ms = started.elapsed().as_millis() as u64;
        self
    }

    /// One-line summary for logs and status output.
    pub fn line(&self) -> String {
        format!(
            "{} run: {} candidates, {} canonical, {} valid, {} invalid, {} created, {} updated, {} errors in {}ms",
            self.kind,
            self.candidates,
            self.canonical,
            self.valid,
            self.invalid,
            self.created,
            self.updated,
            self.errors.total(),
            self.elapsed_ms
        )
    }
}

/// Executes one run of the given kind.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run(&self, kind: RunKind) -> Result<RunSummary>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Another run was active; nothing executed.
    Skipped { active: RunKind },
    Completed(RunSummary),
    Failed { kind: RunKind, message: String },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    pub kind: RunKind,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub summary: String,
}

#[derive(Debug, Default)]
struct RunState {
    active: Option<RunKind>,
    last: Option<LastRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub active: Option<RunKind>,
    pub last_run: Option<LastRun>,
    pub next_full: DateTime<Utc>,
    pub next_incremental: DateTime<Utc>,
    pub next_maintenance: DateTime<Utc>,
}

/// Resets the active flag when dropped.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).active = None;
    }
}

fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Fire times
// ---------------------------------------------------------------------------

fn at_time(date: chrono::NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Next daily fire time strictly after `now`.
pub fn next_daily(slot: &DailySlot, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = at_time(now.date_naive(), slot.hour, slot.minute);
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Next weekly fire time strictly after `now`.
pub fn next_weekly(slot: &WeeklySlot, now: DateTime<Utc>) -> DateTime<Utc> {
    let target = slot.weekday.num_days_from_monday() as i64;
    let current = now.weekday().num_days_from_monday() as i64;
    let days_ahead = (target - current).rem_euclid(7);
    let candidate = at_time(
        now.date_naive() + ChronoDuration::days(days_ahead),
        slot.hour,
        slot.minute,
    );
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(7)
    }
}

pub fn next_fire(kind: RunKind, schedule: &ScheduleConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    match kind {
        RunKind::Full => next_weekly(&schedule.full_cycle, now),
        RunKind::Incremental => next_daily(&schedule.incremental, now),
        RunKind::Maintenance => next_daily(&schedule.maintenance, now),
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    schedule: ScheduleConfig,
    state: Mutex<RunState>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CycleRunner>, schedule: ScheduleConfig) -> Self {
        Self {
            runner,
            schedule,
            state: Mutex::new(RunState::default()),
        }
    }

    fn try_begin(&self, kind: RunKind) -> std::result::Result<RunGuard<'_>, RunKind> {
        let mut state = lock(&self.state);
        if let Some(active) = state.active {
            return Err(active);
        }
        state.active = Some(kind);
        Ok(RunGuard { state: &self.state })
    }

    fn record(&self, last: LastRun) {
        lock(&self.state).last = Some(last);
    }

    /// Run `kind` now unless another run is active.
    pub async fn trigger(&self, kind: RunKind) -> TriggerOutcome {
        let _guard = match self.try_begin(kind) {
            Ok(guard) => guard,
            Err(active) => {
                warn!(requested = %kind, %active, "run already in progress, skipping trigger");
                return TriggerOutcome::Skipped { active };
            }
        };

        info!(%kind, "run started");
        match self.runner.run(kind).await {
            Ok(summary) => {
                info!(%kind, summary = %summary.line(), "run completed");
                self.record(LastRun {
                    kind,
                    finished_at: summary.finished_at,
                    succeeded: true,
                    summary: summary.line(),
                });
                TriggerOutcome::Completed(summary)
            }
            Err(e) => {
                error!(%kind, error = %e, "run failed");
                self.record(LastRun {
                    kind,
                    finished_at: Utc::now(),
                    succeeded: false,
                    summary: e.to_string(),
                });
                TriggerOutcome::Failed {
                    kind,
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> SchedulerStatus {
        let state = lock(&self.state);
        SchedulerStatus {
            running: state.active.is_some(),
            active: state.active,
            last_run: state.last.clone(),
            next_full: next_fire(RunKind::Full, &self.schedule, now),
            next_incremental: next_fire(RunKind::Incremental, &self.schedule, now),
            next_maintenance: next_fire(RunKind::Maintenance, &self.schedule, now),
        }
    }

    /// Earliest upcoming fire time after `after` and every kind due at it.
    fn next_due(&self, after: DateTime<Utc>) -> (DateTime<Utc>, Vec<RunKind>) {
        let fires: Vec<(RunKind, DateTime<Utc>)> = RunKind::ALL
            .iter()
            .map(|&k| (k, next_fire(k, &self.schedule, after)))
            .collect();
        let earliest = fires
            .iter()
            .map(|(_, at)| *at)
            .min()
            .unwrap_or(after);
        let due = fires
            .into_iter()
            .filter(|(_, at)| *at == earliest)
            .map(|(k, _)| k)
            .collect();
        (earliest, due)
    }

    /// Run the recurring schedule until the task is dropped.
    ///
    /// Each due trigger is spawned, so a trigger that fires during a long run
    /// is observed and skipped rather than queued.
    pub async fn start(self: Arc<Self>) {
        let mut cursor = Utc::now();
        info!("scheduler started");
        loop {
            let (at, due) = self.next_due(cursor);
            let wait = (at - Utc::now()).to_std().unwrap_or_default();
            info!(next = %at, kinds = ?due, "waiting for next scheduled run");
            tokio::time::sleep(wait).await;

            for kind in due {
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    scheduler.trigger(kind).await;
                });
            }
            cursor = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Weekday;
    use harvester_shared::HarvesterError;
    use tokio::sync::Notify;

    /// Runner that blocks until released, optionally failing.
    #[derive(Default)]
    struct GatedRunner {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
        fail: bool,
    }

    #[async_trait]
    impl CycleRunner for GatedRunner {
        async fn run(&self, kind: RunKind) -> Result<RunSummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            if self.fail {
                return Err(HarvesterError::Storage("store unreachable".into()));
            }
            Ok(RunSummary::new(kind))
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let runner = Arc::new(GatedRunner::default());
        let scheduler = Arc::new(Scheduler::new(runner.clone(), ScheduleConfig::default()));

        let first = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.trigger(RunKind::Full).await }
        });
        runner.started.notified().await;

        assert!(scheduler.status().running);
        let second = scheduler.trigger(RunKind::Incremental).await;
        assert_eq!(
            second,
            TriggerOutcome::Skipped {
                active: RunKind::Full
            }
        );
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status().active, Some(RunKind::Full));

        runner.release.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Completed(ref s) if s.kind == RunKind::Full));

        let status = scheduler.status();
        assert!(!status.running);
        assert!(status.last_run.unwrap().succeeded);
    }

    #[tokio::test]
    async fn failure_returns_to_idle() {
        let runner = Arc::new(GatedRunner {
            fail: true,
            ..Default::default()
        });
        let scheduler = Scheduler::new(runner.clone(), ScheduleConfig::default());

        runner.release.notify_one();
        let outcome = scheduler.trigger(RunKind::Maintenance).await;
        assert!(
            matches!(outcome, TriggerOutcome::Failed { ref message, .. } if message.contains("store unreachable"))
        );

        let status = scheduler.status();
        assert!(!status.running);
        let last = status.last_run.unwrap();
        assert!(!last.succeeded);
        assert_eq!(last.kind, RunKind::Maintenance);

        runner.release.notify_one();
        scheduler.trigger(RunKind::Maintenance).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn daily_fire_is_strictly_after_now() {
        let slot = DailySlot { hour: 6, minute: 0 };
        assert_eq!(next_daily(&slot, utc(2026, 10, 17, 5, 59)), utc(2026, 10, 17, 6, 0));
        assert_eq!(next_daily(&slot, utc(2026, 10, 17, 6, 0)), utc(2026, 10, 18, 6, 0));
        assert_eq!(next_daily(&slot, utc(2026, 12, 31, 23, 0)), utc(2027, 1, 1, 6, 0));
    }

    #[test]
    fn weekly_fire_lands_on_weekday() {
        let slot = WeeklySlot {
            weekday: Weekday::Sun,
            hour: 2,
            minute: 0,
        };
        // 2026-10-17 is a Saturday.
        assert_eq!(next_weekly(&slot, utc(2026, 10, 17, 12, 0)), utc(2026, 10, 18, 2, 0));
        assert_eq!(next_weekly(&slot, utc(2026, 10, 18, 2, 0)), utc(2026, 10, 25, 2, 0));
        assert_eq!(next_weekly(&slot, utc(2026, 10, 18, 1, 0)), utc(2026, 10, 18, 2, 0));
    }

    #[test]
    fn next_due_picks_earliest() {
        let runner = Arc::new(GatedRunner::default());
        let scheduler = Scheduler::new(runner, ScheduleConfig::default());
        let (at, due) = scheduler.next_due(utc(2026, 10, 17, 7, 0));
        assert_eq!(at, utc(2026, 10, 17, 8, 0));
        assert_eq!(due, vec![RunKind::Maintenance]);
    }

    #[test]
    fn summary_line_counts_errors() {
        let mut s = RunSummary::new(RunKind::Incremental);
        s.errors.source_failures = 2;
        s.errors.invalid_records = 1;
        assert!(s.line().contains("3 errors"));
        assert!(s.line().starts_with("incremental run"));
    }
}
