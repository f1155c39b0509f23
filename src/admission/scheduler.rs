//! Wall-clock anchored recurring tasks
//!
//! The daily quota reset fires at local midnight. Each delay is computed
//! afresh from the current wall-clock time, so drift and daylight-saving
//! transitions never accumulate across days.

use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDateTime, TimeZone};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::quota::DailyQuotaCounter;

/// Computes when a recurring task should next run
pub trait Schedule: Send + Sync + 'static {
    /// First fire time strictly after `now`
    fn next_after(&self, now: DateTime<Local>) -> DateTime<Local>;
}

/// Fires at the start of every local calendar day
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyAtMidnight;

impl Schedule for DailyAtMidnight {
    fn next_after(&self, now: DateTime<Local>) -> DateTime<Local> {
        let Some(midnight) = now
            .date_naive()
            .succ_opt()
            .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        else {
            return now + ChronoDuration::days(1);
        };

        resolve_wall_clock(midnight, |naive| Local.from_local_datetime(naive))
            .unwrap_or(now + ChronoDuration::days(1))
    }
}

/// Turn a wall-clock time into an instant using `resolve` (a time zone's
/// local-to-UTC mapping).
///
/// A repeated wall-clock time (clocks fell back) resolves to its first
/// occurrence. A skipped one (clocks sprang forward) resolves to the first
/// minute after it that exists, looking at most three hours ahead.
fn resolve_wall_clock<T, F>(wall: NaiveDateTime, resolve: F) -> Option<T>
where
    F: Fn(&NaiveDateTime) -> LocalResult<T>,
{
    match resolve(&wall) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (1..=180)
            .find_map(|minutes| resolve(&(wall + ChronoDuration::minutes(minutes))).earliest()),
    }
}

/// Task run on each firing. Errors and panics are logged, never fatal.
pub type ScheduledTask = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Scheduled,
    Stopped,
}

/// Runs a task on a wall-clock [`Schedule`] until stopped.
///
/// Stopping cancels the pending timer; a reset that already began always
/// runs to completion because it never awaits. Dropping the scheduler
/// stops it as well.
pub struct QuotaResetScheduler {
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl QuotaResetScheduler {
    /// Clear `counter` every local midnight. Must be called within a Tokio runtime.
    pub fn start(counter: Arc<DailyQuotaCounter>) -> Self {
        Self::with_schedule(
            DailyAtMidnight,
            Arc::new(move || -> anyhow::Result<()> {
                counter.reset_all();
                Ok(())
            }),
        )
    }

    /// Run `task` on `schedule`. Must be called within a Tokio runtime.
    pub fn with_schedule<S: Schedule>(schedule: S, task: ScheduledTask) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                let now = Local::now();
                let next = schedule.next_after(now);
                let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

                debug!(
                    next_run = %next.to_rfc3339(),
                    delay_secs = delay.as_secs(),
                    "Scheduled next quota reset"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => run_guarded(&task),
                    // Fires on stop() and when the scheduler is dropped
                    _ = stopped.changed() => break,
                }
            }
            info!("Quota reset scheduler stopped");
        });

        Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Cancel the pending timer. Safe to call more than once.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.handle.lock().as_ref() {
            Some(handle) if !handle.is_finished() => SchedulerState::Scheduled,
            _ => SchedulerState::Stopped,
        }
    }
}

impl Drop for QuotaResetScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run one firing, containing any failure so the next one still gets scheduled
fn run_guarded(task: &ScheduledTask) {
    match catch_unwind(AssertUnwindSafe(|| (task.as_ref())())) {
        Ok(Ok(())) => info!("Scheduled quota reset completed"),
        Ok(Err(e)) => error!(error = %e, "Scheduled quota reset failed"),
        Err(_) => error!("Scheduled quota reset panicked"),
    }
}
