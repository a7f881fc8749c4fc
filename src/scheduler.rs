// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Recurring execution of the update pipeline.
///
/// The scheduler owns no pipeline logic. It runs a [`PipelineJob`] once
/// immediately, then once per cron firing, never two runs at a time, until
/// the stop future resolves.
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    config::{CheckFrequency, ScheduleSettings},
    error::Error,
    pipeline::RunOutcome,
};

/// Lifecycle of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq,)]
pub enum SchedulerState
{
    /// Waiting for the next firing.
    Idle,
    /// A pipeline run is in progress.
    Running,
    /// No further firings will happen.
    Stopped,
}

/// Receiving half of the stop signal handed to pipeline runs.
#[derive(Debug, Clone,)]
pub struct Shutdown
{
    receiver: watch::Receiver<bool,>,
}

impl Shutdown
{
    /// `true` once a stop was requested.
    pub fn is_triggered(&self,) -> bool
    {
        *self.receiver.borrow()
    }

    /// Resolves when a stop is requested or the trigger is dropped.
    pub async fn triggered(&mut self,)
    {
        let _ = self.receiver.wait_for(|stopped| *stopped,).await;
    }
}

/// Sending half of the stop signal.
#[derive(Debug,)]
pub struct ShutdownTrigger
{
    sender: watch::Sender<bool,>,
}

impl ShutdownTrigger
{
    pub fn trigger(&self,)
    {
        self.sender.send_replace(true,);
    }
}

/// Creates a connected stop signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown,)
{
    let (sender, receiver,) = watch::channel(false,);
    (
        ShutdownTrigger {
            sender,
        },
        Shutdown {
            receiver,
        },
    )
}

/// Cron trigger evaluated in UTC.
#[derive(Debug, Clone,)]
pub struct Trigger
{
    expression: String,
    schedule:   Schedule,
}

impl Trigger
{
    /// Builds the trigger for `frequency`: daily at `hour:minute`, or weekly
    /// on `weekday` at that time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schedule`] when the settings do not form a valid cron
    /// expression.
    pub fn from_settings(
        frequency: CheckFrequency,
        settings: &ScheduleSettings,
    ) -> Result<Self, Error,>
    {
        let expression = match frequency {
            CheckFrequency::Daily => format!("0 {} {} * * *", settings.minute, settings.hour),
            CheckFrequency::Weekly => {
                format!("0 {} {} * * {}", settings.minute, settings.hour, settings.weekday)
            }
        };
        Self::from_expression(expression,)
    }

    /// Parses a six-field cron expression (`sec min hour dom month dow`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schedule`] when the expression does not parse.
    pub fn from_expression(expression: impl Into<String,>,) -> Result<Self, Error,>
    {
        let expression = expression.into();
        let schedule = Schedule::from_str(&expression,).map_err(|e| Error::Schedule {
            expression: expression.clone(),
            message:    e.to_string(),
        },)?;

        Ok(Self {
            expression,
            schedule,
        },)
    }

    pub fn expression(&self,) -> &str
    {
        &self.expression
    }

    /// First firing strictly after `instant`.
    pub fn next_after(&self, instant: DateTime<Utc,>,) -> Option<DateTime<Utc,>,>
    {
        self.schedule.after(&instant,).next()
    }
}

/// Unit of work driven by the [`Scheduler`].
pub trait PipelineJob: Send + Sync + 'static
{
    /// Runs the pipeline once, stopping at the next repository boundary when
    /// `shutdown` fires.
    fn run_once(&self, shutdown: Shutdown,) -> impl Future<Output = RunOutcome,> + Send;
}

/// Drives a [`PipelineJob`] from a [`Trigger`].
pub struct Scheduler<J,>
{
    job:     Arc<J,>,
    trigger: Trigger,
    state:   Arc<watch::Sender<SchedulerState,>,>,
}

impl<J: PipelineJob,> Scheduler<J,>
{
    pub fn new(job: J, trigger: Trigger,) -> Self
    {
        let (state, _,) = watch::channel(SchedulerState::Idle,);
        Self {
            job: Arc::new(job,),
            trigger,
            state: Arc::new(state,),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self,) -> SchedulerState
    {
        *self.state.borrow()
    }

    /// Receiver observing lifecycle transitions.
    pub fn subscribe(&self,) -> watch::Receiver<SchedulerState,>
    {
        self.state.subscribe()
    }

    /// Runs the job once immediately, then on every firing until `stop`
    /// resolves.
    ///
    /// Firings that arrive while a run is in flight are skipped. On stop the
    /// in-flight run is signalled and awaited before returning.
    pub async fn start_recurring<F,>(&self, stop: F,)
    where
        F: Future<Output = (),>,
    {
        let (shutdown_trigger, shutdown,) = shutdown_channel();
        tokio::pin!(stop);

        info!("Scheduler started with trigger '{}' (UTC)", self.trigger.expression());
        let mut in_flight = Some(self.spawn_run(shutdown.clone(),),);

        loop {
            let now = Utc::now();
            let Some(next,) = self.trigger.next_after(now,) else {
                warn!("Trigger '{}' has no upcoming firing", self.trigger.expression());
                stop.as_mut().await;
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO,);
            debug!("Next run scheduled at {}", next);

            tokio::select! {
                () = &mut stop => {
                    info!("Stop requested, shutting down scheduler");
                    break;
                }
                () = tokio::time::sleep(wait) => {
                    if in_flight.as_ref().is_some_and(|run| !run.is_finished(),) {
                        warn!("Skipping run scheduled at {}: previous run still in progress", next);
                        continue;
                    }
                    in_flight = Some(self.spawn_run(shutdown.clone(),),);
                }
            }
        }

        self.state.send_replace(SchedulerState::Stopped,);
        shutdown_trigger.trigger();
        if let Some(run,) = in_flight
            && let Err(error,) = run.await
        {
            warn!("Pipeline run ended abnormally: {}", error);
        }
        info!("Scheduler stopped");
    }

    fn spawn_run(&self, shutdown: Shutdown,) -> JoinHandle<(),>
    {
        let job = Arc::clone(&self.job,);
        let state = Arc::clone(&self.state,);
        state.send_if_modified(|current| {
            if *current == SchedulerState::Idle {
                *current = SchedulerState::Running;
                true
            } else {
                false
            }
        },);

        tokio::spawn(async move {
            let _idle = IdleOnDrop {
                state,
            };
            match job.run_once(shutdown,).await {
                RunOutcome::Completed(summary,) => debug!(
                    "Run finished: {} repositories, {} with updates",
                    summary.repositories, summary.with_updates
                ),
                RunOutcome::NoSubscriptions => debug!("Run finished without subscriptions"),
                RunOutcome::Cancelled => debug!("Run cancelled"),
                RunOutcome::Aborted(reason,) => warn!("Run aborted: {}", reason),
            }
        },)
    }
}

/// Moves the scheduler from `Running` back to `Idle` when a run ends,
/// including when the job panics.
struct IdleOnDrop
{
    state: Arc<watch::Sender<SchedulerState,>,>,
}

impl Drop for IdleOnDrop
{
    fn drop(&mut self,)
    {
        self.state.send_if_modified(|current| {
            if *current == SchedulerState::Running {
                *current = SchedulerState::Idle;
                true
            } else {
                false
            }
        },);
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use chrono::{TimeZone, Weekday};

    use super::*;

    struct CountingJob
    {
        runs:      Arc<AtomicUsize,>,
        cancelled: Arc<AtomicUsize,>,
        hold:      bool,
    }

    impl PipelineJob for CountingJob
    {
        async fn run_once(&self, mut shutdown: Shutdown,) -> RunOutcome
        {
            self.runs.fetch_add(1, Ordering::SeqCst,);
            if self.hold {
                shutdown.triggered().await;
                self.cancelled.fetch_add(1, Ordering::SeqCst,);
                return RunOutcome::Cancelled;
            }
            RunOutcome::NoSubscriptions
        }
    }

    struct PanickingJob;

    impl PipelineJob for PanickingJob
    {
        async fn run_once(&self, _shutdown: Shutdown,) -> RunOutcome
        {
            panic!("semaphore exhausted");
        }
    }

    fn job(hold: bool,) -> (CountingJob, Arc<AtomicUsize,>, Arc<AtomicUsize,>,)
    {
        let runs = Arc::new(AtomicUsize::new(0,),);
        let cancelled = Arc::new(AtomicUsize::new(0,),);
        (
            CountingJob {
                runs: Arc::clone(&runs,),
                cancelled: Arc::clone(&cancelled,),
                hold,
            },
            runs,
            cancelled,
        )
    }

    fn instant(day: u32, hour: u32, minute: u32,) -> DateTime<Utc,>
    {
        Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0,).single().expect("valid timestamp",)
    }

    #[test]
    fn daily_trigger_fires_at_configured_time()
    {
        let settings = ScheduleSettings {
            hour: 9, minute: 30, weekday: Weekday::Mon,
        };
        let trigger = Trigger::from_settings(CheckFrequency::Daily, &settings,).expect("trigger",);

        assert_eq!(trigger.expression(), "0 30 9 * * *");
        assert_eq!(trigger.next_after(instant(14, 8, 0)), Some(instant(14, 9, 30)));
        assert_eq!(trigger.next_after(instant(14, 9, 30)), Some(instant(15, 9, 30)));
    }

    #[test]
    fn weekly_trigger_fires_on_configured_weekday()
    {
        let settings = ScheduleSettings {
            hour: 9, minute: 0, weekday: Weekday::Mon,
        };
        let trigger = Trigger::from_settings(CheckFrequency::Weekly, &settings,).expect("trigger",);

        assert_eq!(trigger.expression(), "0 0 9 * * Mon");
        // 2025-03-14 is a Friday.
        assert_eq!(trigger.next_after(instant(14, 12, 0)), Some(instant(17, 9, 0)));
    }

    #[test]
    fn invalid_settings_are_rejected()
    {
        let settings = ScheduleSettings {
            hour: 25, minute: 0, weekday: Weekday::Mon,
        };
        let error = Trigger::from_settings(CheckFrequency::Daily, &settings,).expect_err("hour 25",);
        assert!(matches!(error, Error::Schedule { .. }));
        assert!(error.is_configuration());
    }

    #[test]
    fn shutdown_signal_is_observed_by_clones()
    {
        let (trigger, shutdown,) = shutdown_channel();
        let clone = shutdown.clone();
        assert!(!clone.is_triggered());
        trigger.trigger();
        assert!(shutdown.is_triggered());
        assert!(clone.is_triggered());
    }

    #[tokio::test]
    async fn runs_immediately_and_stops_on_signal()
    {
        let (job, runs, _,) = job(false,);
        let trigger = Trigger::from_expression("0 0 0 1 1 *",).expect("yearly trigger",);
        let scheduler = Scheduler::new(job, trigger,);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.start_recurring(tokio::time::sleep(Duration::from_millis(200,),),).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn panicking_run_returns_scheduler_to_idle()
    {
        let trigger = Trigger::from_expression("0 0 0 1 1 *",).expect("yearly trigger",);
        let scheduler = Scheduler::new(PanickingJob, trigger,);
        let states = scheduler.subscribe();
        let observed = Arc::new(Mutex::new(None,),);
        let seen = Arc::clone(&observed,);

        scheduler
            .start_recurring(async move {
                tokio::time::sleep(Duration::from_millis(200,),).await;
                *seen.lock().expect("state lock",) = Some(*states.borrow(),);
            },)
            .await;

        assert_eq!(*observed.lock().expect("state lock",), Some(SchedulerState::Idle));
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn fires_repeatedly_on_schedule()
    {
        let (job, runs, _,) = job(false,);
        let trigger = Trigger::from_expression("* * * * * *",).expect("every second",);
        let scheduler = Scheduler::new(job, trigger,);

        scheduler.start_recurring(tokio::time::sleep(Duration::from_millis(2_500,),),).await;

        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn overlapping_firings_are_skipped_and_in_flight_run_is_cancelled()
    {
        let (job, runs, cancelled,) = job(true,);
        let trigger = Trigger::from_expression("* * * * * *",).expect("every second",);
        let scheduler = Scheduler::new(job, trigger,);
        let mut states = scheduler.subscribe();

        scheduler.start_recurring(tokio::time::sleep(Duration::from_millis(2_500,),),).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(*states.borrow_and_update(), SchedulerState::Stopped);
    }
}
