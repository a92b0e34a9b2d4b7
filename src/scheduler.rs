/// Cycle scheduler for the flood risk service
///
/// A cycle is one pass of:
/// 1. Ingestion: fetch current weather for every location and store it
/// 2. Aggregation: recompute trailing 24h/72h rainfall on the latest readings
/// 3. Scoring (only when `score_after_cycle` is set): assess every location
///
/// Cycles run on a single background worker, so at most one is in flight.
/// A trigger that arrives while a cycle is running is skipped, not queued.
/// Every error or panic inside a cycle stops at the cycle boundary: it is
/// written to the system log and the scheduler returns to `Idle` for the
/// next trigger. A panic's log entry carries the backtrace taken at the
/// panic site by a chained panic hook.

use chrono::Utc;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Once};
use std::thread;
use std::time::{Duration, Instant};
use threadpool::ThreadPool;

use crate::analysis::rainfall::{AggregationSummary, RainfallAggregator};
use crate::analysis::risk::{RiskScoringEngine, ScoringSummary};
use crate::ingest::pipeline::{CancelToken, CycleSummary, IngestionPipeline};
use crate::model::ServiceError;
use crate::store::{Store, SystemLogStore};

/// Log type recorded when a cycle panics.
pub const CYCLE_PANIC: &str = "CYCLE_PANIC";

/// Longest single sleep in `run()` before re-checking the stop flag.
const STOP_POLL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// One cycle
// ---------------------------------------------------------------------------

/// What a completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub ingestion: CycleSummary,
    /// `None` when the cycle was cancelled before aggregation.
    pub aggregation: Option<AggregationSummary>,
    /// `None` unless scoring after each cycle is enabled.
    pub scoring: Option<ScoringSummary>,
}

/// Runs the ingestion -> aggregation -> scoring sequence against one store.
pub struct CycleRunner {
    store: Arc<dyn Store>,
    pipeline: IngestionPipeline,
    aggregator: RainfallAggregator,
    scorer: Option<RiskScoringEngine>,
}

impl CycleRunner {
    pub fn new(store: Arc<dyn Store>, pipeline: IngestionPipeline, aggregator: RainfallAggregator) -> Self {
        Self {
            store,
            pipeline,
            aggregator,
            scorer: None,
        }
    }

    /// Scores every location at the end of each cycle.
    pub fn with_scoring(mut self, scorer: RiskScoringEngine) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.pipeline.cancel_token()
    }

    pub fn run_cycle(&self) -> Result<CycleReport, ServiceError> {
        let store = self.store.as_ref();
        let locations = store.list_locations()?;

        let ingestion = self.pipeline.run_cycle(store, &locations)?;
        if ingestion.cancelled {
            return Ok(CycleReport {
                ingestion,
                aggregation: None,
                scoring: None,
            });
        }

        let now = Utc::now();
        let aggregation = self.aggregator.update_aggregates(store, &locations, now)?;

        let scoring = match &self.scorer {
            Some(scorer) => Some(scorer.assess_all(store, now)?),
            None => None,
        };

        Ok(CycleReport {
            ingestion,
            aggregation: Some(aggregation),
            scoring,
        })
    }
}

// ---------------------------------------------------------------------------
// Failure recording
// ---------------------------------------------------------------------------

thread_local! {
    static IN_CYCLE: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a panic hook that keeps the panic-site backtrace of any panic
/// raised while this thread is inside a supervised cycle.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_CYCLE.with(Cell::get) {
                let trace = Backtrace::force_capture().to_string();
                PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            }
            previous(info);
        }));
    });
}

/// Why a cycle did not complete.
#[derive(Debug)]
pub enum CycleFailure {
    Error(ServiceError),
    Panic {
        message: String,
        /// Stack at the panic site, when the panic hook caught it.
        backtrace: Option<String>,
    },
}

impl CycleFailure {
    fn from_panic(payload: Box<dyn Any + Send>, backtrace: Option<String>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "cycle panicked with a non-string payload".to_string()
        };
        CycleFailure::Panic { message, backtrace }
    }

    pub fn log_type(&self) -> &'static str {
        match self {
            CycleFailure::Error(e) => e.log_type(),
            CycleFailure::Panic { .. } => CYCLE_PANIC,
        }
    }

    pub fn message(&self) -> String {
        match self {
            CycleFailure::Error(e) => e.to_string(),
            CycleFailure::Panic { message, .. } => format!("cycle panicked: {}", message),
        }
    }

    /// Panic-site stack. Errors carry their context in `error_chain` instead.
    pub fn backtrace(&self) -> Option<&str> {
        match self {
            CycleFailure::Error(_) => None,
            CycleFailure::Panic { backtrace, .. } => backtrace.as_deref(),
        }
    }

    /// Messages from the error and each of its sources, outermost first.
    pub fn error_chain(&self) -> Vec<String> {
        match self {
            CycleFailure::Error(e) => {
                let mut chain = vec![e.to_string()];
                let mut source = e.source();
                while let Some(cause) = source {
                    chain.push(cause.to_string());
                    source = cause.source();
                }
                chain
            }
            CycleFailure::Panic { message, .. } => vec![message.clone()],
        }
    }
}

/// Writes a failed cycle to the system log. A failure to write is logged
/// locally and otherwise ignored.
pub fn record_cycle_failure<L>(log_store: &L, failure: &CycleFailure)
where
    L: SystemLogStore + ?Sized,
{
    let message = failure.message();
    log::error!("Cycle failed [{}]: {}", failure.log_type(), message);

    let mut metadata = serde_json::json!({
        "error_chain": failure.error_chain(),
        "timestamp": Utc::now().to_rfc3339(),
    });
    if let Some(trace) = failure.backtrace() {
        metadata["backtrace"] = serde_json::Value::String(trace.to_string());
    }

    if let Err(e) = log_store.append_system_log(failure.log_type(), &message, &metadata) {
        log::error!("Failed to write cycle failure to system log: {}", e);
    }
}

/// Runs one cycle with the catch-all boundary applied.
fn supervised_cycle(runner: &CycleRunner) -> Option<CycleReport> {
    install_panic_hook();
    PANIC_TRACE.with(|slot| slot.borrow_mut().take());

    IN_CYCLE.with(|flag| flag.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.run_cycle()));
    IN_CYCLE.with(|flag| flag.set(false));

    let failure = match outcome {
        Ok(Ok(report)) => {
            log::info!(
                "✓ Cycle complete: {} fetched, {} failed{}",
                report.ingestion.succeeded,
                report.ingestion.failed,
                if report.ingestion.cancelled { " (cancelled)" } else { "" }
            );
            return Some(report);
        }
        Ok(Err(e)) => CycleFailure::Error(e),
        Err(payload) => CycleFailure::from_panic(payload, PANIC_TRACE.with(|slot| slot.borrow_mut().take())),
    };

    record_cycle_failure(runner.store().as_ref(), &failure);
    None
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    RunningCycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A cycle was already running; this trigger was dropped.
    SkippedBusy,
}

struct Shared {
    state: Mutex<SchedulerState>,
    idle: Condvar,
    last_report: Mutex<Option<CycleReport>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn finish(&self, report: Option<CycleReport>) {
        match self.last_report.lock() {
            Ok(mut last) => *last = report,
            Err(poisoned) => *poisoned.into_inner() = report,
        }
        *self.state() = SchedulerState::Idle;
        self.idle.notify_all();
    }
}

pub struct Scheduler {
    runner: Arc<CycleRunner>,
    pool: ThreadPool,
    shared: Arc<Shared>,
    cancel: CancelToken,
    interval: Duration,
}

impl Scheduler {
    /// Creates a scheduler firing every `interval`, measured between cycle starts.
    pub fn new(runner: CycleRunner, interval: Duration) -> Self {
        let cancel = runner.cancel_token();
        Self {
            runner: Arc::new(runner),
            pool: ThreadPool::with_name("flood-cycle".to_string(), 1),
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::Idle),
                idle: Condvar::new(),
                last_report: Mutex::new(None),
            }),
            cancel,
            interval,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state()
    }

    /// Report of the most recent cycle, `None` if it failed or none has run.
    pub fn last_report(&self) -> Option<CycleReport> {
        match self.shared.last_report.lock() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Starts a cycle on the worker unless one is already running.
    pub fn trigger(&self) -> TriggerOutcome {
        {
            let mut state = self.shared.state();
            if *state == SchedulerState::RunningCycle {
                log::warn!("Cycle still running, skipping trigger");
                return TriggerOutcome::SkippedBusy;
            }
            *state = SchedulerState::RunningCycle;
        }

        let runner = Arc::clone(&self.runner);
        let shared = Arc::clone(&self.shared);
        self.pool.execute(move || {
            let report = supervised_cycle(&runner);
            shared.finish(report);
        });

        TriggerOutcome::Started
    }

    /// Blocks until no cycle is running.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state();
        while *state == SchedulerState::RunningCycle {
            state = match self.shared.idle.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Like `wait_idle`, giving up after `timeout`. Returns true if idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state();
        while *state == SchedulerState::RunningCycle {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.shared.idle.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Triggers a cycle every interval until `stop()` is called, then waits
    /// for the in-flight cycle to reach a location boundary and finish.
    pub fn run(&self) {
        log::info!("🚀 Starting scheduler loop (interval: {:?})", self.interval);

        while !self.cancel.is_cancelled() {
            let started = Instant::now();
            self.trigger();

            let next = started + self.interval;
            loop {
                if self.cancel.is_cancelled() {
                    break;
                }
                let now = Instant::now();
                if now >= next {
                    break;
                }
                thread::sleep((next - now).min(STOP_POLL));
            }
        }

        self.wait_idle();
        log::info!("Scheduler stopped");
    }

    /// Asks the loop and any running cycle to stop at the next boundary.
    pub fn stop(&self) {
        log::info!("Stop requested");
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
