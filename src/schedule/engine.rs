use std::{
    collections::{HashMap, VecDeque},
    fmt::{self, Display, Formatter},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::NaiveDateTime;

use super::{Clock, JobId, ScheduleSpec, SystemClock};
use crate::error::ValidationError;

/// How often the clock thread looks at the registry when nothing wakes it
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// How many fired or cancelled jobs [`SchedulerEngine::state`] remembers
pub const RETIRED_LIMIT: usize = 1024;

type Callback<P> = dyn Fn(JobSummary, Arc<P>) + Send + Sync;

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Waiting for its next fire time
    Pending,
    /// A one-shot job that has fired
    Fired,
    /// Cancelled, or dropped by a shutdown, before firing
    Cancelled,
}

/// Snapshot of a registered job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    id: JobId,
    spec: ScheduleSpec,
    description: String,
    next_fire: NaiveDateTime,
    firings: u32,
}

impl JobSummary {
    /// Job identifier
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Trigger the job was created from
    pub fn spec(&self) -> ScheduleSpec {
        self.spec
    }

    /// Human readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Next fire time, or the scheduled time of the firing being reported
    pub fn next_fire(&self) -> NaiveDateTime {
        self.next_fire
    }

    /// How many times the job fired, including the one being reported
    pub fn firings(&self) -> u32 {
        self.firings
    }
}

impl Display for JobSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.id)
    }
}

struct Job<P> {
    summary: JobSummary,
    payload: Arc<P>,
}

struct Registry<P> {
    pending: HashMap<JobId, Job<P>>,
    /// Terminal state of jobs that left `pending`, oldest forgotten first
    retired: HashMap<JobId, JobState>,
    retired_order: VecDeque<JobId>,
    running: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl<P> Registry<P> {
    fn new() -> Self {
        Registry {
            pending: HashMap::new(),
            retired: HashMap::new(),
            retired_order: VecDeque::new(),
            running: Vec::new(),
            stopped: false,
        }
    }

    fn retire(&mut self, id: JobId, state: JobState) {
        if self.retired.insert(id, state).is_none() {
            self.retired_order.push_back(id);
        }
        while self.retired_order.len() > RETIRED_LIMIT {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }
}

struct Shared<P> {
    registry: Mutex<Registry<P>>,
    wakeup: Condvar,
    clock: Box<dyn Clock>,
    tick: Duration,
    callback: Arc<Callback<P>>,
}

impl<P> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, Registry<P>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fires registered jobs from a background clock thread
///
/// Every firing runs `callback` on a thread of its own, with the job summary
/// and the payload given at registration. Registration, cancellation and
/// the decision to fire all happen under the same lock, so a cancelled job
/// never fires afterwards.
///
/// ```rust
/// use std::sync::mpsc;
///
/// use envoi::{ScheduleSpec, SchedulerEngine, TimeOfDay};
///
/// # fn main() -> Result<(), envoi::ValidationError> {
/// let (tx, _rx) = mpsc::channel();
/// let engine = SchedulerEngine::new(move |job, payload: std::sync::Arc<String>| {
///     let _ = tx.send((job.description().to_owned(), payload.to_string()));
/// });
///
/// let job = engine.register(
///     ScheduleSpec::Daily(TimeOfDay::new(9, 0)?),
///     "standup reminder".to_owned(),
///     "reminder",
/// )?;
/// assert!(engine.cancel(job.id()));
/// assert!(!engine.cancel(job.id()));
/// engine.shutdown(false);
/// # Ok(())
/// # }
/// ```
pub struct SchedulerEngine<P: Send + Sync + 'static> {
    shared: Arc<Shared<P>>,
    clock_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Send + Sync + 'static> SchedulerEngine<P> {
    /// Creates an engine on the system clock
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(JobSummary, Arc<P>) + Send + Sync + 'static,
    {
        Self::with_clock(SystemClock, DEFAULT_TICK, callback)
    }

    /// Creates an engine on `clock`, polled every `tick`
    pub fn with_clock<C, F>(clock: C, tick: Duration, callback: F) -> Self
    where
        C: Clock,
        F: Fn(JobSummary, Arc<P>) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry::new()),
            wakeup: Condvar::new(),
            clock: Box::new(clock),
            tick,
            callback: Arc::new(callback),
        });

        let clock_thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("envoi-scheduler".to_owned())
                .spawn(move || run(&shared))
        };
        let clock_thread = match clock_thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!("could not start the scheduler clock: {err}");
                shared.lock().stopped = true;
                None
            }
        };

        Self {
            shared,
            clock_thread: Mutex::new(clock_thread),
        }
    }

    /// Registers a single job
    ///
    /// One-shots must be strictly in the future. `Immediate` is refused.
    pub fn register<D: Into<String>>(
        &self,
        spec: ScheduleSpec,
        payload: P,
        description: D,
    ) -> Result<JobSummary, ValidationError> {
        let mut registry = self.shared.lock();
        if registry.stopped {
            return Err(ValidationError::SchedulerStopped);
        }

        let next_fire = first_fire(&spec, self.shared.clock.now())?;
        let summary = insert(
            &mut registry,
            spec,
            description.into(),
            next_fire,
            Arc::new(payload),
        );
        drop(registry);

        self.shared.wakeup.notify_all();
        Ok(summary)
    }

    /// Registers one job per spec, sharing `payload`
    ///
    /// Either every spec is registered or none is.
    pub fn register_batch(
        &self,
        specs: &[ScheduleSpec],
        payload: P,
    ) -> Result<Vec<JobSummary>, ValidationError> {
        if specs.is_empty() {
            return Err(ValidationError::NoScheduleSelected);
        }
        if specs.len() > 1 && specs.contains(&ScheduleSpec::Immediate) {
            return Err(ValidationError::ImmediateCombined);
        }

        let mut registry = self.shared.lock();
        if registry.stopped {
            return Err(ValidationError::SchedulerStopped);
        }

        let now = self.shared.clock.now();
        let fire_times = specs
            .iter()
            .map(|spec| first_fire(spec, now))
            .collect::<Result<Vec<_>, _>>()?;

        let payload = Arc::new(payload);
        let summaries = specs
            .iter()
            .zip(fire_times)
            .map(|(spec, next_fire)| {
                insert(
                    &mut registry,
                    *spec,
                    spec.description(),
                    next_fire,
                    Arc::clone(&payload),
                )
            })
            .collect();
        drop(registry);

        self.shared.wakeup.notify_all();
        Ok(summaries)
    }

    /// Cancels a pending job
    ///
    /// Returns `false` when the job already fired, was already cancelled or
    /// is unknown.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut registry = self.shared.lock();
        let cancelled = registry.pending.remove(&id).is_some();
        if cancelled {
            registry.retire(id, JobState::Cancelled);
            tracing::debug!("cancelled job {id}");
        }
        drop(registry);

        self.shared.wakeup.notify_all();
        cancelled
    }

    /// State of a job, `None` if it was never registered here
    ///
    /// Only the last [`RETIRED_LIMIT`] fired or cancelled jobs are
    /// remembered, older ones are `None` again.
    pub fn state(&self, id: JobId) -> Option<JobState> {
        let registry = self.shared.lock();
        if registry.pending.contains_key(&id) {
            return Some(JobState::Pending);
        }
        registry.retired.get(&id).copied()
    }

    /// Pending jobs, soonest first
    pub fn jobs(&self) -> Vec<JobSummary> {
        let mut jobs = self
            .shared
            .lock()
            .pending
            .values()
            .map(|job| job.summary.clone())
            .collect::<Vec<_>>();
        jobs.sort_by_key(JobSummary::next_fire);
        jobs
    }

    /// Whether the engine still accepts jobs
    pub fn is_running(&self) -> bool {
        !self.shared.lock().stopped
    }

    /// Stops the clock; pending jobs never fire afterwards
    ///
    /// With `wait_for_running`, also waits for firings already in progress.
    /// Calling it again is a no-op apart from that wait.
    pub fn shutdown(&self, wait_for_running: bool) {
        let running = {
            let mut registry = self.shared.lock();
            if !registry.stopped {
                registry.stopped = true;
                let dropped = registry.pending.drain().map(|(id, _)| id).collect::<Vec<_>>();
                for id in dropped {
                    registry.retire(id, JobState::Cancelled);
                }
            }
            if wait_for_running {
                registry.running.drain(..).collect::<Vec<_>>()
            } else {
                Vec::new()
            }
        };
        self.shared.wakeup.notify_all();

        let clock_thread = self
            .clock_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = clock_thread {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        for handle in running {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl<P: Send + Sync + 'static> Drop for SchedulerEngine<P> {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

impl<P: Send + Sync + 'static> fmt::Debug for SchedulerEngine<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let registry = self.shared.lock();
        f.debug_struct("SchedulerEngine")
            .field("pending", &registry.pending.len())
            .field("stopped", &registry.stopped)
            .field("tick", &self.shared.tick)
            .finish_non_exhaustive()
    }
}

fn first_fire(spec: &ScheduleSpec, now: NaiveDateTime) -> Result<NaiveDateTime, ValidationError> {
    match spec {
        ScheduleSpec::Immediate => Err(ValidationError::NotSchedulable),
        _ => spec
            .next_after(now)
            .ok_or(ValidationError::TimeNotInFuture),
    }
}

fn insert<P>(
    registry: &mut Registry<P>,
    spec: ScheduleSpec,
    description: String,
    next_fire: NaiveDateTime,
    payload: Arc<P>,
) -> JobSummary {
    let summary = JobSummary {
        id: JobId::new(),
        spec,
        description,
        next_fire,
        firings: 0,
    };
    tracing::debug!("registered job {summary}, next fire at {next_fire}");

    registry.pending.insert(
        summary.id,
        Job {
            summary: summary.clone(),
            payload,
        },
    );
    summary
}

/// Clock thread body
fn run<P: Send + Sync + 'static>(shared: &Shared<P>) {
    let mut registry = shared.lock();

    while !registry.stopped {
        let now = shared.clock.now();
        let due = registry
            .pending
            .values()
            .filter(|job| job.summary.next_fire <= now)
            .map(|job| job.summary.id)
            .collect::<Vec<_>>();
        for id in due {
            fire(shared, &mut registry, id, now);
        }
        registry.running.retain(|handle| !handle.is_finished());

        registry = match shared.wakeup.wait_timeout(registry, shared.tick) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}

fn fire<P: Send + Sync + 'static>(
    shared: &Shared<P>,
    registry: &mut Registry<P>,
    id: JobId,
    now: NaiveDateTime,
) {
    let Some(job) = registry.pending.get_mut(&id) else {
        return;
    };

    job.summary.firings += 1;
    let summary = job.summary.clone();
    let payload = Arc::clone(&job.payload);

    let next_fire = job
        .summary
        .spec
        .next_after(now)
        .filter(|_| job.summary.spec.is_recurring());
    if let Some(next_fire) = next_fire {
        job.summary.next_fire = next_fire;
    } else {
        registry.pending.remove(&id);
        registry.retire(id, JobState::Fired);
    }
    tracing::debug!("firing job {summary}");

    let callback = Arc::clone(&shared.callback);
    let spawned = thread::Builder::new()
        .name(format!("envoi-job-{id}"))
        .spawn(move || callback(summary, payload));
    match spawned {
        Ok(handle) => registry.running.push(handle),
        Err(err) => tracing::error!("could not start a thread for job {id}: {err}"),
    }
}
