//! Sending and scheduling requests
//!
//! A [`DispatchCoordinator`] owns a [`Transport`], the sender address and a
//! [`SchedulerEngine`]. Each [`DispatchRequest`] is validated on the calling
//! thread, then either:
//!
//! * sent right away on a background thread, returning a [`SendHandle`], or
//! * registered as one job per [`ScheduleSpec`], every firing of which
//!   rebuilds and sends the message independently.
//!
//! Progress is posted to a [`StatusSink`] from whichever thread does the work,
//! and every attempt ends with exactly one log record.
//!
//! ```rust
//! use std::sync::mpsc;
//!
//! use envoi::{
//!     transport::stub::StubTransport, DispatchCoordinator, DispatchOutcome, DispatchRequest,
//!     Status,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, rx) = mpsc::channel();
//! let coordinator = DispatchCoordinator::new(StubTransport::new_ok(), "me@example.com", tx);
//!
//! let request = DispatchRequest::new()
//!     .to("alice@example.com, bob@example.com")
//!     .subject("Hello")
//!     .body("Hi there");
//! if let DispatchOutcome::Sending(handle) = coordinator.dispatch(request)? {
//!     handle.join()?;
//! }
//!
//! assert_eq!(rx.recv()?, Status::Sending);
//! assert!(matches!(rx.recv()?, Status::Sent(_)));
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::{self, Debug, Display, Formatter},
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::NaiveDateTime;

pub use self::status::{FailureReport, Status, StatusSink};
use crate::{
    address::{normalize, split_recipients},
    config::ServerConfig,
    error::ValidationError,
    schedule::{
        Clock, JobId, JobState, JobSummary, ScheduleSpec, SchedulerEngine, SystemClock,
        DEFAULT_TICK,
    },
    transport::{self, smtp::SmtpTransport, Kind, MessageReceipt, Transport},
    Error, Message, MessageBuilder,
};

mod status;

/// Everything needed to send one message, now or later
///
/// Recipient fields accept several addresses separated by `,` or `;`, and can
/// be given more than once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchRequest {
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    reply_to: Option<String>,
    subject: String,
    body: String,
    html: bool,
    attachments: Vec<PathBuf>,
    schedules: Vec<ScheduleSpec>,
    scheduled: bool,
    one_shot_missing: bool,
}

impl DispatchRequest {
    /// Creates an empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `To` recipients
    pub fn to<S: AsRef<str>>(mut self, recipients: S) -> Self {
        self.to.extend(split_recipients(recipients.as_ref()));
        self
    }

    /// Adds `Cc` recipients
    pub fn cc<S: AsRef<str>>(mut self, recipients: S) -> Self {
        self.cc.extend(split_recipients(recipients.as_ref()));
        self
    }

    /// Adds `Bcc` recipients
    pub fn bcc<S: AsRef<str>>(mut self, recipients: S) -> Self {
        self.bcc.extend(split_recipients(recipients.as_ref()));
        self
    }

    /// Sets the `Reply-To` address
    pub fn reply_to<S: Into<String>>(mut self, address: S) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Sets the subject
    pub fn subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the body text
    pub fn body<S: Into<String>>(mut self, body: S) -> Self {
        self.body = body.into();
        self
    }

    /// Also sends the body as HTML
    pub fn html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    /// Adds a file to attach
    pub fn attachment<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Adds a trigger, switching the request to scheduled mode
    pub fn schedule(mut self, spec: ScheduleSpec) -> Self {
        self.scheduled = true;
        self.schedules.push(spec);
        self
    }

    /// Adds a one-shot trigger whose date and time may not have been picked
    ///
    /// `None` makes [`DispatchCoordinator::dispatch`] fail with
    /// [`ValidationError::ScheduleTimeMissing`].
    pub fn schedule_once(mut self, at: Option<NaiveDateTime>) -> Self {
        match at {
            Some(at) => self.schedule(ScheduleSpec::OneShot(at)),
            None => {
                self.scheduled = true;
                self.one_shot_missing = true;
                self
            }
        }
    }

    /// Switches to scheduled mode without adding a trigger
    pub fn scheduled(mut self) -> Self {
        self.scheduled = true;
        self
    }

    /// Triggers added so far
    pub fn schedules(&self) -> &[ScheduleSpec] {
        &self.schedules
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if normalize(self.to.iter().chain(&self.cc).chain(&self.bcc)).is_empty() {
            return Err(ValidationError::NoRecipients);
        }
        if self.one_shot_missing {
            return Err(ValidationError::ScheduleTimeMissing);
        }
        if self.scheduled && self.schedules.is_empty() {
            return Err(ValidationError::NoScheduleSelected);
        }
        if self.schedules.len() > 1 && self.schedules.contains(&ScheduleSpec::Immediate) {
            return Err(ValidationError::ImmediateCombined);
        }
        Ok(())
    }

    fn is_immediate(&self) -> bool {
        self.schedules.iter().all(|spec| *spec == ScheduleSpec::Immediate)
    }

    fn message(&self, sender: &str) -> Result<Message, ValidationError> {
        let mut builder = MessageBuilder::new(sender)
            .subject(self.subject.as_str())
            .body(self.body.as_str())
            .html(self.html);
        builder = self.to.iter().fold(builder, |b, mbox| b.to(mbox.as_str()));
        builder = self.cc.iter().fold(builder, |b, mbox| b.cc(mbox.as_str()));
        builder = self.bcc.iter().fold(builder, |b, mbox| b.bcc(mbox.as_str()));
        builder = self
            .attachments
            .iter()
            .fold(builder, |b, path| b.attachment(path.as_path()));
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.as_str());
        }
        builder.build()
    }
}

/// What [`DispatchCoordinator::dispatch`] started
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The message is being sent in the background
    Sending(SendHandle),
    /// One job was registered per trigger
    Scheduled(Vec<JobSummary>),
}

impl Display for DispatchOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Sending(_) => Display::fmt(&Status::Sending, f),
            DispatchOutcome::Scheduled(jobs) => Display::fmt(&Status::Scheduled(jobs.clone()), f),
        }
    }
}

/// Handle on an immediate send
pub struct SendHandle {
    thread: JoinHandle<Result<MessageReceipt, transport::Error>>,
}

impl SendHandle {
    /// Waits for the send to finish
    pub fn join(self) -> Result<MessageReceipt, Error> {
        match self.thread.join() {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Transport(transport::Error::new(
                Kind::Unclassified,
                None,
                Some("send thread panicked"),
            ))),
        }
    }

    /// Whether the send has finished
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

impl Debug for SendHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct Context<T> {
    transport: T,
    sender: String,
    sink: Arc<dyn StatusSink>,
}

impl<T: Transport> Context<T> {
    /// Sends and logs exactly one terminal record
    ///
    /// A panicking transport counts as an unclassified failure.
    fn deliver(&self, message: &Message) -> Result<MessageReceipt, transport::Error> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.transport.send(message)))
            .unwrap_or_else(|_| {
                Err(transport::Error::new(
                    Kind::Unclassified,
                    None,
                    Some("transport panicked"),
                ))
            });
        match &result {
            Ok(receipt) => {
                let to = if message.to().is_empty() {
                    "(self)".to_owned()
                } else {
                    message.to().join(", ")
                };
                tracing::info!(
                    to = %to,
                    cc = %message.cc().join(", "),
                    bcc = message.bcc().len(),
                    subject = %message.subject(),
                    message_id = %receipt.message_id(),
                    refused = receipt.refused().len(),
                    "email sent"
                );
            }
            Err(err) if *err.kind() == Kind::Unclassified => {
                tracing::error!(
                    error = ?err,
                    message_id = %message.message_id(),
                    "unexpected error while sending email"
                );
            }
            Err(err) => {
                tracing::error!(
                    kind = %err.kind(),
                    error = %err,
                    message_id = %message.message_id(),
                    "email not sent"
                );
            }
        }
        result
    }

    fn post_warnings(&self, message: &Message) {
        for warning in message.warnings() {
            self.sink.post(Status::AttachmentSkipped(warning.to_string()));
        }
    }

    fn send_and_report(&self, message: &Message) -> Result<MessageReceipt, transport::Error> {
        let result = self.deliver(message);
        self.sink.post(match &result {
            Ok(receipt) => Status::Sent(receipt.clone()),
            Err(err) => Status::Failed(err.into()),
        });
        result
    }

    fn run_job(&self, job: JobSummary, request: &DispatchRequest) {
        let span = tracing::info_span!("job", id = %job.id(), schedule = %job.description());
        let _enter = span.enter();

        self.sink.post(Status::JobFired(job.clone()));

        let message = match request.message(&self.sender) {
            Ok(message) => message,
            Err(err) => {
                let err = Error::from(err);
                tracing::error!(error = %err, "scheduled email not built");
                self.sink.post(Status::JobFailed(job, (&err).into()));
                return;
            }
        };
        self.post_warnings(&message);

        match self.deliver(&message) {
            Ok(receipt) => self.sink.post(Status::JobSent(job, receipt)),
            Err(err) => self.sink.post(Status::JobFailed(job, (&err).into())),
        }
    }
}

/// Validates requests, sends them or schedules them
pub struct DispatchCoordinator<T: Transport + 'static = SmtpTransport> {
    context: Arc<Context<T>>,
    scheduler: SchedulerEngine<DispatchRequest>,
}

impl DispatchCoordinator<SmtpTransport> {
    /// Creates a coordinator sending over SMTP as the configured user
    pub fn from_config<S: StatusSink>(config: &ServerConfig, sink: S) -> Result<Self, Error> {
        let transport = SmtpTransport::new(config)?;
        Ok(Self::new(transport, config.username(), sink))
    }

    /// Creates a coordinator from the `SMTP_*` environment variables
    pub fn from_env<S: StatusSink>(sink: S) -> Result<Self, Error> {
        let config = ServerConfig::from_env()?;
        Self::from_config(&config, sink)
    }
}

impl<T: Transport + 'static> DispatchCoordinator<T> {
    /// Creates a coordinator on the system clock
    pub fn new<U, S>(transport: T, sender: U, sink: S) -> Self
    where
        U: Into<String>,
        S: StatusSink,
    {
        Self::with_clock(transport, sender, sink, SystemClock, DEFAULT_TICK)
    }

    /// Creates a coordinator whose scheduler runs on `clock`
    pub fn with_clock<U, S, C>(transport: T, sender: U, sink: S, clock: C, tick: Duration) -> Self
    where
        U: Into<String>,
        S: StatusSink,
        C: Clock,
    {
        let context = Arc::new(Context {
            transport,
            sender: sender.into(),
            sink: Arc::new(sink),
        });

        let scheduler = {
            let context = Arc::clone(&context);
            SchedulerEngine::with_clock(clock, tick, move |job, request: Arc<DispatchRequest>| {
                context.run_job(job, &request);
            })
        };

        Self { context, scheduler }
    }

    /// Validates `request`, then sends it or registers its jobs
    ///
    /// Nothing is sent, scheduled or posted when this returns an error.
    pub fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, Error> {
        request.validate()?;

        if request.is_immediate() {
            return self.send_now(&request).map(DispatchOutcome::Sending);
        }

        let specs = request.schedules.clone();
        let jobs = self.scheduler.register_batch(&specs, request)?;
        for job in &jobs {
            tracing::info!(
                id = %job.id(),
                next_fire = %job.next_fire(),
                "scheduled {}",
                job.description()
            );
        }
        self.context.sink.post(Status::Scheduled(jobs.clone()));
        Ok(DispatchOutcome::Scheduled(jobs))
    }

    fn send_now(&self, request: &DispatchRequest) -> Result<SendHandle, Error> {
        let message = request.message(&self.context.sender)?;

        self.context.sink.post(Status::Sending);
        self.context.post_warnings(&message);

        let context = Arc::clone(&self.context);
        let spawned = thread::Builder::new()
            .name("envoi-send".to_owned())
            .spawn(move || context.send_and_report(&message));

        match spawned {
            Ok(thread) => Ok(SendHandle { thread }),
            Err(err) => {
                let err = transport::Error::new(Kind::Unclassified, None, Some(err));
                tracing::error!(error = ?err, "unexpected error while sending email");
                self.context.sink.post(Status::Failed((&err).into()));
                Err(err.into())
            }
        }
    }

    /// Cancels a pending job, returns `false` if it was not pending
    pub fn cancel(&self, id: JobId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Pending jobs, soonest first
    pub fn jobs(&self) -> Vec<JobSummary> {
        self.scheduler.jobs()
    }

    /// State of a job, `None` if unknown
    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        self.scheduler.state(id)
    }

    /// Transport used for every send
    pub fn transport(&self) -> &T {
        &self.context.transport
    }

    /// Stops the scheduler
    ///
    /// Pending jobs are cancelled. With `wait_for_running`, blocks until
    /// firings in progress have finished. Immediate sends are not affected.
    pub fn shutdown(&self, wait_for_running: bool) {
        self.scheduler.shutdown(wait_for_running);
    }
}

impl<T: Transport + 'static> Debug for DispatchCoordinator<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("sender", &self.context.sender)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
