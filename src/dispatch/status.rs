use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc,
};

use crate::{
    schedule::JobSummary,
    transport::{self, Kind, MessageReceipt},
    Error,
};

/// Progress and outcome of a dispatch, posted to a [`StatusSink`]
///
/// An immediate send posts [`Status::Sending`], possibly some
/// [`Status::AttachmentSkipped`], then exactly one of [`Status::Sent`] or
/// [`Status::Failed`]. Every firing of a scheduled job posts
/// [`Status::JobFired`], possibly some skipped attachments, then exactly one
/// of [`Status::JobSent`] or [`Status::JobFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// An immediate send started
    Sending,
    /// An attachment could not be read and was left out
    AttachmentSkipped(String),
    /// An immediate send succeeded
    Sent(MessageReceipt),
    /// An immediate send failed
    Failed(FailureReport),
    /// Jobs were registered
    Scheduled(Vec<JobSummary>),
    /// A scheduled job came due and started sending
    JobFired(JobSummary),
    /// A scheduled send succeeded
    JobSent(JobSummary, MessageReceipt),
    /// A scheduled send failed
    JobFailed(JobSummary, FailureReport),
}

impl Status {
    /// Whether this status ends a send attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Sent(_) | Status::Failed(_) | Status::JobSent(..) | Status::JobFailed(..)
        )
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Status::Sending => f.write_str("Sending email..."),
            Status::AttachmentSkipped(warning) => write!(f, "Skipped {warning}"),
            Status::Sent(receipt) => write!(f, "Email sent ({})", receipt.message_id()),
            Status::Failed(report) => write!(f, "Email not sent: {report}"),
            Status::Scheduled(jobs) => {
                f.write_str("Email scheduled: ")?;
                for (i, job) in jobs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(job.description())?;
                }
                Ok(())
            }
            Status::JobFired(job) => write!(f, "Scheduled email firing: {}", job.description()),
            Status::JobSent(job, receipt) => write!(
                f,
                "Scheduled email sent: {} ({})",
                job.description(),
                receipt.message_id()
            ),
            Status::JobFailed(job, report) => write!(
                f,
                "Scheduled email not sent: {}: {report}",
                job.description()
            ),
        }
    }
}

/// Why a send did not go through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    kind: Option<Kind>,
    message: String,
}

impl FailureReport {
    /// Failure category, `None` when the message could not even be built
    pub fn kind(&self) -> Option<&Kind> {
        self.kind.as_ref()
    }

    /// Human readable description
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&transport::Error> for FailureReport {
    fn from(err: &transport::Error) -> Self {
        FailureReport {
            kind: Some(err.kind().clone()),
            message: err.to_string(),
        }
    }
}

impl From<&Error> for FailureReport {
    fn from(err: &Error) -> Self {
        match err {
            Error::Transport(err) => err.into(),
            other => FailureReport {
                kind: None,
                message: other.to_string(),
            },
        }
    }
}

impl Display for FailureReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives [`Status`] updates, from background threads
pub trait StatusSink: Send + Sync + 'static {
    /// Posts a status update
    fn post(&self, status: Status);
}

impl<F> StatusSink for F
where
    F: Fn(Status) + Send + Sync + 'static,
{
    fn post(&self, status: Status) {
        self(status);
    }
}

impl StatusSink for mpsc::Sender<Status> {
    fn post(&self, status: Status) {
        // a dropped receiver means nobody is listening anymore
        let _ = self.send(status);
    }
}
