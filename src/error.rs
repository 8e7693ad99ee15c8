//! Error types surfaced by the crate

use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
};

use crate::{config::ConfigError, transport};

/// Any error returned by the public API
#[derive(Debug)]
pub enum Error {
    /// The request was rejected before any side effect
    Validation(ValidationError),
    /// The server configuration is incomplete or malformed
    Configuration(ConfigError),
    /// Delivery failed
    Transport(transport::Error),
}

impl Error {
    /// Returns the validation error, if this is one
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the transport error, if this is one
    pub fn as_transport(&self) -> Option<&transport::Error> {
        match self {
            Error::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(err) => write!(f, "invalid request: {err}"),
            Error::Configuration(err) => write!(f, "invalid configuration: {err}"),
            Error::Transport(err) => write!(f, "delivery failed: {err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Validation(err) => Some(err),
            Error::Configuration(err) => Some(err),
            Error::Transport(err) => Some(err),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Configuration(err)
    }
}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        Error::Transport(err)
    }
}

/// Bad input, detected before anything is sent or scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// To, Cc and Bcc are all empty after trimming
    NoRecipients,
    /// Scheduled mode was requested without any trigger
    NoScheduleSelected,
    /// A one-shot trigger was requested but its date/time was never resolved
    ScheduleTimeMissing,
    /// A one-shot trigger is not strictly after the registration moment
    TimeNotInFuture,
    /// `Immediate` was combined with other triggers
    ImmediateCombined,
    /// `Immediate` was handed to the scheduler
    NotSchedulable,
    /// The scheduler has been shut down
    SchedulerStopped,
    /// Hour or minute out of range
    InvalidTimeOfDay {
        /// Requested hour
        hour: u32,
        /// Requested minute
        minute: u32,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoRecipients => f.write_str("no recipients"),
            ValidationError::NoScheduleSelected => f.write_str("no schedule selected"),
            ValidationError::ScheduleTimeMissing => f.write_str("schedule time missing"),
            ValidationError::TimeNotInFuture => f.write_str("time not in future"),
            ValidationError::ImmediateCombined => {
                f.write_str("immediate delivery cannot be combined with a schedule")
            }
            ValidationError::NotSchedulable => {
                f.write_str("immediate delivery cannot be scheduled")
            }
            ValidationError::SchedulerStopped => f.write_str("scheduler is shut down"),
            ValidationError::InvalidTimeOfDay { hour, minute } => {
                write!(f, "invalid time of day {hour:02}:{minute:02}")
            }
        }
    }
}

impl StdError for ValidationError {}
