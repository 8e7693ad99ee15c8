//! Error and result type for transports

use std::{error::Error as StdError, fmt, io};

use crate::{
    transport::{smtp::response::Code, RefusedRecipient},
    BoxError,
};

// Inspired by https://github.com/seanmonstar/reqwest/blob/a8566383168c0ef06c21f38cbc9213af6ff6db31/src/error.rs

/// A failed delivery attempt
///
/// Attempts are never retried; the connection has already been closed when
/// this is returned.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    status: Option<Code>,
    source: Option<BoxError>,
}

/// Category of a delivery failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// The server rejected the credentials, or no common mechanism exists
    AuthenticationFailure,
    /// Every recipient was refused
    RecipientsRefused(Vec<RefusedRecipient>),
    /// The server could not be reached, or the TLS handshake or greeting failed
    Connect,
    /// The server closed the connection unexpectedly
    ServerDisconnected,
    /// The server refused the sender address
    SenderRefused,
    /// Anything else
    Unclassified,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::AuthenticationFailure => "authentication failed",
            Kind::RecipientsRefused(_) => "recipients refused",
            Kind::Connect => "could not connect",
            Kind::ServerDisconnected => "server disconnected",
            Kind::SenderRefused => "sender refused",
            Kind::Unclassified => "unexpected error",
        })
    }
}

/// Session step in which an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// TCP connect, TLS wrap and greeting
    Connect,
    /// EHLO and STARTTLS
    Handshake,
    /// AUTH exchange
    Auth,
    /// MAIL FROM
    Sender,
    /// RCPT TO, DATA and content
    Transfer,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, status: Option<Code>, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                status,
                source: source.map(Into::into),
            }),
        }
    }

    /// Failure category
    pub fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// Returns the status code, if the error was generated from a response.
    pub fn status(&self) -> Option<Code> {
        self.inner.status
    }

    /// Returns true if the server rejected the login
    pub fn is_authentication(&self) -> bool {
        matches!(self.inner.kind, Kind::AuthenticationFailure)
    }

    /// Returns true if every recipient was refused
    pub fn is_recipients_refused(&self) -> bool {
        matches!(self.inner.kind, Kind::RecipientsRefused(_))
    }

    /// Returns true if the server could not be reached
    pub fn is_connect(&self) -> bool {
        matches!(self.inner.kind, Kind::Connect)
    }

    /// Returns true if the server dropped the connection
    pub fn is_disconnected(&self) -> bool {
        matches!(self.inner.kind, Kind::ServerDisconnected)
    }

    /// Returns true if the sender address was refused
    pub fn is_sender_refused(&self) -> bool {
        matches!(self.inner.kind, Kind::SenderRefused)
    }

    /// Returns true if the error is caused by a timeout
    pub fn is_timeout(&self) -> bool {
        let mut source = self.source();

        while let Some(err) = source {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                return matches!(
                    io_err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                );
            }

            source = err.source();
        }

        false
    }

    /// Reclassifies an unclassified error by the step it happened in
    pub(crate) fn in_phase(mut self, phase: Phase) -> Error {
        if self.inner.kind != Kind::Unclassified {
            return self;
        }

        let negative_reply = self.inner.status.is_some();
        self.inner.kind = match phase {
            Phase::Connect => Kind::Connect,
            Phase::Auth if negative_reply => Kind::AuthenticationFailure,
            Phase::Sender if negative_reply => Kind::SenderRefused,
            Phase::Handshake | Phase::Auth | Phase::Sender | Phase::Transfer => {
                Kind::Unclassified
            }
        };
        self
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("envoi::transport::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(status) = self.inner.status {
            builder.field("status", &status);
        }

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::RecipientsRefused(refused) => {
                f.write_str("recipients refused: ")?;
                for (i, recipient) in refused.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{recipient}")?;
                }
                return Ok(());
            }
            kind => write!(f, "{kind}")?,
        }

        if let Some(status) = self.inner.status {
            write!(f, " ({status})")?;
        }

        if let Some(ref e) = self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| {
            let r: &(dyn StdError + 'static) = &**e;
            r
        })
    }
}

impl From<Kind> for Error {
    fn from(kind: Kind) -> Self {
        Error::new::<BoxError>(kind, None, None)
    }
}

/// A negative reply from the server
pub(crate) fn code(c: Code, message: String) -> Error {
    Error::new(Kind::Unclassified, Some(c), Some(message))
}

pub(crate) fn response<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Unclassified, None, Some(e))
}

pub(crate) fn client<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Unclassified, None, Some(e))
}

pub(crate) fn network(e: io::Error) -> Error {
    let kind = match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => Kind::ServerDisconnected,
        _ => Kind::Unclassified,
    };
    Error::new(kind, None, Some(e))
}

pub(crate) fn disconnected<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::ServerDisconnected, None, Some(e))
}

pub(crate) fn connection<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Connect, None, Some(e))
}

pub(crate) fn authentication<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::AuthenticationFailure, None, Some(e))
}

pub(crate) fn sender<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::SenderRefused, None, Some(e))
}

pub(crate) fn recipients(refused: Vec<RefusedRecipient>) -> Error {
    Error::new::<BoxError>(Kind::RecipientsRefused(refused), None, None)
}

pub(crate) fn tls<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Unclassified, None, Some(e))
}
