//! ### Sending Messages
//!
//! Two transports are available:
//!
//! * [`SmtpTransport`](smtp::SmtpTransport) submits messages to a server over
//!   SMTP. Every call opens its own connection and closes it before
//!   returning.
//! * [`StubTransport`](stub::StubTransport) records what it is given and
//!   replays scripted outcomes, for tests.
//!
//! Failures are reported as an [`Error`] whose [`Kind`] is one of a closed set
//! of categories, so callers can match exhaustively.

use std::fmt::{self, Display, Formatter};

pub use self::error::{Error, Kind};
use crate::{transport::smtp::response::Code, Envelope, Message};

mod error;
pub mod smtp;
pub mod stub;

/// Placeholder used when a message carries no `Message-ID`
pub const NO_MESSAGE_ID: &str = "<no-message-id>";

/// Blocking Transport method for emails
pub trait Transport: Send + Sync {
    /// Sends the email
    fn send(&self, message: &Message) -> Result<MessageReceipt, Error> {
        let raw = message.formatted();
        let delivery = self.send_raw(message.envelope(), &raw)?;

        Ok(MessageReceipt {
            message_id: message
                .headers()
                .get("Message-ID")
                .filter(|id| !id.is_empty())
                .unwrap_or(NO_MESSAGE_ID)
                .to_owned(),
            reply: delivery.reply,
            refused: delivery.refused,
        })
    }

    /// Sends an already formatted message to the envelope recipients
    fn send_raw(&self, envelope: &Envelope, email: &[u8]) -> Result<Delivery, Error>;
}

/// What the server said about a raw submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Final reply line, after the message content
    pub reply: String,
    /// Recipients refused while others were accepted
    pub refused: Vec<RefusedRecipient>,
}

/// Proof that a message was accepted by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    message_id: String,
    reply: String,
    refused: Vec<RefusedRecipient>,
}

impl MessageReceipt {
    /// `Message-ID` of the sent message, or [`NO_MESSAGE_ID`]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Final server reply
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Recipients the server refused, the others received the message
    pub fn refused(&self) -> &[RefusedRecipient] {
        &self.refused
    }
}

/// A recipient the server would not accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefusedRecipient {
    /// Address as given in the envelope
    pub address: String,
    /// Reply code, `None` when the address was rejected before sending it
    pub code: Option<Code>,
    /// Reply text or local reason
    pub message: String,
}

impl Display for RefusedRecipient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({code} {})", self.address, self.message),
            None => write!(f, "{} ({})", self.address, self.message),
        }
    }
}
