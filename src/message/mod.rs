//! Building messages
//!
//! A [`Message`] is created from raw inputs with a [`MessageBuilder`]:
//!
//! ```rust
//! use envoi::Message;
//!
//! # use std::error::Error;
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let message = Message::builder("NoBody <nobody@domain.tld>")
//!     .to("Hei <hei@domain.tld>")
//!     .bcc(" audit@domain.tld ")
//!     .reply_to("Yuin <yuin@domain.tld>")
//!     .subject("Happy new year")
//!     .body("Be happy!")
//!     .build()?;
//!
//! assert_eq!(message.envelope().to(), ["Hei <hei@domain.tld>", "audit@domain.tld"]);
//! assert!(!message.headers().contains("Bcc"));
//! # Ok(())
//! # }
//! ```
//!
//! With [`html`](MessageBuilder::html) set, the body is sent twice in a
//! `multipart/alternative`: as `text/plain` for clients that cannot render
//! markup, then as `text/html`. Attachments wrap everything in a
//! `multipart/mixed`. An attachment that cannot be read is skipped and
//! reported through [`Message::warnings`].

use std::{
    io::Write,
    path::PathBuf,
    time::SystemTime,
};

use uuid::Uuid;

pub use self::{
    attachment::{guess_content_type, Attachment, AttachmentWarning, WarningReason},
    body::{Body, ContentTransferEncoding},
    header::{HeaderValue, Headers},
    mimebody::{MultiPart, MultiPartKind, Part, SinglePart},
};
use crate::{address::normalize, error::ValidationError, Envelope};

mod attachment;
mod body;
pub mod header;
mod mimebody;

/// Host used in generated `Message-ID`s when the local name is unknown
const DEFAULT_MESSAGE_ID_DOMAIN: &str = "localhost";

/// Collects the inputs of a message
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    reply_to: Option<String>,
    subject: String,
    body: String,
    html: bool,
    attachments: Vec<PathBuf>,
    date: Option<SystemTime>,
    message_id: Option<String>,
}

impl MessageBuilder {
    /// Starts a message sent by `from`
    pub fn new<S: Into<String>>(from: S) -> Self {
        Self {
            from: from.into().trim().to_owned(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: None,
            subject: String::new(),
            body: String::new(),
            html: false,
            attachments: Vec::new(),
            date: None,
            message_id: None,
        }
    }

    /// Adds a `To` recipient
    pub fn to<S: Into<String>>(mut self, mbox: S) -> Self {
        self.to.push(mbox.into());
        self
    }

    /// Adds a `Cc` recipient
    pub fn cc<S: Into<String>>(mut self, mbox: S) -> Self {
        self.cc.push(mbox.into());
        self
    }

    /// Adds a `Bcc` recipient, only ever used in the envelope
    pub fn bcc<S: Into<String>>(mut self, mbox: S) -> Self {
        self.bcc.push(mbox.into());
        self
    }

    /// Sets the `Reply-To` address
    pub fn reply_to<S: Into<String>>(mut self, mbox: S) -> Self {
        self.reply_to = Some(mbox.into());
        self
    }

    /// Sets the subject, empty by default
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

    /// Overrides the `Date` header, the current time by default
    pub fn date(mut self, date: SystemTime) -> Self {
        self.date = Some(date);
        self
    }

    /// Overrides the generated `Message-ID`
    pub fn message_id<S: Into<String>>(mut self, id: S) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Builds the message
    ///
    /// Fails if To, Cc and Bcc are all empty once trimmed. Unreadable
    /// attachments do not fail the build.
    pub fn build(self) -> Result<Message, ValidationError> {
        let to = normalize(&self.to);
        let cc = normalize(&self.cc);
        let bcc = normalize(&self.bcc);

        if to.is_empty() && cc.is_empty() && bcc.is_empty() {
            return Err(ValidationError::NoRecipients);
        }

        let message_id = self.message_id.unwrap_or_else(generate_message_id);

        let mut headers = Headers::new();
        headers.set(HeaderValue::date(self.date.unwrap_or_else(SystemTime::now)));
        headers.set(HeaderValue::mailboxes("From", [&self.from]));
        // a Bcc-only message is addressed to its sender
        if to.is_empty() {
            headers.set(HeaderValue::mailboxes("To", [&self.from]));
        } else {
            headers.set(HeaderValue::mailboxes("To", &to));
        }
        if !cc.is_empty() {
            headers.set(HeaderValue::mailboxes("Cc", &cc));
        }
        if let Some(reply_to) = self.reply_to.as_deref().map(str::trim) {
            if !reply_to.is_empty() {
                headers.set(HeaderValue::mailboxes("Reply-To", [reply_to]));
            }
        }
        headers.set(HeaderValue::text("Subject", &self.subject));
        headers.set(HeaderValue::raw("Message-ID", message_id.clone()));
        headers.set(HeaderValue::raw("MIME-Version", "1.0"));

        let content = if self.html {
            Part::Multi(
                MultiPart::new(MultiPartKind::Alternative)
                    .singlepart(SinglePart::plain(self.body.clone()))
                    .singlepart(SinglePart::html(self.body)),
            )
        } else {
            Part::Single(SinglePart::plain(self.body))
        };

        let mut warnings = Vec::new();
        let mut attachments = Vec::new();
        for path in &self.attachments {
            match Attachment::from_path(path) {
                Ok(attachment) => attachments.push(SinglePart::attachment(&attachment)),
                Err(warning) => {
                    tracing::warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }

        let body = if attachments.is_empty() {
            content
        } else {
            let mixed = attachments.into_iter().fold(
                MultiPart::new(MultiPartKind::Mixed).part(content),
                MultiPart::singlepart,
            );
            Part::Multi(mixed)
        };

        for header in body.headers().iter() {
            headers.set(header.clone());
        }

        let envelope = Envelope::from_recipients(&self.from, &to, &cc, &bcc);

        Ok(Message {
            headers,
            body,
            envelope,
            message_id,
            subject: self.subject,
            to,
            cc,
            bcc,
            warnings,
        })
    }
}

fn generate_message_id() -> String {
    #[cfg(feature = "hostname")]
    let hostname = hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_MESSAGE_ID_DOMAIN.to_owned());
    #[cfg(not(feature = "hostname"))]
    let hostname = DEFAULT_MESSAGE_ID_DOMAIN.to_owned();

    // https://tools.ietf.org/html/rfc5322#section-3.6.4
    format!("<{}@{}>", Uuid::new_v4(), hostname)
}

/// A built, immutable message
#[derive(Debug)]
pub struct Message {
    headers: Headers,
    body: Part,
    envelope: Envelope,
    message_id: String,
    subject: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    warnings: Vec<AttachmentWarning>,
}

impl Message {
    /// Create a new message builder
    pub fn builder<S: Into<String>>(from: S) -> MessageBuilder {
        MessageBuilder::new(from)
    }

    /// Top level headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Addresses used for delivery, including Bcc
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Value of the `Message-ID` header
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Subject as given, before encoding
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Normalized `To` recipients
    pub fn to(&self) -> &[String] {
        &self.to
    }

    /// Normalized `Cc` recipients
    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    /// Normalized `Bcc` recipients
    pub fn bcc(&self) -> &[String] {
        &self.bcc
    }

    /// Attachments that were skipped while building
    pub fn warnings(&self) -> &[AttachmentWarning] {
        &self.warnings
    }

    /// The message body, as a MIME tree
    pub fn body(&self) -> &Part {
        &self.body
    }

    /// Get message content formatted for SMTP
    pub fn formatted(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write!(out, "{}", self.headers)
            .expect("A Write implementation panicked while formatting headers");
        out.extend_from_slice(b"\r\n");
        self.body.format_body(&mut out);
        out
    }
}
