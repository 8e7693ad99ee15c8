//! The SMTP transport submits messages to a relay server.
//!
//! This SMTP client follows [RFC 5321](https://tools.ietf.org/html/rfc5321).
//! It implements the following extensions:
//!
//! * 8BITMIME ([RFC 6152](https://tools.ietf.org/html/rfc6152))
//! * AUTH ([RFC 4954](http://tools.ietf.org/html/rfc4954)) with PLAIN and LOGIN mechanisms
//! * STARTTLS ([RFC 2487](http://tools.ietf.org/html/rfc2487))
//! * SMTPUTF8 ([RFC 6531](http://tools.ietf.org/html/rfc6531))
//!
//! Every send opens a fresh connection, authenticates, submits a single
//! message and closes the connection again, whatever the outcome. Nothing is
//! retried.
//!
//! ```rust,no_run
//! use envoi::{transport::smtp::SmtpTransport, Message, SecurityMode, ServerConfig, Transport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::new(
//!     "smtp.example.com",
//!     587,
//!     SecurityMode::StartTls,
//!     "user@example.com",
//!     "app-password",
//! );
//! let mailer = SmtpTransport::new(&config)?;
//!
//! let message = Message::builder("user@example.com")
//!     .to("hei@example.org")
//!     .subject("Happy new year")
//!     .body("Be happy!")
//!     .build()?;
//! let receipt = mailer.send(&message)?;
//! println!("sent {}", receipt.message_id());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use crate::{
    address::{Address, Envelope},
    config::{ConfigError, SecurityMode, ServerConfig},
    transport::{
        error::{self, Phase},
        Delivery, Error, RefusedRecipient, Transport,
    },
};

use self::{
    authentication::{Credentials, DEFAULT_MECHANISMS},
    client::{SmtpConnection, TlsParameters},
    commands::{Data, Mail, Rcpt, Rset},
    extension::{ClientId, Extension, MailBodyParameter, MailParameter, ServerInfo},
};

pub mod authentication;
pub mod client;
pub mod commands;
pub mod extension;
pub mod response;

/// Default smtp port
pub const SMTP_PORT: u16 = 25;
/// Default submission port
pub const SUBMISSION_PORT: u16 = 587;
/// Default submission over TLS port
///
/// Defined in [RFC8314](https://tools.ietf.org/html/rfc8314)
pub const SUBMISSIONS_PORT: u16 = 465;

/// Sends messages through a single SMTP submission account
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    server: String,
    port: u16,
    security: SecurityMode,
    credentials: Credentials,
    hello_name: ClientId,
    timeout: Duration,
}

impl SmtpTransport {
    /// Creates a transport from a validated configuration
    pub fn new(config: &ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            server: config.host().to_owned(),
            port: config.port(),
            security: config.security(),
            credentials: Credentials::new(
                config.username().to_owned(),
                config.password().to_owned(),
            ),
            hello_name: config
                .ehlo_name()
                .map(|name| ClientId::Domain(name.to_owned()))
                .unwrap_or_default(),
            timeout: config.io_timeout(),
        })
    }

    /// Server the transport connects to
    pub fn server(&self) -> (&str, u16) {
        (&self.server, self.port)
    }

    fn connection(&self) -> Result<SmtpConnection, Error> {
        let tls_parameters = match self.security {
            SecurityMode::Ssl => Some(TlsParameters::new(self.server.clone())?),
            SecurityMode::Plain | SecurityMode::StartTls => None,
        };

        SmtpConnection::connect(
            (self.server.as_str(), self.port),
            Some(self.timeout),
            tls_parameters.as_ref(),
        )
    }

    fn handshake(&self, conn: &mut SmtpConnection) -> Result<(), Error> {
        conn.ehlo(&self.hello_name)?;

        if self.security == SecurityMode::StartTls {
            let tls_parameters = TlsParameters::new(self.server.clone())?;
            conn.starttls(&tls_parameters, &self.hello_name)?;
        }

        Ok(())
    }

    /// Everything after the greeting, on an open connection
    fn submit(
        &self,
        conn: &mut SmtpConnection,
        envelope: &Envelope,
        email: &[u8],
    ) -> Result<Delivery, Error> {
        self.handshake(conn)
            .map_err(|err| err.in_phase(Phase::Handshake))?;

        conn.auth(DEFAULT_MECHANISMS, &self.credentials)
            .map_err(|err| err.in_phase(Phase::Auth))?;

        let sender = envelope
            .from()
            .parse::<Address>()
            .map_err(error::sender)?;
        let parameters = mail_parameters(conn.server_info(), &sender, envelope, email)?;
        conn.command(Mail::new(sender, parameters))
            .map_err(|err| err.in_phase(Phase::Sender))?;

        let refused = recipients(conn, envelope).map_err(|err| err.in_phase(Phase::Transfer))?;

        conn.command(Data)
            .and_then(|_| conn.message(email))
            .map(|response| Delivery {
                reply: response.summary(),
                refused,
            })
            .map_err(|err| err.in_phase(Phase::Transfer))
    }
}

impl Transport for SmtpTransport {
    fn send_raw(&self, envelope: &Envelope, email: &[u8]) -> Result<Delivery, Error> {
        let mut conn = self
            .connection()
            .map_err(|err| err.in_phase(Phase::Connect))?;

        let result = self.submit(&mut conn, envelope, email);
        conn.close();
        result
    }
}

/// `MAIL FROM` parameters needed for this envelope and content
///
/// Only the addresses count, display names never reach the envelope.
/// Recipients that do not parse are refused later without being sent.
fn mail_parameters(
    server_info: &ServerInfo,
    sender: &Address,
    envelope: &Envelope,
    email: &[u8],
) -> Result<Vec<MailParameter>, Error> {
    let mut parameters = Vec::new();

    let non_ascii_envelope = !sender.is_ascii()
        || envelope
            .to()
            .iter()
            .filter_map(|to| to.parse::<Address>().ok())
            .any(|to| !to.is_ascii());
    if non_ascii_envelope {
        if !server_info.supports_feature(Extension::SmtpUtfEight) {
            // don't try to send non-ascii addresses (per RFC)
            return Err(error::client(
                "Envelope contains non-ascii chars but server does not support SMTPUTF8",
            ));
        }
        parameters.push(MailParameter::SmtpUtfEight);
    }

    if !email.is_ascii() {
        if !server_info.supports_feature(Extension::EightBitMime) {
            return Err(error::client(
                "Message contains non-ascii chars but server does not support 8BITMIME",
            ));
        }
        parameters.push(MailParameter::Body(MailBodyParameter::EightBitMime));
    }

    Ok(parameters)
}

/// Sends `RCPT TO` for every envelope recipient
///
/// Refusals are collected; the transaction is reset and an error returned
/// only when nobody was accepted.
fn recipients(
    conn: &mut SmtpConnection,
    envelope: &Envelope,
) -> Result<Vec<RefusedRecipient>, Error> {
    let mut refused = Vec::new();
    let mut accepted = 0_usize;

    for to in envelope.to() {
        let address = match to.parse::<Address>() {
            Ok(address) => address,
            Err(err) => {
                refused.push(RefusedRecipient {
                    address: to.clone(),
                    code: None,
                    message: err.to_string(),
                });
                continue;
            }
        };

        let response = conn.exchange(Rcpt::new(address))?;
        if response.is_positive() {
            accepted += 1;
        } else {
            tracing::debug!("recipient {} refused: {}", to, response.summary());
            refused.push(RefusedRecipient {
                address: to.clone(),
                code: Some(response.code()),
                message: response.text(),
            });
        }
    }

    if accepted == 0 {
        let _ = conn.command(Rset);
        return Err(error::recipients(refused));
    }

    Ok(refused)
}
