//! SMTP client
//!
//! `SmtpConnection` allows manually sending SMTP commands.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use envoi::transport::smtp::{
//!     client::SmtpConnection, commands::*, extension::ClientId, SUBMISSION_PORT,
//! };
//!
//! # fn main() -> Result<(), envoi::transport::Error> {
//! let hello = ClientId::Domain("my_hostname".to_owned());
//! let mut client = SmtpConnection::connect(
//!     ("localhost", SUBMISSION_PORT),
//!     Some(Duration::from_secs(30)),
//!     None,
//! )?;
//! client.ehlo(&hello)?;
//! client.command(Mail::new("user@example.com".parse().unwrap(), vec![]))?;
//! client.command(Rcpt::new("user@example.org".parse().unwrap()))?;
//! client.command(Data)?;
//! client.message("Test email".as_bytes())?;
//! client.quit()?;
//! # Ok(())
//! # }
//! ```

pub use self::{connection::SmtpConnection, net::NetworkStream, tls::TlsParameters};

mod connection;
mod net;
mod tls;

/// The codec used for transparency
#[derive(Debug, Default)]
struct ClientCodec {
    status: CodecStatus,
}

impl ClientCodec {
    /// Creates a new client codec
    fn new() -> Self {
        Self::default()
    }

    /// Adds transparency
    fn encode(&mut self, frame: &[u8], buf: &mut Vec<u8>) {
        for &b in frame {
            buf.push(b);
            match (b, self.status) {
                (b'\r', _) => {
                    self.status = CodecStatus::ReceivedCr;
                }
                (b'\n', CodecStatus::ReceivedCr) => {
                    self.status = CodecStatus::ReceivedCrLf;
                }
                (b'.', CodecStatus::ReceivedCrLf) => {
                    buf.push(b'.');
                    self.status = CodecStatus::None;
                }
                _ => {
                    self.status = CodecStatus::None;
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
enum CodecStatus {
    /// Normal status
    None,
    /// Status after we received `\r`
    ReceivedCr,
    /// Status after we received `\r\n`, or before the first byte
    #[default]
    ReceivedCrLf,
}

/// Returns the string replacing all the CRLF with "\<CRLF\>"
/// Used for debug displays
fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}
