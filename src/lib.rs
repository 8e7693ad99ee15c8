//! envoi composes email messages, delivers them over SMTP and schedules
//! deliveries for later.
//!
//! The crate is organised around four pieces:
//!
//! * [`MessageBuilder`] turns raw recipient lists, a subject, a body and
//!   attachment paths into an immutable [`Message`].
//! * [`SmtpTransport`](transport::smtp::SmtpTransport) opens a plain,
//!   STARTTLS or implicit TLS session, authenticates and submits the message,
//!   classifying every failure into a closed [`transport::Kind`].
//! * [`SchedulerEngine`](schedule::SchedulerEngine) fires jobs for one-shot,
//!   daily and weekday [`ScheduleSpec`]s on a background clock thread.
//! * [`DispatchCoordinator`] ties the three together: it validates a
//!   [`DispatchRequest`], sends immediately on a worker thread or registers
//!   scheduled jobs, and reports every outcome through a [`StatusSink`].
//!
//! ## Sending a message right away
//!
//! ```rust,no_run
//! use envoi::{DispatchCoordinator, DispatchOutcome, DispatchRequest, ServerConfig, Status};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! let coordinator =
//!     DispatchCoordinator::from_config(&config, |status: Status| println!("{status}"))?;
//!
//! let request = DispatchRequest::new()
//!     .to("alice@example.com; bob@example.com")
//!     .bcc("audit@example.com")
//!     .subject("Quarterly report")
//!     .body("Please find the report attached.")
//!     .attachment("report.pdf");
//!
//! if let DispatchOutcome::Sending(handle) = coordinator.dispatch(request)? {
//!     let receipt = handle.join()?;
//!     println!("delivered {}", receipt.message_id());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Scheduling
//!
//! ```rust,no_run
//! use envoi::{
//!     DispatchCoordinator, DispatchRequest, ScheduleSpec, ServerConfig, Status, TimeOfDay,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! let coordinator =
//!     DispatchCoordinator::from_config(&config, |status: Status| println!("{status}"))?;
//!
//! let at_nine = TimeOfDay::new(9, 0)?;
//! let request = DispatchRequest::new()
//!     .to("team@example.com")
//!     .subject("Stand-up")
//!     .body("Stand-up starts in five minutes.")
//!     .schedule(ScheduleSpec::Daily(at_nine))
//!     .schedule(ScheduleSpec::Weekday(at_nine));
//!
//! let outcome = coordinator.dispatch(request)?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/envoi/0.1.0")]
#![forbid(unsafe_code)]
#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    clippy::string_add,
    clippy::string_add_assign,
    clippy::clone_on_ref_ptr,
    clippy::verbose_file_reads,
    clippy::unnecessary_self_imports,
    clippy::string_to_string,
    clippy::mem_forget,
    clippy::cast_lossless,
    clippy::inefficient_to_string,
    clippy::inline_always,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::manual_assert,
    clippy::unnecessary_join,
    clippy::wildcard_imports,
    clippy::zero_sized_map_values
)]

pub mod address;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod schedule;
pub mod transport;

pub use crate::{
    address::{Address, Envelope},
    config::{SecurityMode, ServerConfig},
    dispatch::{
        DispatchCoordinator, DispatchOutcome, DispatchRequest, SendHandle, Status, StatusSink,
    },
    error::{Error, ValidationError},
    message::{Message, MessageBuilder},
    schedule::{JobId, ScheduleSpec, SchedulerEngine, TimeOfDay},
    transport::{MessageReceipt, Transport},
};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
