//! The stub transport logs message envelopes as well as contents. It can be useful for testing
//! purposes.
//!
//! Outcomes are scripted: each send pops the next scripted [`Kind`], and
//! succeeds once the script is exhausted.
//!
//! ```rust
//! use envoi::{
//!     transport::{stub::StubTransport, Kind},
//!     Message, Transport,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let message = Message::builder("nobody@domain.tld")
//!     .to("hei@domain.tld")
//!     .subject("Happy new year")
//!     .body("Be happy!")
//!     .build()?;
//!
//! let sender = StubTransport::new_ok()
//!     .then_succeed()
//!     .then_fail(Kind::AuthenticationFailure);
//! assert!(sender.send(&message).is_ok());
//! assert!(sender.send(&message).unwrap_err().is_authentication());
//! assert!(sender.send(&message).is_ok());
//! assert_eq!(sender.messages().len(), 3);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use crate::{
    address::Envelope,
    transport::{Delivery, Error, Kind, Transport},
};

/// This transport records message envelopes and contents, and returns scripted outcomes
#[derive(Debug, Clone, Default)]
pub struct StubTransport {
    script: Arc<Mutex<VecDeque<Option<Kind>>>>,
    message_log: Arc<Mutex<Vec<(Envelope, String)>>>,
    delay: Option<Duration>,
}

impl StubTransport {
    /// Creates a new transport that always succeeds
    pub fn new_ok() -> StubTransport {
        StubTransport::default()
    }

    /// Creates a new transport whose first send fails with `kind`
    pub fn new_error(kind: Kind) -> StubTransport {
        StubTransport::new_ok().then_fail(kind)
    }

    /// Appends a successful send to the script
    pub fn then_succeed(self) -> StubTransport {
        lock(&self.script).push_back(None);
        self
    }

    /// Appends a failed send to the script
    pub fn then_fail(self, kind: Kind) -> StubTransport {
        lock(&self.script).push_back(Some(kind));
        self
    }

    /// Makes every send block for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> StubTransport {
        self.delay = Some(delay);
        self
    }

    /// Return all logged messages sent using [`Transport::send_raw`]
    ///
    /// Failed sends are logged too.
    pub fn messages(&self) -> Vec<(Envelope, String)> {
        lock(&self.message_log).clone()
    }
}

impl Transport for StubTransport {
    fn send_raw(&self, envelope: &Envelope, email: &[u8]) -> Result<Delivery, Error> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        lock(&self.message_log).push((
            envelope.clone(),
            String::from_utf8_lossy(email).into_owned(),
        ));

        match lock(&self.script).pop_front().flatten() {
            Some(kind) => Err(kind.into()),
            None => Ok(Delivery {
                reply: "250 2.0.0 queued".to_owned(),
                refused: Vec::new(),
            }),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
