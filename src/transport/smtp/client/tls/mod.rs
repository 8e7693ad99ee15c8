use std::fmt::{self, Debug};

use native_tls::TlsConnector;

use crate::transport::{error, Error};

/// Parameters to use for secure clients
///
/// Certificates are checked against the system trust store and must match
/// `domain`.
#[derive(Clone)]
pub struct TlsParameters {
    connector: TlsConnector,
    /// The domain name which is expected in the TLS certificate from the server
    domain: String,
}

impl TlsParameters {
    /// Creates a new `TlsParameters` using the system certificate store
    pub fn new(domain: String) -> Result<Self, Error> {
        let connector = TlsConnector::builder().build().map_err(error::tls)?;
        Ok(Self { connector, domain })
    }

    pub(super) fn connector(&self) -> &TlsConnector {
        &self.connector
    }

    /// The domain name which is expected in the TLS certificate from the server
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Debug for TlsParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsParameters")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}
