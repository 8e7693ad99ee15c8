//! SMTP commands

use std::fmt::{self, Display, Formatter};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    transport::{
        error,
        smtp::{
            authentication::{Credentials, Mechanism},
            extension::{ClientId, MailParameter},
            response::Response,
        },
        Error,
    },
    Address,
};

/// EHLO command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Ehlo {
    client_id: ClientId,
}

impl Display for Ehlo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EHLO {}\r\n", self.client_id)
    }
}

impl Ehlo {
    /// Creates a EHLO command
    pub fn new(client_id: ClientId) -> Ehlo {
        Ehlo { client_id }
    }
}

/// HELO command, for servers that do not speak ESMTP
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Helo {
    client_id: ClientId,
}

impl Display for Helo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HELO {}\r\n", self.client_id)
    }
}

impl Helo {
    /// Creates a HELO command
    pub fn new(client_id: ClientId) -> Helo {
        Helo { client_id }
    }
}

/// STARTTLS command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Starttls;

impl Display for Starttls {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("STARTTLS\r\n")
    }
}

/// MAIL command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Mail {
    sender: Address,
    parameters: Vec<MailParameter>,
}

impl Display for Mail {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MAIL FROM:<{}>", self.sender)?;
        for parameter in &self.parameters {
            write!(f, " {parameter}")?;
        }
        f.write_str("\r\n")
    }
}

impl Mail {
    /// Creates a MAIL command
    pub fn new(sender: Address, parameters: Vec<MailParameter>) -> Mail {
        Mail { sender, parameters }
    }
}

/// RCPT command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Rcpt {
    recipient: Address,
}

impl Display for Rcpt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RCPT TO:<{}>\r\n", self.recipient)
    }
}

impl Rcpt {
    /// Creates an RCPT command
    pub fn new(recipient: Address) -> Rcpt {
        Rcpt { recipient }
    }
}

/// DATA command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Data;

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("DATA\r\n")
    }
}

/// QUIT command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Quit;

impl Display for Quit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("QUIT\r\n")
    }
}

/// RSET command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Rset;

impl Display for Rset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("RSET\r\n")
    }
}

/// AUTH command
///
/// Also used for the follow-up lines answering a server challenge.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Auth {
    mechanism: Mechanism,
    response: Option<String>,
}

impl Display for Auth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let encoded_response = self.response.as_ref().map(|r| STANDARD.encode(r));

        match (self.mechanism.supports_initial_response(), encoded_response) {
            (true, Some(response)) => write!(f, "AUTH {} {response}", self.mechanism)?,
            (false, Some(response)) => f.write_str(&response)?,
            (_, None) => write!(f, "AUTH {}", self.mechanism)?,
        }
        f.write_str("\r\n")
    }
}

impl Auth {
    /// Creates the opening AUTH command
    pub fn new(mechanism: Mechanism, credentials: &Credentials) -> Result<Auth, Error> {
        let response = if mechanism.supports_initial_response() {
            Some(mechanism.response(credentials, None)?)
        } else {
            None
        };
        Ok(Auth {
            mechanism,
            response,
        })
    }

    /// Creates an AUTH command from a response that needs to be a
    /// valid challenge (with 334 response code)
    pub fn new_from_response(
        mechanism: Mechanism,
        credentials: &Credentials,
        response: &Response,
    ) -> Result<Auth, Error> {
        if !response.has_code(334) {
            return Err(error::response("Expecting a challenge"));
        }

        let encoded_challenge = response
            .first_word()
            .ok_or_else(|| error::response("Could not read auth challenge"))?;
        tracing::debug!("auth encoded challenge: {}", encoded_challenge);

        let decoded_base64 = STANDARD.decode(encoded_challenge).map_err(error::response)?;
        let decoded_challenge = String::from_utf8(decoded_base64).map_err(error::response)?;
        tracing::debug!("auth decoded challenge: {}", decoded_challenge);

        Ok(Auth {
            mechanism,
            response: Some(mechanism.response(credentials, Some(&decoded_challenge))?),
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Auth, Data, Ehlo, Helo, Mail, Quit, Rcpt, Rset, Starttls};
    use crate::{
        transport::smtp::{
            authentication::{Credentials, Mechanism},
            extension::{ClientId, MailBodyParameter, MailParameter},
            response::Response,
        },
        Address,
    };

    #[test]
    fn display() {
        let id = ClientId::Domain("localhost".to_owned());
        let email = "test@example.com".parse::<Address>().unwrap();

        assert_eq!(Ehlo::new(id.clone()).to_string(), "EHLO localhost\r\n");
        assert_eq!(Helo::new(id).to_string(), "HELO localhost\r\n");
        assert_eq!(
            Mail::new(email.clone(), vec![]).to_string(),
            "MAIL FROM:<test@example.com>\r\n"
        );
        assert_eq!(
            Mail::new(
                email.clone(),
                vec![
                    MailParameter::Body(MailBodyParameter::EightBitMime),
                    MailParameter::SmtpUtfEight,
                ],
            )
            .to_string(),
            "MAIL FROM:<test@example.com> BODY=8BITMIME SMTPUTF8\r\n"
        );
        assert_eq!(
            Rcpt::new(email).to_string(),
            "RCPT TO:<test@example.com>\r\n"
        );
        assert_eq!(Starttls.to_string(), "STARTTLS\r\n");
        assert_eq!(Quit.to_string(), "QUIT\r\n");
        assert_eq!(Data.to_string(), "DATA\r\n");
        assert_eq!(Rset.to_string(), "RSET\r\n");
    }

    #[test]
    fn auth_plain() {
        let credentials = Credentials::from(("user", "password"));
        assert_eq!(
            Auth::new(Mechanism::Plain, &credentials)
                .unwrap()
                .to_string(),
            "AUTH PLAIN AHVzZXIAcGFzc3dvcmQ=\r\n"
        );
    }

    #[test]
    fn auth_login_challenges() {
        let credentials = Credentials::from(("user", "password"));
        assert_eq!(
            Auth::new(Mechanism::Login, &credentials)
                .unwrap()
                .to_string(),
            "AUTH LOGIN\r\n"
        );

        // "Username:" then "Password:"
        let username = "334 VXNlcm5hbWU6\r\n".parse::<Response>().unwrap();
        assert_eq!(
            Auth::new_from_response(Mechanism::Login, &credentials, &username)
                .unwrap()
                .to_string(),
            "dXNlcg==\r\n"
        );
        let password = "334 UGFzc3dvcmQ6\r\n".parse::<Response>().unwrap();
        assert_eq!(
            Auth::new_from_response(Mechanism::Login, &credentials, &password)
                .unwrap()
                .to_string(),
            "cGFzc3dvcmQ=\r\n"
        );
    }

    #[test]
    fn auth_requires_challenge_code() {
        let credentials = Credentials::from(("user", "password"));
        let ok = "235 2.7.0 Accepted\r\n".parse::<Response>().unwrap();
        assert!(Auth::new_from_response(Mechanism::Login, &credentials, &ok).is_err());
    }
}
