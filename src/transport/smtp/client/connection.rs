use std::{
    fmt::Display,
    io::{self, BufRead, BufReader, Write},
    net::{Shutdown, ToSocketAddrs},
    time::Duration,
};

use super::{escape_crlf, ClientCodec, NetworkStream, TlsParameters};
use crate::transport::{
    error,
    smtp::{
        authentication::{Credentials, Mechanism},
        commands::{Auth, Ehlo, Helo, Quit, Starttls},
        extension::{ClientId, Extension, ServerInfo},
        response::{parse_response, Response},
    },
    Error,
};

/// Limit on server challenges during a single `AUTH` exchange
const MAX_CHALLENGES: usize = 10;

/// Structure that implements the SMTP client
pub struct SmtpConnection {
    /// TCP stream between client and server
    stream: BufReader<NetworkStream>,
    /// Whether QUIT has been sent
    sent_quit: bool,
    /// Whether the stream can no longer be trusted
    broken: bool,
    /// Information about the server
    server_info: ServerInfo,
}

impl SmtpConnection {
    /// Get information about the server
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Connects to the server and reads its greeting
    ///
    /// `EHLO` is left to the caller.
    pub fn connect<A: ToSocketAddrs>(
        server: A,
        timeout: Option<Duration>,
        tls_parameters: Option<&TlsParameters>,
    ) -> Result<SmtpConnection, Error> {
        let stream = NetworkStream::connect(server, timeout, tls_parameters)?;
        let mut conn = SmtpConnection {
            stream: BufReader::new(stream),
            sent_quit: false,
            broken: false,
            server_info: ServerInfo::default(),
        };
        conn.set_timeout(timeout).map_err(error::network)?;

        let greeting = conn.read_response()?;
        tracing::debug!("greeting: {}", greeting.summary());
        Ok(conn)
    }

    /// Send EHLO and update server info
    ///
    /// Falls back to `HELO` when the server rejects `EHLO`.
    pub fn ehlo(&mut self, hello_name: &ClientId) -> Result<(), Error> {
        let ehlo_response = self.exchange(Ehlo::new(hello_name.clone()))?;
        self.server_info = if ehlo_response.is_positive() {
            ServerInfo::from_response(&ehlo_response)?
        } else {
            let helo_response = self.command(Helo::new(hello_name.clone()))?;
            ServerInfo::without_extensions(&helo_response)
        };

        tracing::debug!("server {}", self.server_info);
        Ok(())
    }

    /// Upgrades the connection with `STARTTLS` and greets the server again
    pub fn starttls(
        &mut self,
        tls_parameters: &TlsParameters,
        hello_name: &ClientId,
    ) -> Result<(), Error> {
        if !self.server_info.supports_feature(Extension::StartTls) {
            return Err(error::client("STARTTLS is not supported on this server"));
        }

        self.command(Starttls)?;
        if let Err(err) = self.stream.get_mut().upgrade_tls(tls_parameters) {
            self.broken = true;
            return Err(err);
        }
        tracing::debug!("connection encrypted");
        // Send EHLO again
        self.ehlo(hello_name)
    }

    /// Sends QUIT
    pub fn quit(&mut self) -> Result<Response, Error> {
        self.sent_quit = true;
        self.command(Quit)
    }

    /// Says goodbye if still possible, then closes the socket
    pub fn close(&mut self) {
        // Only try to quit if we are not already broken
        if !self.sent_quit && !self.broken {
            let _ = self.quit();
        }

        let _ = self.stream.get_ref().shutdown(Shutdown::Both);
    }

    /// Tells if the underlying stream is currently encrypted
    pub fn is_encrypted(&self) -> bool {
        self.stream.get_ref().is_encrypted()
    }

    /// Set timeout
    pub fn set_timeout(&mut self, duration: Option<Duration>) -> io::Result<()> {
        self.stream.get_mut().set_read_timeout(duration)?;
        self.stream.get_mut().set_write_timeout(duration)
    }

    /// Sends an AUTH command with the given mechanism, and handles the challenge if needed
    pub fn auth(
        &mut self,
        mechanisms: &[Mechanism],
        credentials: &Credentials,
    ) -> Result<Response, Error> {
        let mechanism = self
            .server_info
            .get_auth_mechanism(mechanisms)
            .ok_or_else(|| {
                error::authentication("No compatible authentication mechanism was found")
            })?;

        // Limit challenges to avoid blocking
        let mut challenges = MAX_CHALLENGES;
        let mut response = self.secret_command(Auth::new(mechanism, credentials)?)?;

        while challenges > 0 && response.has_code(334) {
            challenges -= 1;
            response = self.secret_command(Auth::new_from_response(
                mechanism,
                credentials,
                &response,
            )?)?;
        }

        if response.has_code(334) {
            Err(error::response("Unexpected number of challenges"))
        } else {
            Ok(response)
        }
    }

    /// Sends the message content
    pub fn message(&mut self, message: &[u8]) -> Result<Response, Error> {
        let mut codec = ClientCodec::new();
        let mut out_buf = Vec::with_capacity(message.len());
        codec.encode(message, &mut out_buf);
        self.write(out_buf.as_slice())?;
        self.write(b"\r\n.\r\n")?;

        self.read_response()
    }

    /// Sends an SMTP command, negative replies become errors
    pub fn command<C: Display>(&mut self, command: C) -> Result<Response, Error> {
        self.write(command.to_string().as_bytes())?;
        self.read_response()
    }

    /// Same as `command`, without logging what is sent
    fn secret_command<C: Display>(&mut self, command: C) -> Result<Response, Error> {
        self.write_bytes(command.to_string().as_bytes())?;
        tracing::debug!("Wrote: <credentials>");
        self.read_response()
    }

    /// Sends an SMTP command and returns the reply whatever its code
    pub fn exchange<C: Display>(&mut self, command: C) -> Result<Response, Error> {
        self.write(command.to_string().as_bytes())?;
        self.read_reply()
    }

    /// Writes a string to the server
    fn write(&mut self, string: &[u8]) -> Result<(), Error> {
        self.write_bytes(string)?;

        if string.is_ascii() {
            tracing::debug!("Wrote: {}", escape_crlf(&String::from_utf8_lossy(string)));
        } else {
            tracing::debug!("Wrote: <{} bytes>", string.len());
        }
        Ok(())
    }

    fn write_bytes(&mut self, string: &[u8]) -> Result<(), Error> {
        if self.broken {
            return Err(error::client("connection is broken"));
        }

        let written = self
            .stream
            .get_mut()
            .write_all(string)
            .and_then(|()| self.stream.get_mut().flush());
        if let Err(err) = written {
            self.broken = true;
            return Err(error::network(err));
        }
        Ok(())
    }

    /// Gets the SMTP response, negative replies become errors
    pub fn read_response(&mut self) -> Result<Response, Error> {
        let response = self.read_reply()?;
        if response.is_positive() {
            Ok(response)
        } else {
            Err(negative(&response))
        }
    }

    fn read_reply(&mut self) -> Result<Response, Error> {
        let mut buffer = String::with_capacity(100);

        loop {
            let read = match self.stream.read_line(&mut buffer) {
                Ok(read) => read,
                Err(err) => {
                    self.broken = true;
                    return Err(error::network(err));
                }
            };
            if read == 0 {
                self.broken = true;
                return Err(error::disconnected("connection closed by server"));
            }

            tracing::debug!("<< {}", escape_crlf(&buffer));
            match parse_response(&buffer) {
                Ok((_remaining, response)) => return Ok(response),
                Err(nom::Err::Incomplete(_)) => { /* read more */ }
                Err(nom::Err::Failure(e) | nom::Err::Error(e)) => {
                    self.broken = true;
                    return Err(error::response(e.to_string()));
                }
            }
        }
    }
}

/// Turns a 4xx or 5xx reply into an error carrying its code
fn negative(response: &Response) -> Error {
    error::code(response.code(), response.text())
}
