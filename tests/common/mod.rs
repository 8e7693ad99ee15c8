//! A scripted SMTP server listening on a random local port
#![allow(dead_code)]

use std::{
    io::{self, BufRead, BufReader, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use envoi::{SecurityMode, ServerConfig};

pub const SENDER: &str = "sender@example.com";

type RcptReply = dyn Fn(&str) -> String + Send + Sync;

/// Replies the server gives, positive by default
#[derive(Clone)]
pub struct Script {
    greeting: String,
    auth: String,
    mail: String,
    rcpt: Arc<RcptReply>,
    data: String,
    extensions: Vec<&'static str>,
    bogus_tls: bool,
    login_challenges: Option<usize>,
    hang_up_on: Option<&'static str>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: "220 mock.example.com ESMTP ready".to_owned(),
            auth: "235 2.7.0 Accepted".to_owned(),
            mail: "250 2.1.0 OK".to_owned(),
            rcpt: Arc::new(|_| "250 2.1.5 OK".to_owned()),
            data: "250 2.0.0 OK queued as 12345".to_owned(),
            extensions: vec!["AUTH PLAIN LOGIN", "8BITMIME", "SMTPUTF8"],
            bogus_tls: false,
            login_challenges: None,
            hang_up_on: None,
        }
    }
}

impl Script {
    pub fn greeting(mut self, reply: &str) -> Self {
        self.greeting = reply.to_owned();
        self
    }

    pub fn auth(mut self, reply: &str) -> Self {
        self.auth = reply.to_owned();
        self
    }

    pub fn mail(mut self, reply: &str) -> Self {
        self.mail = reply.to_owned();
        self
    }

    /// Refuses every recipient whose command contains `needle`
    pub fn refuse(mut self, needle: &'static str) -> Self {
        self.rcpt = Arc::new(move |command| {
            if command.contains(needle) {
                "550 5.1.1 No such user".to_owned()
            } else {
                "250 2.1.5 OK".to_owned()
            }
        });
        self
    }

    /// Extensions advertised in the `EHLO` reply
    pub fn extensions(mut self, extensions: &[&'static str]) -> Self {
        self.extensions = extensions.to_vec();
        self
    }

    /// Advertises `STARTTLS`, accepts it, then answers the handshake in clear text
    pub fn bogus_tls(mut self) -> Self {
        self.extensions.push("STARTTLS");
        self.bogus_tls = true;
        self
    }

    /// Offers `AUTH LOGIN` only and asks for the user name `challenges` times
    /// before giving the `auth` reply
    pub fn login_challenges(mut self, challenges: usize) -> Self {
        self.extensions = vec!["AUTH LOGIN", "8BITMIME"];
        self.login_challenges = Some(challenges);
        self
    }

    /// Closes the connection instead of answering the command starting with `verb`
    pub fn hang_up_on(mut self, verb: &'static str) -> Self {
        self.hang_up_on = Some(verb);
        self
    }
}

pub struct MockServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let server = MockServer {
            addr: listener.local_addr().unwrap(),
            commands: Arc::default(),
            messages: Arc::default(),
            connections: Arc::default(),
        };

        let commands = Arc::clone(&server.commands);
        let messages = Arc::clone(&server.messages);
        let connections = Arc::clone(&server.connections);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                connections.fetch_add(1, Ordering::SeqCst);
                let _ = serve(stream, &script, &commands, &messages);
            }
        });

        server
    }

    pub fn config(&self) -> ServerConfig {
        self.config_with(SecurityMode::Plain)
    }

    pub fn config_with(&self, security: SecurityMode) -> ServerConfig {
        ServerConfig::new(
            self.addr.ip().to_string(),
            self.addr.port(),
            security,
            SENDER,
            "secret",
        )
        .timeout(Duration::from_secs(5))
        .hello_name("client.example.com")
    }

    /// Commands received so far, without their line endings
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Message contents received after `DATA`
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// A port nothing listens on
pub fn closed_port_config() -> ServerConfig {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    ServerConfig::new("127.0.0.1", port, SecurityMode::Plain, SENDER, "secret")
        .timeout(Duration::from_secs(5))
}

fn serve(
    stream: TcpStream,
    script: &Script,
    commands: &Mutex<Vec<String>>,
    messages: &Mutex<Vec<String>>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    reply(&mut writer, &script.greeting)?;
    if !script.greeting.starts_with('2') {
        return Ok(());
    }

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_owned();
        commands.lock().unwrap().push(command.clone());

        if script
            .hang_up_on
            .is_some_and(|verb| command.starts_with(verb))
        {
            return writer.shutdown(Shutdown::Both);
        }

        let verb = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match verb.as_str() {
            "EHLO" => reply(&mut writer, &ehlo_reply(&script.extensions))?,
            "STARTTLS" if script.bogus_tls => {
                reply(&mut writer, "220 2.0.0 Ready to start TLS")?;
                reply(&mut writer, "this is not a TLS record")?;
                return writer.shutdown(Shutdown::Both);
            }
            "AUTH" => {
                // base64 of "Username:"
                for _ in 0..script.login_challenges.unwrap_or_default() {
                    reply(&mut writer, "334 VXNlcm5hbWU6")?;
                    line.clear();
                    if reader.read_line(&mut line)? == 0 {
                        return Ok(());
                    }
                }
                reply(&mut writer, &script.auth)?;
            }
            "MAIL" => reply(&mut writer, &script.mail)?,
            "RCPT" => reply(&mut writer, &(script.rcpt)(&command))?,
            "DATA" => {
                reply(&mut writer, "354 End data with <CR><LF>.<CR><LF>")?;
                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line)? == 0 {
                        return Ok(());
                    }
                    if line == ".\r\n" {
                        break;
                    }
                    content.push_str(&line);
                }
                messages.lock().unwrap().push(content);
                reply(&mut writer, &script.data)?;
            }
            "RSET" => reply(&mut writer, "250 2.0.0 OK")?,
            "QUIT" => {
                reply(&mut writer, "221 2.0.0 Bye")?;
                return Ok(());
            }
            _ => reply(&mut writer, "502 5.5.2 Command not recognized")?,
        }
    }
}

fn ehlo_reply(extensions: &[&str]) -> String {
    let mut lines = vec!["mock.example.com"];
    lines.extend_from_slice(extensions);

    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("250{}{line}", if i == last { ' ' } else { '-' }))
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn reply(writer: &mut TcpStream, reply: &str) -> io::Result<()> {
    writer.write_all(reply.as_bytes())?;
    writer.write_all(b"\r\n")?;
    writer.flush()
}
