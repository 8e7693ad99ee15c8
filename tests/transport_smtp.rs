mod common;

use envoi::{
    transport::{smtp::SmtpTransport, Kind},
    Message, SecurityMode, ServerConfig, Transport,
};
use pretty_assertions::assert_eq;

use crate::common::{closed_port_config, MockServer, Script, SENDER};

fn message() -> Message {
    Message::builder(SENDER)
        .to("alice@example.com")
        .cc("carol@example.com")
        .bcc("hidden@example.com")
        .subject("Status report")
        .body("All good.\r\n.\r\nStill good.")
        .build()
        .unwrap()
}

fn transport(server: &MockServer) -> SmtpTransport {
    SmtpTransport::new(&server.config()).unwrap()
}

#[test]
fn smtp_transport_simple() {
    let server = MockServer::start(Script::default());
    let message = message();

    let receipt = transport(&server).send(&message).unwrap();
    assert_eq!(receipt.message_id(), message.message_id());
    assert_eq!(receipt.reply(), "250 2.0.0 OK queued as 12345");
    assert!(receipt.refused().is_empty());

    let commands = server.commands();
    assert_eq!(commands[0], "EHLO client.example.com");
    // base64 of "\0sender@example.com\0secret"
    assert_eq!(commands[1], "AUTH PLAIN AHNlbmRlckBleGFtcGxlLmNvbQBzZWNyZXQ=");
    assert_eq!(
        &commands[2..7],
        [
            "MAIL FROM:<sender@example.com>",
            "RCPT TO:<alice@example.com>",
            "RCPT TO:<carol@example.com>",
            "RCPT TO:<hidden@example.com>",
            "DATA",
        ]
    );

    let messages = server.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("To: alice@example.com\r\n"));
    assert!(messages[0].contains("Cc: carol@example.com\r\n"));
    assert!(!messages[0].contains("hidden@example.com"));
    // the lone dot in the body is stuffed
    assert!(messages[0].contains("\r\n..\r\n"));
}

#[test]
fn smtp_transport_authentication_failure() {
    let server = MockServer::start(Script::default().auth("535 5.7.8 Authentication credentials invalid"));

    let err = transport(&server).send(&message()).unwrap_err();
    assert!(err.is_authentication());
    assert_eq!(err.status().map(u16::from), Some(535));
    assert!(!server.commands().iter().any(|c| c.starts_with("MAIL")));
    assert_eq!(server.connections(), 1);
}

#[test]
fn smtp_transport_sender_refused() {
    let server = MockServer::start(Script::default().mail("553 5.7.1 Sender address rejected"));

    let err = transport(&server).send(&message()).unwrap_err();
    assert!(err.is_sender_refused());
    assert!(server.messages().is_empty());
}

#[test]
fn smtp_transport_all_recipients_refused() {
    let server = MockServer::start(Script::default().refuse("@example.com"));

    let err = transport(&server).send(&message()).unwrap_err();
    let Kind::RecipientsRefused(refused) = err.kind() else {
        panic!("unexpected error {err:?}");
    };
    let addresses = refused
        .iter()
        .map(|recipient| recipient.address.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        addresses,
        ["alice@example.com", "carol@example.com", "hidden@example.com"]
    );
    assert_eq!(refused[0].code.map(u16::from), Some(550));

    let commands = server.commands();
    assert!(commands.iter().any(|c| c == "RSET"));
    assert!(!commands.iter().any(|c| c == "DATA"));
}

#[test]
fn smtp_transport_partial_refusal() {
    let server = MockServer::start(Script::default().refuse("carol@"));

    let receipt = transport(&server).send(&message()).unwrap();
    assert_eq!(receipt.refused().len(), 1);
    assert_eq!(receipt.refused()[0].address, "carol@example.com");
    assert_eq!(receipt.refused()[0].message, "5.1.1 No such user");
    assert_eq!(server.messages().len(), 1);
}

#[test]
fn smtp_transport_invalid_recipient_is_refused_locally() {
    let server = MockServer::start(Script::default());
    let message = Message::builder(SENDER)
        .to("not an address")
        .to("alice@example.com")
        .build()
        .unwrap();

    let receipt = transport(&server).send(&message).unwrap();
    assert_eq!(receipt.refused().len(), 1);
    assert_eq!(receipt.refused()[0].code, None);
    assert!(!server
        .commands()
        .iter()
        .any(|c| c.contains("not an address")));
}

#[test]
fn smtp_transport_server_hangs_up() {
    let server = MockServer::start(Script::default().hang_up_on("MAIL"));

    let err = transport(&server).send(&message()).unwrap_err();
    assert!(err.is_disconnected(), "unexpected error {err:?}");
}

#[test]
fn smtp_transport_negative_greeting() {
    let server = MockServer::start(Script::default().greeting("554 5.3.2 Service not available"));

    let err = transport(&server).send(&message()).unwrap_err();
    assert!(err.is_connect(), "unexpected error {err:?}");
}

#[test]
fn smtp_transport_connection_refused() {
    let transport = SmtpTransport::new(&closed_port_config()).unwrap();

    let err = transport.send(&message()).unwrap_err();
    assert!(err.is_connect(), "unexpected error {err:?}");
}

#[test]
fn smtp_transport_starttls_unsupported() {
    let server = MockServer::start(Script::default());
    let config = server.config();
    let config = ServerConfig::new(
        config.host(),
        config.port(),
        SecurityMode::StartTls,
        SENDER,
        "secret",
    );

    let err = SmtpTransport::new(&config)
        .unwrap()
        .send(&message())
        .unwrap_err();
    assert_eq!(err.kind(), &Kind::Unclassified);
    assert!(!server.commands().iter().any(|c| c.starts_with("AUTH")));
}

#[test]
fn smtp_transport_failed_tls_upgrade() {
    let server = MockServer::start(Script::default().bogus_tls());
    let transport = SmtpTransport::new(&server.config_with(SecurityMode::StartTls)).unwrap();

    let err = transport.send(&message()).unwrap_err();
    assert!(err.is_connect(), "unexpected error {err:?}");
    assert_eq!(
        server.commands(),
        ["EHLO client.example.com", "STARTTLS"]
    );
}

#[test]
fn smtp_transport_display_names_without_smtputf8() {
    let server = MockServer::start(Script::default().extensions(&["AUTH PLAIN", "8BITMIME"]));
    let message = Message::builder(SENDER)
        .to("Zoë <zoe@example.com>")
        .subject("Hei")
        .body("Hello")
        .build()
        .unwrap();

    transport(&server).send(&message).unwrap();
    let commands = server.commands();
    assert!(commands.contains(&"MAIL FROM:<sender@example.com>".to_owned()));
    assert!(commands.contains(&"RCPT TO:<zoe@example.com>".to_owned()));
}

#[test]
fn smtp_transport_login_with_ten_challenges() {
    let server = MockServer::start(Script::default().login_challenges(10));

    transport(&server).send(&message()).unwrap();
    assert_eq!(server.messages().len(), 1);
}

#[test]
fn smtp_transport_login_with_too_many_challenges() {
    let server = MockServer::start(Script::default().login_challenges(11));

    let err = transport(&server).send(&message()).unwrap_err();
    assert_eq!(err.kind(), &Kind::Unclassified);
    assert!(err.to_string().contains("Unexpected number of challenges"));
    assert!(server.messages().is_empty());
}
