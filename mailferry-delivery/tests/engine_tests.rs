//! Delivery engine integration tests against scripted SMTP servers.

mod support;

use std::sync::Arc;

use mailferry_auth::Authenticator;
use mailferry_common::message::Message;
use mailferry_delivery::{DeliveryConfig, DeliveryEngine, FailureKind, MxResolver};
use mailferry_dns::{MxRecord, ResolveError};

use support::{
    StaticMxResolver,
    mock_server::{MockCommand, MockSmtpServer},
};

fn test_message() -> Message {
    Message::new(
        "sender@example.com".parse().unwrap(),
        "rcpt@example.org".parse().unwrap(),
        "Greetings",
        "first line\r\nsecond line",
    )
}

fn test_engine(resolver: Arc<dyn MxResolver>) -> DeliveryEngine {
    let dir = tempfile::tempdir().unwrap();
    let authenticator = Authenticator::new("example.com", "mail", dir.path()).unwrap();

    let config = DeliveryConfig {
        connect_timeout_secs: 5,
        command_timeout_secs: 5,
        ..DeliveryConfig::default()
    };

    DeliveryEngine::new(config, resolver, Arc::new(authenticator))
}

fn record_for(server: &MockSmtpServer, preference: u16) -> MxRecord {
    MxRecord::new("127.0.0.1", preference).with_port(server.addr().port())
}

#[tokio::test]
async fn delivers_through_the_full_dialogue() {
    let server = MockSmtpServer::start().await;
    let resolver = StaticMxResolver::with_records(vec![record_for(&server, 10)]);
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;

    assert!(report.success, "{}", report.message);
    assert_eq!(report.server.as_deref(), Some("127.0.0.1"));
    assert!(report.message_id.is_some());

    let commands = server.commands().await;
    assert!(matches!(commands[0], MockCommand::Ehlo(_)));
    assert!(commands.contains(&MockCommand::MailFrom("<sender@example.com>".to_string())));
    assert!(commands.contains(&MockCommand::RcptTo("<rcpt@example.org>".to_string())));
    assert!(commands.contains(&MockCommand::Data));
    assert!(commands.contains(&MockCommand::Quit));

    let message = server.received_message().await.unwrap();
    let text = String::from_utf8(message).unwrap();
    assert!(text.contains("Subject: Greetings"));
    assert!(text.contains("first line\r\nsecond line"));
}

#[tokio::test]
async fn lower_preference_exchange_is_attempted_first() {
    let secondary = MockSmtpServer::start().await;
    let primary = MockSmtpServer::start().await;

    // Handed over unsorted: [(10, secondary), (5, primary)].
    let resolver = StaticMxResolver::with_records(vec![
        record_for(&secondary, 10),
        record_for(&primary, 5),
    ]);
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;
    assert!(report.success, "{}", report.message);

    assert!(
        !primary.commands().await.is_empty(),
        "preference 5 exchange must be attempted first"
    );
    assert!(
        secondary.commands().await.is_empty(),
        "preference 10 exchange must not be contacted after a success"
    );
}

#[tokio::test]
async fn connect_failure_falls_over_to_the_next_exchange() {
    // A port with nothing listening: bind, take the address, drop.
    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    };

    let live = MockSmtpServer::start().await;
    let resolver = StaticMxResolver::with_records(vec![
        MxRecord::new("127.0.0.1", 5).with_port(dead_port),
        record_for(&live, 10),
    ]);
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;

    assert!(report.success, "{}", report.message);
    assert!(!live.commands().await.is_empty());
}

#[tokio::test]
async fn permanent_rejection_is_classified_with_the_status_code() {
    let server = MockSmtpServer::builder()
        .with_rcpt_to_response(550, "user unknown")
        .build()
        .await;
    let resolver = StaticMxResolver::with_records(vec![record_for(&server, 10)]);
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Protocol));
    assert!(report.permanent, "a 550 rejection must read as permanent");
    assert!(report.message.contains("550"));
    assert!(report.message.contains("RCPT TO"));
}

#[tokio::test]
async fn temporary_rejection_is_not_permanent() {
    let server = MockSmtpServer::builder()
        .with_mail_from_response(451, "try again later")
        .build()
        .await;
    let resolver = StaticMxResolver::with_records(vec![record_for(&server, 10)]);
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Protocol));
    assert!(!report.permanent, "a 451 rejection is worth retrying");
}

#[tokio::test]
async fn resolution_failure_reports_no_mail_server() {
    let resolver =
        StaticMxResolver::failing_with(ResolveError::NoRecords("example.org".to_string()));
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::NoMailServer));
    assert!(report.server.is_none());
}

#[tokio::test]
async fn all_exchanges_failing_reports_the_last_error() {
    let first = MockSmtpServer::builder()
        .with_mail_from_response(421, "busy")
        .build()
        .await;
    let second = MockSmtpServer::builder()
        .with_mail_from_response(550, "policy rejection")
        .build()
        .await;

    let resolver = StaticMxResolver::with_records(vec![
        record_for(&first, 5),
        record_for(&second, 10),
    ]);
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;

    assert!(!report.success);
    // Both were tried; the retained error is the second (last) one.
    assert!(!first.commands().await.is_empty());
    assert!(!second.commands().await.is_empty());
    assert!(report.message.contains("550"));
    assert!(report.permanent);
}

#[tokio::test]
async fn ehlo_failure_falls_back_to_helo() {
    let server = MockSmtpServer::builder().with_ehlo_failure(502).build().await;
    let resolver = StaticMxResolver::with_records(vec![record_for(&server, 10)]);
    let engine = test_engine(Arc::new(resolver));

    let report = engine.send(&test_message()).await;

    assert!(report.success, "{}", report.message);
    let commands = server.commands().await;
    assert!(commands.iter().any(|c| matches!(c, MockCommand::Helo(_))));
}

#[tokio::test]
async fn dot_lines_are_stuffed_on_the_wire() {
    let server = MockSmtpServer::start().await;
    let resolver = StaticMxResolver::with_records(vec![record_for(&server, 10)]);
    let engine = test_engine(Arc::new(resolver));

    let mut message = test_message();
    message.body = "before\r\n.hidden\r\nafter".to_string();

    let report = engine.send(&message).await;
    assert!(report.success, "{}", report.message);

    // The mock records the DATA content verbatim, stuffing included.
    let wire = server.received_message().await.unwrap();
    let text = String::from_utf8(wire).unwrap();
    assert!(
        text.contains("\r\n..hidden\r\n"),
        "a body line starting with a dot must be transmitted stuffed"
    );
}

#[tokio::test]
async fn overall_budget_bounds_the_whole_delivery() {
    // An exchange that greets and then never answers EHLO would hold the
    // dialogue until the per-step timeout; a one-second budget cuts the
    // delivery off first.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let _ = stream.write_all(b"220 slow server\r\n").await;
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let authenticator = Authenticator::new("example.com", "mail", dir.path()).unwrap();
    let resolver =
        StaticMxResolver::with_records(vec![MxRecord::new("127.0.0.1", 5).with_port(port)]);
    let engine = DeliveryEngine::new(
        DeliveryConfig {
            overall_budget_secs: Some(1),
            ..DeliveryConfig::default()
        },
        Arc::new(resolver),
        Arc::new(authenticator),
    );

    let report = engine.send(&test_message()).await;

    assert!(!report.success);
    assert_eq!(report.failure, Some(FailureKind::Connect));
    assert!(report.message.contains("budget"));
}
