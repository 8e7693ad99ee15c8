mod common;

use std::{
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use envoi::{
    dispatch::FailureReport,
    schedule::{JobState, ManualClock},
    transport::{self, stub::StubTransport, Delivery, Kind, Transport},
    DispatchCoordinator, DispatchOutcome, DispatchRequest, Envelope, ScheduleSpec, SecurityMode,
    Status, TimeOfDay, ValidationError,
};
use pretty_assertions::assert_eq;

use crate::common::{MockServer, Script};

const SENDER: &str = "me@example.com";
const TICK: Duration = Duration::from_millis(5);
const PATIENCE: Duration = Duration::from_secs(5);

/// Monday 19 October 2026, 08:00
fn monday_morning() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn coordinator(
    transport: &StubTransport,
    clock: &ManualClock,
) -> (DispatchCoordinator<StubTransport>, Receiver<Status>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (tx, rx) = mpsc::channel();
    let coordinator =
        DispatchCoordinator::with_clock(transport.clone(), SENDER, tx, clock.clone(), TICK);
    (coordinator, rx)
}

fn request() -> DispatchRequest {
    DispatchRequest::new()
        .to("alice@example.com; bob@example.com")
        .cc("carol@example.com")
        .bcc("hidden@example.com")
        .subject("Weekly report")
        .body("Numbers are up.")
}

fn send_now(
    coordinator: &DispatchCoordinator<StubTransport>,
    request: DispatchRequest,
) -> Result<envoi::MessageReceipt, envoi::Error> {
    match coordinator.dispatch(request).unwrap() {
        DispatchOutcome::Sending(handle) => handle.join(),
        DispatchOutcome::Scheduled(jobs) => panic!("unexpectedly scheduled {jobs:?}"),
    }
}

#[test]
fn immediate_send() {
    let transport = StubTransport::new_ok();
    let (coordinator, rx) = coordinator(&transport, &ManualClock::new(monday_morning()));

    let receipt = send_now(&coordinator, request()).unwrap();

    let statuses = rx.try_iter().collect::<Vec<_>>();
    assert_eq!(statuses, [Status::Sending, Status::Sent(receipt.clone())]);

    let messages = transport.messages();
    assert_eq!(messages.len(), 1);
    let (envelope, content) = &messages[0];
    assert_eq!(envelope.from(), SENDER);
    assert_eq!(
        envelope.to(),
        [
            "alice@example.com",
            "bob@example.com",
            "carol@example.com",
            "hidden@example.com"
        ]
    );
    assert!(!content.contains("hidden@example.com"));
    assert!(content.contains(&format!("Message-ID: {}", receipt.message_id())));
}

#[test]
fn explicit_immediate_schedule_sends_now() {
    let transport = StubTransport::new_ok();
    let (coordinator, _rx) = coordinator(&transport, &ManualClock::new(monday_morning()));

    send_now(&coordinator, request().schedule(ScheduleSpec::Immediate)).unwrap();
    assert_eq!(transport.messages().len(), 1);
    assert!(coordinator.jobs().is_empty());
}

#[test]
fn bcc_only_is_addressed_to_the_sender() {
    let transport = StubTransport::new_ok();
    let (coordinator, _rx) = coordinator(&transport, &ManualClock::new(monday_morning()));

    send_now(&coordinator, DispatchRequest::new().bcc("hidden@example.com")).unwrap();

    let (envelope, content) = &transport.messages()[0];
    assert_eq!(envelope.to(), ["hidden@example.com"]);
    assert!(content.contains(&format!("To: {SENDER}\r\n")));
}

#[test]
fn authentication_failure_is_reported_once() {
    let transport = StubTransport::new_error(Kind::AuthenticationFailure);
    let (coordinator, rx) = coordinator(&transport, &ManualClock::new(monday_morning()));

    let err = send_now(&coordinator, request()).unwrap_err();
    assert!(err.as_transport().unwrap().is_authentication());

    let statuses = rx.try_iter().collect::<Vec<_>>();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0], Status::Sending);
    let Status::Failed(report) = &statuses[1] else {
        panic!("unexpected status {:?}", statuses[1]);
    };
    assert_eq!(report.kind(), Some(&Kind::AuthenticationFailure));

    // never retried
    assert_eq!(transport.messages().len(), 1);
}

#[test]
fn failed_tls_upgrade_is_reported_once() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let server = MockServer::start(Script::default().bogus_tls());
    let (tx, rx) = mpsc::channel();
    let coordinator =
        DispatchCoordinator::from_config(&server.config_with(SecurityMode::StartTls), tx).unwrap();

    let DispatchOutcome::Sending(handle) = coordinator.dispatch(request()).unwrap() else {
        panic!("expected an immediate send");
    };
    let err = handle.join().unwrap_err();
    assert!(err.as_transport().unwrap().is_connect(), "unexpected error {err:?}");

    let statuses = rx.try_iter().collect::<Vec<_>>();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0], Status::Sending);
    let Status::Failed(report) = &statuses[1] else {
        panic!("unexpected status {:?}", statuses[1]);
    };
    assert_eq!(report.kind(), Some(&Kind::Connect));
}

struct PanickingTransport;

impl Transport for PanickingTransport {
    fn send_raw(&self, _: &Envelope, _: &[u8]) -> Result<Delivery, transport::Error> {
        panic!("transport bug");
    }
}

#[test]
fn panicking_transport_is_reported_once() {
    let (tx, rx) = mpsc::channel();
    let coordinator = DispatchCoordinator::new(PanickingTransport, SENDER, tx);

    let DispatchOutcome::Sending(handle) = coordinator.dispatch(request()).unwrap() else {
        panic!("expected an immediate send");
    };
    let err = handle.join().unwrap_err();
    assert_eq!(err.as_transport().unwrap().kind(), &Kind::Unclassified);

    let statuses = rx.try_iter().collect::<Vec<_>>();
    assert_eq!(statuses.len(), 2);
    assert!(matches!(statuses[1], Status::Failed(_)));
}

#[test]
fn skipped_attachment_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.pdf");
    let transport = StubTransport::new_ok();
    let (coordinator, rx) = coordinator(&transport, &ManualClock::new(monday_morning()));

    send_now(&coordinator, request().attachment(&missing)).unwrap();

    let statuses = rx.try_iter().collect::<Vec<_>>();
    assert_eq!(statuses.len(), 3);
    let Status::AttachmentSkipped(warning) = &statuses[1] else {
        panic!("unexpected status {:?}", statuses[1]);
    };
    assert!(warning.contains("missing.pdf"));
    assert!(matches!(statuses[2], Status::Sent(_)));
}

#[test]
fn invalid_requests_have_no_side_effects() {
    let transport = StubTransport::new_ok();
    let (coordinator, rx) = coordinator(&transport, &ManualClock::new(monday_morning()));
    let nine = TimeOfDay::new(9, 0).unwrap();

    let cases = [
        (
            DispatchRequest::new().to(" ; ").cc(",").body("nobody"),
            ValidationError::NoRecipients,
        ),
        (request().schedule_once(None), ValidationError::ScheduleTimeMissing),
        (request().scheduled(), ValidationError::NoScheduleSelected),
        (
            request()
                .schedule(ScheduleSpec::Immediate)
                .schedule(ScheduleSpec::Daily(nine)),
            ValidationError::ImmediateCombined,
        ),
        (
            request()
                .schedule(ScheduleSpec::Daily(nine))
                .schedule_once(Some(monday_morning() - TimeDelta::minutes(5))),
            ValidationError::TimeNotInFuture,
        ),
    ];

    for (request, expected) in cases {
        let err = coordinator.dispatch(request).unwrap_err();
        assert_eq!(err.as_validation(), Some(&expected));
    }

    assert!(rx.try_iter().next().is_none());
    assert!(transport.messages().is_empty());
    assert!(coordinator.jobs().is_empty());
}

#[test]
fn scheduled_fan_out() {
    let clock = ManualClock::new(monday_morning());
    let transport = StubTransport::new_error(Kind::Connect);
    let (coordinator, rx) = coordinator(&transport, &clock);
    let nine = TimeOfDay::new(9, 0).unwrap();

    let outcome = coordinator
        .dispatch(
            request()
                .schedule(ScheduleSpec::Daily(nine))
                .schedule(ScheduleSpec::Weekday(nine)),
        )
        .unwrap();
    assert_eq!(
        outcome.to_string(),
        "Email scheduled: daily 09:00, weekdays 09:00"
    );
    let DispatchOutcome::Scheduled(jobs) = outcome else {
        panic!("expected scheduled jobs");
    };
    assert_eq!(jobs.len(), 2);
    assert_ne!(jobs[0].id(), jobs[1].id());
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), Status::Scheduled(jobs.clone()));
    assert!(transport.messages().is_empty());

    clock.advance(TimeDelta::hours(1));

    let mut sent = Vec::new();
    let mut failed = Vec::new();
    let mut fired = 0;
    while sent.len() + failed.len() < 2 {
        match rx.recv_timeout(PATIENCE).unwrap() {
            Status::JobFired(_) => fired += 1,
            Status::JobSent(job, _) => sent.push(job.id()),
            Status::JobFailed(job, report) => failed.push((job.id(), report)),
            other => panic!("unexpected status {other:?}"),
        }
    }
    assert_eq!(fired, 2);
    assert_eq!(sent.len(), 1);
    assert_eq!(failed.len(), 1);
    assert_ne!(sent[0], failed[0].0);
    assert_eq!(failed[0].1.kind(), Some(&Kind::Connect));

    // each firing builds its own message
    let messages = transport.messages();
    assert_eq!(messages.len(), 2);
    assert_ne!(messages[0].1, messages[1].1);

    // both jobs are recurring and stay registered
    assert_eq!(coordinator.jobs().len(), 2);
    for job in &jobs {
        assert_eq!(coordinator.job_state(job.id()), Some(JobState::Pending));
    }
}

#[test]
fn cancel_and_shutdown() {
    let clock = ManualClock::new(monday_morning());
    let transport = StubTransport::new_ok();
    let (coordinator, rx) = coordinator(&transport, &clock);
    let at = monday_morning() + TimeDelta::minutes(30);

    let DispatchOutcome::Scheduled(once) = coordinator
        .dispatch(request().schedule_once(Some(at)))
        .unwrap()
    else {
        panic!("expected scheduled jobs");
    };
    let DispatchOutcome::Scheduled(daily) = coordinator
        .dispatch(request().schedule(ScheduleSpec::Daily(TimeOfDay::new(9, 0).unwrap())))
        .unwrap()
    else {
        panic!("expected scheduled jobs");
    };

    assert!(coordinator.cancel(once[0].id()));
    assert_eq!(coordinator.job_state(once[0].id()), Some(JobState::Cancelled));

    coordinator.shutdown(true);
    assert_eq!(coordinator.job_state(daily[0].id()), Some(JobState::Cancelled));

    clock.advance(TimeDelta::days(1));
    let statuses = rx.try_iter().collect::<Vec<_>>();
    assert!(statuses.iter().all(|status| matches!(status, Status::Scheduled(_))));
    assert!(transport.messages().is_empty());

    let err = coordinator
        .dispatch(request().schedule(ScheduleSpec::Daily(TimeOfDay::new(9, 0).unwrap())))
        .unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::SchedulerStopped)
    );

    // immediate sends do not need the scheduler
    send_now(&coordinator, request()).unwrap();
}

#[test]
fn failure_report_from_error() {
    let report = FailureReport::from(&envoi::Error::from(ValidationError::NoRecipients));
    assert_eq!(report.kind(), None);
    assert_eq!(report.to_string(), "invalid request: no recipients");
}
