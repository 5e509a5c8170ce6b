//! Scanner orchestration with scripted backends

use std::time::Duration;

use bytes::Bytes;
use farecard_scanner::{
    ReaderBackend, Result, ScanContext, ScanError, ScanEvent, ScanEventReceiver, Scanner,
    ScannerConfig, TargetFamily,
};

const WAIT: Duration = Duration::from_secs(5);

/// Backend whose hardware is never there
#[derive(Debug)]
struct Missing(&'static str);

impl ReaderBackend for Missing {
    fn name(&self) -> &str {
        self.0
    }

    fn run(&mut self, _ctx: &ScanContext) -> Result<()> {
        Err(ScanError::backend(self.0, "device not found"))
    }
}

/// Backend that reports one card, then idles until stopped
#[derive(Debug)]
struct Idle;

impl ReaderBackend for Idle {
    fn name(&self) -> &str {
        "idle"
    }

    fn run(&mut self, ctx: &ScanContext) -> Result<()> {
        ctx.emit(ScanEvent::Detected {
            backend: ctx.backend().to_owned(),
            tag_id: Bytes::from_static(&[1, 2, 3, 4]),
            family: TargetFamily::IsoDep,
        });
        while !ctx.cancel().sleep(Duration::from_millis(5)) {}
        Ok(())
    }
}

fn config() -> ScannerConfig {
    ScannerConfig::new().with_pcsc(false).with_pn533(false)
}

fn wait_for_no_backend(events: &ScanEventReceiver) -> Vec<ScanEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.recv_timeout(WAIT) {
        let done = event == ScanEvent::Error(ScanError::NoBackendAvailable);
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

#[test]
fn test_all_backends_failing_reports_once() {
    let scanner = Scanner::with_backends(
        config(),
        vec![Box::new(Missing("first")), Box::new(Missing("second"))],
    );
    let events = scanner.events();

    assert!(scanner.start());
    let seen = wait_for_no_backend(&events);

    let backend_errors = seen
        .iter()
        .filter(|event| matches!(event, ScanEvent::Error(ScanError::Backend { .. })))
        .count();
    assert_eq!(backend_errors, 2);
    assert_eq!(
        seen.last(),
        Some(&ScanEvent::Error(ScanError::NoBackendAvailable))
    );
    assert!(!scanner.is_scanning());
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_no_backends_reports_unavailable() {
    let scanner = Scanner::with_backends(config(), Vec::new());
    let events = scanner.events();

    assert!(scanner.start());
    assert_eq!(
        events.recv_timeout(WAIT).unwrap(),
        ScanEvent::Error(ScanError::NoBackendAvailable)
    );
    assert!(!scanner.is_scanning());
}

#[test]
fn test_start_is_idempotent() {
    let scanner = Scanner::with_backends(config(), vec![Box::new(Idle)]);
    let events = scanner.events();

    assert!(scanner.start());
    assert!(!scanner.start());
    assert!(scanner.is_scanning());

    // Only one backend thread is running
    assert!(matches!(
        events.recv_timeout(WAIT).unwrap(),
        ScanEvent::Detected { backend, .. } if backend == "idle"
    ));
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());

    scanner.stop();
}

#[test]
fn test_stop_is_not_a_failure() {
    let scanner = Scanner::with_backends(config(), vec![Box::new(Idle)]);
    let events = scanner.events();

    assert!(scanner.start());
    assert!(matches!(events.recv_timeout(WAIT).unwrap(), ScanEvent::Detected { .. }));

    scanner.stop();
    assert!(!scanner.is_scanning());
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());

    // Restartable with the same backends
    assert!(scanner.start());
    assert!(matches!(events.recv_timeout(WAIT).unwrap(), ScanEvent::Detected { .. }));
    scanner.stop();
}
