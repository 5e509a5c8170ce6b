//! Scan orchestration across every reader backend

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::ReaderBackend;
use crate::cancel::CancellationToken;
use crate::config::ScannerConfig;
use crate::driver::ScanContext;
use crate::error::ScanError;
use crate::event::{
    ProgressReceiver, ProgressSender, ScanEvent, ScanEventReceiver, ScanEventSender,
};
use crate::pcsc::PcscBackend;
use crate::pn533::Pn533Backend;

type SharedBackend = Arc<Mutex<Box<dyn ReaderBackend>>>;

#[derive(Debug)]
struct Registered {
    name: String,
    backend: SharedBackend,
}

/// Runs one thread per backend and fans their events into shared channels
///
/// Backends stay registered across scans, so a scanner can be started again
/// after [`Scanner::stop`].
#[derive(Debug)]
pub struct Scanner {
    config: ScannerConfig,
    backends: Vec<Registered>,
    event_tx: ScanEventSender,
    event_rx: ScanEventReceiver,
    progress_tx: ProgressSender,
    progress_rx: ProgressReceiver,
    /// Token of the running scan, `None` when idle
    state: Arc<Mutex<Option<CancellationToken>>>,
}

impl Scanner {
    /// Probe every enabled backend kind and register what was found
    ///
    /// A failing probe is logged and skipped. The scanner may end up with no
    /// backends at all, in which case [`Scanner::start`] reports
    /// [`ScanError::NoBackendAvailable`].
    pub fn discover(config: ScannerConfig) -> Self {
        let mut backends: Vec<Box<dyn ReaderBackend>> = Vec::new();

        if config.pcsc {
            match PcscBackend::discover(config.reader_filter.as_deref()) {
                Ok(found) => {
                    backends.extend(found.into_iter().map(|b| Box::new(b) as Box<dyn ReaderBackend>))
                }
                Err(e) => warn!(error = %e, "PC/SC probe failed"),
            }
        }
        if config.pn533 {
            match Pn533Backend::discover() {
                Ok(found) => {
                    backends.extend(found.into_iter().map(|b| Box::new(b) as Box<dyn ReaderBackend>))
                }
                Err(e) => warn!(error = %e, "PN533 probe failed"),
            }
        }

        Self::with_backends(config, backends)
    }

    /// Create a scanner over the given backends
    pub fn with_backends(config: ScannerConfig, backends: Vec<Box<dyn ReaderBackend>>) -> Self {
        let (event_tx, event_rx) = unbounded();
        let (progress_tx, progress_rx) = unbounded();
        let backends = backends
            .into_iter()
            .map(|backend| Registered {
                name: backend.name().to_owned(),
                backend: Arc::new(Mutex::new(backend)),
            })
            .collect();

        Self {
            config,
            backends,
            event_tx,
            event_rx,
            progress_tx,
            progress_rx,
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Names of the registered backends
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|registered| registered.name.as_str())
    }

    /// Detected, read and error events from every backend
    pub fn events(&self) -> ScanEventReceiver {
        self.event_rx.clone()
    }

    /// Progress of the read in flight; `None` when it finished
    pub fn progress(&self) -> ProgressReceiver {
        self.progress_rx.clone()
    }

    /// Check if a scan is running
    pub fn is_scanning(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Start scanning on every backend
    ///
    /// Returns `false` if a scan was already running.
    pub fn start(&self) -> bool {
        let cancel = {
            let mut state = self.state.lock();
            if state.is_some() {
                debug!("Scan already running");
                return false;
            }
            let cancel = CancellationToken::new();
            *state = Some(cancel.clone());
            cancel
        };
        info!(backends = self.backends.len(), "Starting scan");

        let handles: Vec<JoinHandle<()>> = self
            .backends
            .iter()
            .filter_map(|registered| self.spawn_backend(registered, &cancel))
            .collect();

        let state = Arc::clone(&self.state);
        let events = self.event_tx.clone();
        let supervisor = thread::Builder::new()
            .name("scan-supervisor".into())
            .spawn(move || supervise(handles, &cancel, &state, &events));
        if let Err(e) = supervisor {
            error!(error = %e, "Failed to spawn scan supervisor");
        }
        true
    }

    /// Stop scanning
    ///
    /// Backends notice at their next cancellation point; a card read in flight
    /// is abandoned and its result dropped.
    pub fn stop(&self) {
        if let Some(cancel) = self.state.lock().take() {
            info!("Stopping scan");
            cancel.cancel();
        }
    }

    fn spawn_backend(
        &self,
        registered: &Registered,
        cancel: &CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let ctx = ScanContext::new(
            registered.name.clone(),
            self.event_tx.clone(),
            self.progress_tx.clone(),
            cancel.clone(),
        )
        .with_intervals(self.config.poll_interval, self.config.removal_interval)
        .with_keys(self.config.keys.clone());
        let backend = Arc::clone(&registered.backend);

        thread::Builder::new()
            .name(format!("scan-{}", registered.name))
            .spawn(move || run_backend(&backend, &ctx))
            .inspect_err(|e| error!(backend = %registered.name, error = %e, "Failed to spawn backend thread"))
            .ok()
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_backend(backend: &SharedBackend, ctx: &ScanContext) {
    // A backend from a stopped scan may still be unwinding
    let mut backend = backend.lock();
    if ctx.cancel().is_cancelled() {
        return;
    }

    debug!(backend = %ctx.backend(), "Backend started");
    match backend.run(ctx) {
        Ok(()) => debug!(backend = %ctx.backend(), "Backend stopped"),
        Err(e) if ctx.cancel().is_cancelled() => {
            debug!(backend = %ctx.backend(), error = %e, "Backend failed after stop");
        }
        Err(e) => {
            error!(backend = %ctx.backend(), error = %e, "Backend failed");
            ctx.emit(ScanEvent::Error(ScanError::backend(ctx.backend(), e)));
        }
    }
}

fn supervise(
    handles: Vec<JoinHandle<()>>,
    cancel: &CancellationToken,
    state: &Mutex<Option<CancellationToken>>,
    events: &ScanEventSender,
) {
    for handle in handles {
        if handle.join().is_err() {
            error!("Backend thread panicked");
        }
    }

    let mut state = state.lock();
    let current = state.as_ref().is_some_and(|token| token.same_as(cancel));
    if current && !cancel.is_cancelled() {
        *state = None;
        drop(state);
        warn!("Every backend exited, no reader available");
        let _ = events.send(ScanEvent::Error(ScanError::NoBackendAvailable));
    }
}
