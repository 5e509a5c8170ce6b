//! The per-backend poll loop
//!
//! ```text
//! Polling -> Detected -> Reading -> Releasing -> WaitingForRemoval -> Polling
//! ```
//!
//! A [`TargetDriver`] supplies the hardware-specific steps; [`run_poll_loop`]
//! is the same for every backend. The loop ends when the context is cancelled
//! or a step fails with a fatal error.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use farecard_card::technology::ClassicTechnology;
use farecard_card::{KeyProvider, RawCard, ReadError, classic};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::{Result, ScanError};
use crate::event::{ProgressSender, ScanEvent, ScanEventSender, TargetFamily};

/// Hardware-specific steps of the poll loop
pub trait TargetDriver {
    /// Handle to an activated card
    type Target;

    /// One-time device setup before the first poll
    fn initialize_device(&mut self) -> Result<()> {
        Ok(())
    }

    /// Try to activate a card, primary protocol first
    fn poll(&mut self) -> Result<Option<Self::Target>>;

    /// Tag id and family of an activated card
    fn identify(&self, target: &Self::Target) -> (Bytes, TargetFamily);

    /// Read the card with the family reader its signature implies
    fn read(
        &mut self,
        target: &Self::Target,
        keys: Option<&dyn KeyProvider>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> std::result::Result<RawCard, ReadError>;

    /// Let go of the card
    fn release(&mut self, target: &Self::Target) -> Result<()>;
}

/// Everything a backend needs to report to the scanner
#[derive(Clone)]
pub struct ScanContext {
    backend: String,
    events: ScanEventSender,
    progress: ProgressSender,
    cancel: CancellationToken,
    keys: Option<Arc<dyn KeyProvider>>,
    poll_interval: Duration,
    removal_interval: Duration,
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("backend", &self.backend)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("poll_interval", &self.poll_interval)
            .field("removal_interval", &self.removal_interval)
            .finish()
    }
}

impl ScanContext {
    /// Create a context with the default intervals and no keys
    pub fn new(
        backend: impl Into<String>,
        events: ScanEventSender,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend: backend.into(),
            events,
            progress,
            cancel,
            keys: None,
            poll_interval: Duration::from_millis(250),
            removal_interval: Duration::from_millis(300),
        }
    }

    /// Set the poll and removal intervals
    pub const fn with_intervals(mut self, poll: Duration, removal: Duration) -> Self {
        self.poll_interval = poll;
        self.removal_interval = removal;
        self
    }

    /// Use key material for sector-authenticated cards
    pub fn with_keys(mut self, keys: Option<Arc<dyn KeyProvider>>) -> Self {
        self.keys = keys;
        self
    }

    /// Name of the backend this context reports for
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// The scan's cancellation token
    pub const fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Key material, if any
    pub fn keys(&self) -> Option<&dyn KeyProvider> {
        self.keys.as_deref()
    }

    /// Publish an event; dropped if nobody listens any more
    pub fn emit(&self, event: ScanEvent) {
        let _ = self.events.send(event);
    }

    fn report_progress(&self, progress: Option<(usize, usize)>) {
        let _ = self.progress.send(progress);
    }
}

/// Release a target, swallowing everything but fatal errors
fn release<D: TargetDriver + ?Sized>(driver: &mut D, target: &D::Target) -> Result<()> {
    match driver.release(target) {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!(error = %e, "Release failed, card probably gone");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

fn poll<D: TargetDriver + ?Sized>(driver: &mut D) -> Result<Option<D::Target>> {
    match driver.poll() {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!(error = %e, "Poll failed");
            Ok(None)
        }
        Ok(target) => Ok(target),
    }
}

/// Run the poll loop until cancelled or a fatal error
pub fn run_poll_loop<D: TargetDriver + ?Sized>(driver: &mut D, ctx: &ScanContext) -> Result<()> {
    driver.initialize_device()?;

    while !ctx.cancel.is_cancelled() {
        let Some(target) = poll(driver)? else {
            ctx.cancel.sleep(ctx.poll_interval);
            continue;
        };

        let (tag_id, family) = driver.identify(&target);
        info!(backend = %ctx.backend, tag_id = %hex::encode(&tag_id), %family, "Card detected");
        ctx.emit(ScanEvent::Detected {
            backend: ctx.backend.clone(),
            tag_id,
            family,
        });

        let result = driver.read(&target, ctx.keys(), &mut |current, total| {
            ctx.report_progress(Some((current, total)));
        });
        ctx.report_progress(None);

        match result {
            Err(e) if e.is_fatal() => return Err(e.into()),
            _ if ctx.cancel.is_cancelled() => return Ok(()),
            Ok(card) => {
                if card.is_partially_unauthorized() {
                    warn!(tag_id = %hex::encode(&card.tag_id), "Card read with unauthorized sectors");
                } else {
                    info!(card_type = %card.card_type(), "Card read");
                }
                ctx.emit(ScanEvent::Read(card));
            }
            Err(e) => {
                warn!(error = %e, "Card read failed");
                ctx.emit(ScanEvent::Error(ScanError::Read(e)));
            }
        }

        release(driver, &target)?;

        debug!("Waiting for card removal");
        loop {
            if ctx.cancel.sleep(ctx.removal_interval) {
                return Ok(());
            }
            match poll(driver)? {
                Some(still_there) => release(driver, &still_there)?,
                None => break,
            }
        }
    }
    Ok(())
}

/// Read a MIFARE Classic card with the card's own and the global keys
pub(crate) fn read_classic<T: ClassicTechnology + ?Sized>(
    tag_id: Bytes,
    tech: &mut T,
    keys: Option<&dyn KeyProvider>,
    progress: &mut dyn FnMut(usize, usize),
) -> std::result::Result<RawCard, ReadError> {
    let tag_hex = hex::encode(&tag_id);
    let card_keys = keys.and_then(|keys| keys.keys_for_tag(&tag_hex));
    let global_keys = keys.and_then(|keys| keys.global_keys()).unwrap_or_default();
    classic::read_card(tag_id, tech, card_keys.as_ref(), &global_keys, progress)
}
