//! PN533 raw USB backend

mod tech;

pub use tech::{Pn533Classic, Pn533Felica, Pn533Ultralight};

use bytes::Bytes;
use farecard_apdu_transport_pn533::{
    BulkIo, Pn533, Pn533Config, Pn533Error, Pn533Transceiver, Target, UsbBulk, UsbDeviceInfo,
};
use farecard_card::iso7816::Iso7816Dispatcher;
use farecard_card::{KeyProvider, RawCard, ReadError, felica, ultralight};
use tracing::{debug, info};

use crate::backend::ReaderBackend;
use crate::driver::{ScanContext, TargetDriver, read_classic, run_poll_loop};
use crate::error::Result;
use crate::event::TargetFamily;

/// Poll loop steps for a PN533-family chip
#[derive(Debug)]
pub struct Pn533Driver<'a, B> {
    pn533: Pn533<B>,
    dispatcher: &'a Iso7816Dispatcher,
}

impl<'a, B: BulkIo> Pn533Driver<'a, B> {
    /// Drive a chip behind an open bulk pipe
    pub const fn new(pn533: Pn533<B>, dispatcher: &'a Iso7816Dispatcher) -> Self {
        Self { pn533, dispatcher }
    }

    /// The chip
    pub const fn pn533(&self) -> &Pn533<B> {
        &self.pn533
    }
}

impl<B: BulkIo> TargetDriver for Pn533Driver<'_, B> {
    type Target = Target;

    fn initialize_device(&mut self) -> Result<()> {
        self.pn533.flush()?;
        let firmware = self.pn533.initialize_device()?;
        info!(%firmware, "PN533 ready");
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Target>> {
        Ok(self.pn533.poll()?)
    }

    fn identify(&self, target: &Target) -> (Bytes, TargetFamily) {
        let family = match target {
            Target::TypeA(target) => TargetFamily::from_sak(target.sak),
            Target::Felica(_) => TargetFamily::Felica,
        };
        (target.id(), family)
    }

    fn read(
        &mut self,
        target: &Target,
        keys: Option<&dyn KeyProvider>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> std::result::Result<RawCard, ReadError> {
        let tag_id = target.id();
        match target {
            Target::TypeA(target) => match TargetFamily::from_sak(target.sak) {
                TargetFamily::Classic { sectors } => read_classic(
                    tag_id,
                    &mut Pn533Classic::new(&mut self.pn533, target.clone(), sectors),
                    keys,
                    progress,
                ),
                TargetFamily::Ultralight { .. } => ultralight::read_card(
                    tag_id,
                    &mut Pn533Ultralight::new(&mut self.pn533, target.clone()),
                    progress,
                ),
                TargetFamily::IsoDep | TargetFamily::Felica => self.dispatcher.read_card(
                    tag_id,
                    &mut Pn533Transceiver::new(&mut self.pn533, target.tg),
                    progress,
                ),
            },
            Target::Felica(target) => felica::read_card(
                tag_id,
                &mut Pn533Felica::new(&mut self.pn533, target.clone()),
                progress,
            ),
        }
    }

    fn release(&mut self, target: &Target) -> Result<()> {
        match self.pn533.in_release(target.tg()) {
            Err(e) if e.is_link_failure() => Err(e.into()),
            Err(e) => {
                debug!(error = %e, "InRelease failed");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

/// Backend for one PN533-family USB device
#[derive(Debug)]
pub struct Pn533Backend {
    name: String,
    device: UsbDeviceInfo,
    config: Pn533Config,
    dispatcher: Iso7816Dispatcher,
}

impl Pn533Backend {
    /// Backend for a listed device
    pub fn new(device: UsbDeviceInfo, config: Pn533Config) -> Self {
        Self {
            name: device.name.to_owned(),
            device,
            config,
            dispatcher: Iso7816Dispatcher::default(),
        }
    }

    /// One backend per supported device on the bus
    pub fn discover() -> std::result::Result<Vec<Self>, Pn533Error> {
        let devices = UsbBulk::list()?;
        if devices.is_empty() {
            return Err(Pn533Error::DeviceNotFound);
        }
        Ok(devices
            .into_iter()
            .map(|device| Self::new(device, Pn533Config::default()))
            .collect())
    }
}

impl ReaderBackend for Pn533Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &ScanContext) -> Result<()> {
        let bulk = UsbBulk::open(self.device.clone())?;
        info!(device = %self.device, "Using PN533 device");

        let mut driver = Pn533Driver::new(Pn533::new(bulk, self.config), &self.dispatcher);
        run_poll_loop(&mut driver, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::event::ScanEvent;
    use crossbeam_channel::unbounded;
    use farecard_apdu_transport_pn533::MockBulk;
    use farecard_card::RawPayload;
    use hex_literal::hex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Chip with an NTAG213 that stays for `polls` type A polls
    fn ntag_chip(polls: usize, cancel: CancellationToken) -> MockBulk {
        let seen = Arc::new(AtomicUsize::new(0));
        MockBulk::new(move |code, data| match (code, data) {
            (0x02, _) => Some(Ok(vec![0x33, 0x02, 0x07, 0x07])),
            (0x4A, [0x01, 0x00]) => {
                if seen.fetch_add(1, Ordering::SeqCst) < polls {
                    Some(Ok(hex!("01 01 0044 00 07 04a1b2c3d4e5f6").to_vec()))
                } else {
                    cancel.cancel();
                    Some(Ok(vec![0x00]))
                }
            }
            (0x4A, _) => Some(Ok(vec![0x00])),
            // GET_VERSION: NTAG213
            (0x42, [0x60]) => Some(Ok(hex!("00 0004040201000f03").to_vec())),
            (0x42, [0x30, page]) => {
                let mut response = vec![0x00];
                response.extend((0..16).map(|i| page.wrapping_mul(4).wrapping_add(i)));
                Some(Ok(response))
            }
            _ => Some(Ok(vec![0x00])),
        })
    }

    #[test]
    fn test_reads_ultralight_once() {
        let cancel = CancellationToken::new();
        let dispatcher = Iso7816Dispatcher::default();
        let pn533 = Pn533::new(ntag_chip(3, cancel.clone()), Pn533Config::default());
        let mut driver = Pn533Driver::new(pn533, &dispatcher);

        let (events, receiver) = unbounded();
        let (progress, _) = unbounded();
        let ctx = ScanContext::new("PN533", events, progress, cancel)
            .with_intervals(Duration::from_millis(1), Duration::from_millis(1));
        run_poll_loop(&mut driver, &ctx).unwrap();

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ScanEvent::Detected {
                backend: "PN533".into(),
                tag_id: Bytes::from_static(&hex!("04a1b2c3d4e5f6")),
                family: TargetFamily::Ultralight {
                    ultralight_c: false
                },
            }
        );
        let ScanEvent::Read(card) = &events[1] else {
            panic!("expected a read, got {:?}", events[1]);
        };
        let RawPayload::Ultralight(capture) = &card.payload else {
            panic!("expected an Ultralight capture");
        };
        assert_eq!(capture.pages.len(), 45);
        assert_eq!(capture.pages[1].as_ref(), [4, 5, 6, 7]);
    }
}
