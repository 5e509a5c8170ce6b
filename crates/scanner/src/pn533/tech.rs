//! Card technologies over PN533 chip commands

use bytes::Bytes;
use farecard_apdu_core::{Error, Result, TransportError};
use farecard_apdu_transport_pn533::{
    BaudRate, BulkIo, FelicaTarget, Pn533, Pn533Error, Target, TypeATarget,
};
use farecard_card::keys::{ClassicKey, KeyType};
use farecard_card::technology::{ClassicTechnology, FelicaChannel, UltralightTechnology};
use tracing::{debug, trace};

const MIFARE_READ: u8 = 0x30;

fn apdu_error(error: Pn533Error) -> Error {
    Error::Transport(error.into())
}

/// Release the target and activate the same card again
///
/// MIFARE cards halt after a failed authentication or a NAKed command.
fn reactivate<B: BulkIo>(pn533: &mut Pn533<B>, target: &mut TypeATarget) -> Result<()> {
    if let Err(e) = pn533.in_release(target.tg) {
        if e.is_link_failure() {
            return Err(apdu_error(e));
        }
    }

    match pn533
        .in_list_passive_target(BaudRate::TypeA106, &[])
        .map_err(apdu_error)?
    {
        Some(Target::TypeA(again)) if again.uid == target.uid => {
            target.tg = again.tg;
            Ok(())
        }
        _ => Err(Error::Transport(TransportError::CardLost)),
    }
}

/// MIFARE Classic through InDataExchange with the chip's Crypto-1
#[derive(Debug)]
pub struct Pn533Classic<'a, B> {
    pn533: &'a mut Pn533<B>,
    target: TypeATarget,
    sectors: usize,
}

impl<'a, B: BulkIo> Pn533Classic<'a, B> {
    /// Wrap an activated card with `sectors` sectors
    pub const fn new(pn533: &'a mut Pn533<B>, target: TypeATarget, sectors: usize) -> Self {
        Self {
            pn533,
            target,
            sectors,
        }
    }
}

impl<B: BulkIo> ClassicTechnology for Pn533Classic<'_, B> {
    fn sector_count(&self) -> usize {
        self.sectors
    }

    fn authenticate(&mut self, sector: usize, key: &ClassicKey, key_type: KeyType) -> Result<bool> {
        let block = self.sector_to_block(sector) as u8;
        // Crypto-1 runs over the last four UID bytes
        let uid = &self.target.uid[self.target.uid.len().saturating_sub(4)..];

        let mut params = Vec::with_capacity(12);
        params.extend_from_slice(&[key_type.auth_code(), block]);
        params.extend_from_slice(key);
        params.extend_from_slice(uid);

        match self.pn533.in_data_exchange(self.target.tg, &params) {
            Ok(_) => Ok(true),
            Err(Pn533Error::Status(status)) => {
                trace!(sector, %key_type, status, "Authentication rejected");
                reactivate(self.pn533, &mut self.target)?;
                Ok(false)
            }
            Err(e) => Err(apdu_error(e)),
        }
    }

    fn read_block(&mut self, block: usize) -> Result<Bytes> {
        match self
            .pn533
            .in_data_exchange(self.target.tg, &[MIFARE_READ, block as u8])
        {
            Ok(data) => Ok(data),
            Err(Pn533Error::Status(status)) => {
                debug!(block, status, "Block read refused");
                reactivate(self.pn533, &mut self.target)?;
                Err(Error::SecurityStatusNotSatisfied)
            }
            Err(e) => Err(apdu_error(e)),
        }
    }
}

/// MIFARE Ultralight through InCommunicateThru
#[derive(Debug)]
pub struct Pn533Ultralight<'a, B> {
    pn533: &'a mut Pn533<B>,
    target: TypeATarget,
}

impl<'a, B: BulkIo> Pn533Ultralight<'a, B> {
    /// Wrap an activated card
    pub const fn new(pn533: &'a mut Pn533<B>, target: TypeATarget) -> Self {
        Self { pn533, target }
    }
}

impl<B: BulkIo> UltralightTechnology for Pn533Ultralight<'_, B> {
    fn transceive(&mut self, command: &[u8]) -> Result<Bytes> {
        self.pn533.in_communicate_thru(command).map_err(apdu_error)
    }

    fn reconnect(&mut self) -> Result<()> {
        reactivate(self.pn533, &mut self.target)
    }
}

/// FeliCa frames through InCommunicateThru
#[derive(Debug)]
pub struct Pn533Felica<'a, B> {
    pn533: &'a mut Pn533<B>,
    target: FelicaTarget,
}

impl<'a, B: BulkIo> Pn533Felica<'a, B> {
    /// Wrap an activated card
    pub const fn new(pn533: &'a mut Pn533<B>, target: FelicaTarget) -> Self {
        Self { pn533, target }
    }
}

impl<B: BulkIo> FelicaChannel for Pn533Felica<'_, B> {
    fn transceive(&mut self, frame: &[u8]) -> Result<Bytes> {
        self.pn533.in_communicate_thru(frame).map_err(apdu_error)
    }

    fn idm(&self) -> Bytes {
        Bytes::copy_from_slice(&self.target.idm)
    }

    fn pmm(&self) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(&self.target.pmm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farecard_apdu_transport_pn533::{MockBulk, Pn533Config};
    use farecard_card::keys::well_known;
    use hex_literal::hex;

    const IN_DATA_EXCHANGE: u8 = 0x40;
    const IN_RELEASE: u8 = 0x44;
    const IN_LIST_PASSIVE_TARGET: u8 = 0x4A;

    fn classic_target() -> TypeATarget {
        TypeATarget {
            tg: 1,
            atqa: [0x00, 0x04],
            sak: 0x08,
            uid: Bytes::from_static(&hex!("deadbeef")),
            ats: None,
        }
    }

    #[test]
    fn test_classic_auth_failure_reactivates() {
        let bulk = MockBulk::new(|code, data| match (code, data) {
            // Only key B FFFFFFFFFFFF opens sector 1
            (IN_DATA_EXCHANGE, [0x01, 0x61, 0x04, rest @ ..]) if rest[..6] == [0xFF; 6] => {
                Some(Ok(vec![0x00]))
            }
            (IN_DATA_EXCHANGE, [0x01, 0x60 | 0x61, ..]) => Some(Ok(vec![0x14])),
            (IN_DATA_EXCHANGE, [0x01, 0x30, _]) => {
                Some(Ok(std::iter::once(0x00).chain([0xAB; 16]).collect()))
            },
            (IN_RELEASE, _) => Some(Ok(vec![0x00])),
            (IN_LIST_PASSIVE_TARGET, _) => Some(Ok(hex!("01 01 0004 08 04 deadbeef").to_vec())),
            _ => Some(Err(0x01)),
        });
        let mut pn533 = Pn533::new(bulk, Pn533Config::default());
        let mut classic = Pn533Classic::new(&mut pn533, classic_target(), 16);

        assert!(!classic.authenticate(1, &well_known::DEFAULT, KeyType::A).unwrap());
        assert!(classic.authenticate(1, &well_known::DEFAULT, KeyType::B).unwrap());
        assert_eq!(classic.read_block(4).unwrap().as_ref(), [0xAB; 16]);

        assert_eq!(
            pn533.io().commands(),
            [
                IN_DATA_EXCHANGE,
                IN_RELEASE,
                IN_LIST_PASSIVE_TARGET,
                IN_DATA_EXCHANGE,
                IN_DATA_EXCHANGE,
            ]
        );
    }

    #[test]
    fn test_classic_card_gone_after_failure() {
        let bulk = MockBulk::new(|code, _| match code {
            IN_DATA_EXCHANGE => Some(Ok(vec![0x14])),
            IN_LIST_PASSIVE_TARGET => Some(Ok(vec![0x00])),
            _ => Some(Ok(vec![0x00])),
        });
        let mut pn533 = Pn533::new(bulk, Pn533Config::default());
        let mut classic = Pn533Classic::new(&mut pn533, classic_target(), 16);

        let error = classic
            .authenticate(0, &well_known::ZERO, KeyType::A)
            .unwrap_err();
        assert!(!error.is_fatal());
        assert_eq!(error, Error::Transport(TransportError::CardLost));
    }

    #[test]
    fn test_felica_frames_pass_through() {
        let bulk = MockBulk::new(|_, data| {
            let mut response = vec![0x00, 0x12, 0x01];
            response.extend_from_slice(&data[2..]);
            response.resize(0x13, 0x00);
            Some(Ok(response))
        });
        let mut pn533 = Pn533::new(bulk, Pn533Config::default());
        let mut felica = Pn533Felica::new(
            &mut pn533,
            FelicaTarget {
                tg: 1,
                idm: hex!("0102030405060708"),
                pmm: hex!("1112131415161718"),
            },
        );

        let response = felica.transceive(&hex!("0600ffff0100")).unwrap();
        assert_eq!(response[0], 0x12);
        assert_eq!(felica.pmm().unwrap().as_ref(), hex!("1112131415161718"));
    }
}
