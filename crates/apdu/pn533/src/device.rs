//! PN533 command set

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::bulk::BulkIo;
use crate::config::Pn533Config;
use crate::error::{Pn533Error, Result};
use crate::frame::{self, Frame};
use crate::target::Target;

const CMD_GET_FIRMWARE_VERSION: u8 = 0x02;
const CMD_WRITE_REGISTER: u8 = 0x08;
const CMD_SET_PARAMETERS: u8 = 0x12;
const CMD_SAM_CONFIGURATION: u8 = 0x14;
const CMD_RF_CONFIGURATION: u8 = 0x32;
const CMD_IN_DATA_EXCHANGE: u8 = 0x40;
const CMD_IN_COMMUNICATE_THRU: u8 = 0x42;
const CMD_IN_RELEASE: u8 = 0x44;
const CMD_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;

const RF_ITEM_FIELD: u8 = 0x01;
const RF_ITEM_TIMINGS: u8 = 0x02;
const RF_ITEM_MAX_RETRIES: u8 = 0x05;
const RF_ITEM_ANALOG_106A: u8 = 0x0A;

/// Default polling request for FeliCa: wildcard system code, PMm requested
pub const SENSF_REQ: [u8; 5] = [0x00, 0xFF, 0xFF, 0x01, 0x00];

/// Modulation and bit rate for InListPassiveTarget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    /// ISO 14443 type A, 106 kbps
    TypeA106,
    /// FeliCa, 212 kbps
    Felica212,
    /// FeliCa, 424 kbps
    Felica424,
}

impl BaudRate {
    const fn code(self) -> u8 {
        match self {
            Self::TypeA106 => 0x00,
            Self::Felica212 => 0x01,
            Self::Felica424 => 0x02,
        }
    }
}

/// GetFirmwareVersion answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// IC version (0x33 for PN533)
    pub ic: u8,
    /// Firmware version
    pub version: u8,
    /// Firmware revision
    pub revision: u8,
    /// Supported protocols bitmap
    pub support: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IC 0x{:02x} v{}.{} (support 0x{:02x})",
            self.ic, self.version, self.revision, self.support
        )
    }
}

/// A PN533-family chip behind a bulk pipe
#[derive(Debug)]
pub struct Pn533<B> {
    io: B,
    config: Pn533Config,
}

impl<B: BulkIo> Pn533<B> {
    /// Wrap an open bulk pipe
    pub const fn new(io: B, config: Pn533Config) -> Self {
        Self { io, config }
    }

    /// Timing configuration in use
    pub const fn config(&self) -> &Pn533Config {
        &self.config
    }

    /// The underlying bulk pipe
    pub const fn io(&self) -> &B {
        &self.io
    }

    /// Drain whatever the chip still has queued from an earlier session
    pub fn flush(&mut self) -> Result<()> {
        for _ in 0..self.config.flush_reads {
            match self.io.read(self.config.flush_timeout)? {
                Some(stale) => trace!(stale = %hex::encode(&stale), "Flushed stale data"),
                None => break,
            }
        }
        Ok(())
    }

    /// Tell the chip to abort the command in progress
    pub fn abort(&mut self) -> Result<()> {
        self.io.write(&frame::ACK, self.config.usb_timeout)
    }

    /// Send a command and wait for its response data
    pub fn command(&mut self, code: u8, data: &[u8]) -> Result<Bytes> {
        self.command_with_timeout(code, data, self.config.usb_timeout)
    }

    fn command_with_timeout(
        &mut self,
        code: u8,
        data: &[u8],
        timeout: std::time::Duration,
    ) -> Result<Bytes> {
        let request = frame::encode(code, data);
        trace!(command = %hex::encode(&request), "PN533 >>");
        self.io.write(&request, self.config.usb_timeout)?;

        // The ACK and the response may arrive in one read
        let mut acknowledged = false;
        loop {
            let wait = if acknowledged {
                timeout
            } else {
                self.config.usb_timeout
            };
            let raw = self.io.read(wait)?.ok_or(Pn533Error::Timeout)?;
            trace!(response = %hex::encode(&raw), "PN533 <<");

            let raw = if !acknowledged && raw.starts_with(&frame::ACK) {
                acknowledged = true;
                let rest = raw.slice(frame::ACK.len()..);
                if rest.iter().all(|b| *b == 0) {
                    continue;
                }
                rest
            } else {
                raw
            };

            return match frame::decode(&raw)? {
                Frame::Ack => Err(Pn533Error::UnexpectedAck(raw)),
                Frame::Error(error) => Err(Pn533Error::Command(error)),
                Frame::Response { code: got, data } if got == code.wrapping_add(1) => Ok(data),
                Frame::Response { code: got, .. } => Err(Pn533Error::UnexpectedResponse {
                    expected: code.wrapping_add(1),
                    got,
                }),
            };
        }
    }

    /// GetFirmwareVersion
    pub fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        let data = self.command(CMD_GET_FIRMWARE_VERSION, &[])?;
        let [ic, version, revision, support, ..] = data.as_ref() else {
            return Err(Pn533Error::InvalidFrame("short firmware version"));
        };
        Ok(FirmwareVersion {
            ic: *ic,
            version: *version,
            revision: *revision,
            support: *support,
        })
    }

    /// SAMConfiguration, normal mode
    pub fn sam_configuration(&mut self) -> Result<()> {
        self.command(CMD_SAM_CONFIGURATION, &[0x01, 0x00, 0x01])
            .map(drop)
    }

    /// SetParameters
    pub fn set_parameters(&mut self, flags: u8) -> Result<()> {
        self.command(CMD_SET_PARAMETERS, &[flags]).map(drop)
    }

    /// RFConfiguration for one configuration item
    pub fn rf_configuration(&mut self, item: u8, data: &[u8]) -> Result<()> {
        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(item);
        params.extend_from_slice(data);
        self.command(CMD_RF_CONFIGURATION, &params).map(drop)
    }

    /// Switch the RF field
    pub fn rf_field(&mut self, on: bool) -> Result<()> {
        self.rf_configuration(RF_ITEM_FIELD, &[u8::from(on)])
    }

    /// Limit passive activation retries; 0xFF retries forever
    pub fn set_max_retries(&mut self, passive_activation: u8) -> Result<()> {
        self.rf_configuration(RF_ITEM_MAX_RETRIES, &[0xFF, 0x01, passive_activation])
    }

    /// WriteRegister for one register
    pub fn write_register(&mut self, address: u16, value: u8) -> Result<()> {
        let [hi, lo] = address.to_be_bytes();
        self.command(CMD_WRITE_REGISTER, &[hi, lo, value]).map(drop)
    }

    /// Bring the chip into initiator mode
    ///
    /// Chips without a SAM slot (Sony RC-S956) reject SAMConfiguration and get
    /// their RF parameters set explicitly instead.
    pub fn initialize_device(&mut self) -> Result<FirmwareVersion> {
        let firmware = self.firmware_version()?;
        debug!(%firmware, "PN533 firmware");

        match self.sam_configuration() {
            Ok(()) => {}
            Err(Pn533Error::Command(code)) => {
                debug!(code, "SAMConfiguration rejected, using RC-S956 setup");
                self.set_parameters(0x08)?;
                self.rf_configuration(RF_ITEM_TIMINGS, &[0x0B, 0x0B, 0x0A])?;
                self.rf_configuration(
                    RF_ITEM_ANALOG_106A,
                    &[
                        0x59, 0xF4, 0x3F, 0x11, 0x4D, 0x85, 0x61, 0x6F, 0x26, 0x62, 0x87,
                    ],
                )?;
                if let Err(error) = self.write_register(0x0328, 0x59) {
                    if error.is_link_failure() {
                        return Err(error);
                    }
                    debug!(%error, "CIU register write ignored");
                }
            }
            Err(error) => return Err(error),
        }

        self.set_max_retries(0x02)?;
        Ok(firmware)
    }

    /// Poll for one passive target
    ///
    /// Returns `Ok(None)` if nothing answered within the poll timeout or the
    /// chip rejected the poll.
    pub fn in_list_passive_target(
        &mut self,
        baud: BaudRate,
        initiator_data: &[u8],
    ) -> Result<Option<Target>> {
        let mut params = Vec::with_capacity(initiator_data.len() + 2);
        params.extend_from_slice(&[0x01, baud.code()]);
        params.extend_from_slice(initiator_data);

        match self.command_with_timeout(CMD_IN_LIST_PASSIVE_TARGET, &params, self.config.poll_timeout)
        {
            Ok(data) => Target::parse(baud, &data),
            Err(Pn533Error::Timeout) => {
                // Cancel the pending poll so the next command is not answered late
                self.abort()?;
                self.flush()?;
                Ok(None)
            }
            Err(Pn533Error::Command(code)) => {
                debug!(code, ?baud, "Passive target poll rejected");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Poll type A first, then FeliCa at 212 kbps
    pub fn poll(&mut self) -> Result<Option<Target>> {
        match self.in_list_passive_target(BaudRate::TypeA106, &[])? {
            Some(target) => Ok(Some(target)),
            None => self.in_list_passive_target(BaudRate::Felica212, &SENSF_REQ),
        }
    }

    fn checked(data: Bytes) -> Result<Bytes> {
        let status = *data
            .first()
            .ok_or(Pn533Error::InvalidFrame("missing status byte"))?;
        match status & 0x3F {
            0 => Ok(data.slice(1..)),
            error => Err(Pn533Error::Status(error)),
        }
    }

    /// InDataExchange with an activated target
    pub fn in_data_exchange(&mut self, tg: u8, data: &[u8]) -> Result<Bytes> {
        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(tg);
        params.extend_from_slice(data);
        let response = self.command(CMD_IN_DATA_EXCHANGE, &params)?;
        Self::checked(response)
    }

    /// InCommunicateThru: raw frame to the target in the field
    pub fn in_communicate_thru(&mut self, data: &[u8]) -> Result<Bytes> {
        let response = self.command(CMD_IN_COMMUNICATE_THRU, data)?;
        Self::checked(response)
    }

    /// InRelease
    pub fn in_release(&mut self, tg: u8) -> Result<()> {
        let response = self.command(CMD_IN_RELEASE, &[tg])?;
        Self::checked(response).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::mock::MockBulk;
    use hex_literal::hex;

    fn chip(bulk: MockBulk) -> Pn533<MockBulk> {
        Pn533::new(bulk, Pn533Config::default())
    }

    #[test]
    fn test_initialize_pn533() {
        let mut pn533 = chip(MockBulk::new(|code, _| match code {
            CMD_GET_FIRMWARE_VERSION => Some(Ok(vec![0x33, 0x02, 0x07, 0x07])),
            _ => Some(Ok(vec![])),
        }));

        let firmware = pn533.initialize_device().unwrap();
        assert_eq!(firmware.ic, 0x33);
        assert_eq!(
            pn533.io().commands(),
            [CMD_GET_FIRMWARE_VERSION, CMD_SAM_CONFIGURATION, CMD_RF_CONFIGURATION]
        );
    }

    #[test]
    fn test_initialize_rcs956_fallback() {
        let mut pn533 = chip(MockBulk::new(|code, _| match code {
            CMD_GET_FIRMWARE_VERSION => Some(Ok(vec![0x33, 0x01, 0x30, 0x07])),
            CMD_SAM_CONFIGURATION | CMD_WRITE_REGISTER => Some(Err(0x7f)),
            _ => Some(Ok(vec![])),
        }));

        pn533.initialize_device().unwrap();
        assert_eq!(
            pn533.io().commands(),
            [
                CMD_GET_FIRMWARE_VERSION,
                CMD_SAM_CONFIGURATION,
                CMD_SET_PARAMETERS,
                CMD_RF_CONFIGURATION,
                CMD_RF_CONFIGURATION,
                CMD_WRITE_REGISTER,
                CMD_RF_CONFIGURATION,
            ]
        );
        let (_, max_retries) = frame::decode_command(pn533.io().written.last().unwrap()).unwrap();
        assert_eq!(max_retries.as_ref(), hex!("05ff0102"));
    }

    #[test]
    fn test_poll_timeout_aborts() {
        // Poll acknowledged but never answered
        let mut pn533 = chip(MockBulk::new(|_, _| None));

        assert_eq!(
            pn533.in_list_passive_target(BaudRate::TypeA106, &[]).unwrap(),
            None
        );
        assert_eq!(pn533.io().written.last().unwrap().as_ref(), frame::ACK);
    }

    #[test]
    fn test_poll_falls_back_to_felica() {
        let mut pn533 = chip(MockBulk::new(|code, data| match (code, data) {
            (CMD_IN_LIST_PASSIVE_TARGET, [0x01, 0x00]) => Some(Ok(vec![0x00])),
            (CMD_IN_LIST_PASSIVE_TARGET, [0x01, 0x01, ..]) => Some(Ok(hex!(
                "01 01 12 01 0102030405060708 1112131415161718"
            )
            .to_vec())),
            _ => Some(Err(0x01)),
        }));

        let target = pn533.poll().unwrap().unwrap();
        assert!(matches!(target, Target::Felica(_)));
        let (_, felica_poll) = frame::decode_command(&pn533.io().written[1]).unwrap();
        assert_eq!(felica_poll.as_ref(), hex!("0101 00ffff0100"));
    }

    #[test]
    fn test_data_exchange_status() {
        let mut pn533 = chip(MockBulk::new(|_, data| match data {
            [0x01, 0x00, 0xA4, ..] => Some(Ok(hex!("00 6f00 9000").to_vec())),
            _ => Some(Ok(vec![0x01])),
        }));

        let response = pn533.in_data_exchange(1, &hex!("00a4040000")).unwrap();
        assert_eq!(response.as_ref(), hex!("6f009000"));
        assert!(matches!(
            pn533.in_data_exchange(1, &hex!("00b0000000")),
            Err(Pn533Error::Status(0x01))
        ));
    }

    #[test]
    fn test_response_in_same_read_as_ack() {
        let mut bulk = MockBulk::new(|_, _| None);
        let mut combined = frame::ACK.to_vec();
        combined.extend_from_slice(&frame::encode_response(0x03, &hex!("33020707")));
        bulk.queue(combined);
        let mut pn533 = chip(bulk);

        assert_eq!(pn533.firmware_version().unwrap().version, 0x02);
    }
}
