//! KS X 6924 cards (T-money, Snapper, Cashbee)

use std::collections::BTreeMap;

use bytes::Bytes;
use farecard_apdu_core::Result;
use farecard_apdu_core::command::CLASS_90;
use tracing::debug;

use super::discovery::{AppConfig, FileSelector, Protocol};
use super::model::Application;

/// Family tag
pub const TYPE: &str = "ksx6924";

/// AIDs used by KS X 6924 issuers
pub const APP_NAMES: [&[u8]; 4] = [
    &[0xD4, 0x10, 0x00, 0x00, 0x03, 0x00, 0x01],
    &[0xD4, 0x10, 0x00, 0x00, 0x14, 0x00, 0x01],
    &[0xD4, 0x10, 0x00, 0x00, 0x30, 0x00, 0x01],
    &[0xD4, 0x10, 0x65, 0x09, 0x90, 0x00, 0x20],
];

/// FCI tag holding `EF_PURSE_INFO`
pub const TAG_PURSE_INFO: &str = "b0";

const INS_GET_BALANCE: u8 = 0x4C;
const INS_GET_RECORD: u8 = 0x78;
const EXTRA_RECORDS: u8 = 0x10;
const EXTRA_RECORD_LEN: u8 = 0x10;

/// Read the purse balance with GET BALANCE
pub fn read_balance(protocol: &mut Protocol<'_>) -> Result<BTreeMap<usize, Bytes>> {
    let mut balances = BTreeMap::new();
    match protocol.send(CLASS_90, INS_GET_BALANCE, 0, 0, 4, &[]) {
        Ok(balance) => {
            balances.insert(0, balance);
        }
        Err(e) if e.is_transport() => return Err(e),
        Err(e) => debug!(error = %e, "GET BALANCE refused"),
    }
    Ok(balances)
}

/// Read the proprietary records until the first refusal
pub fn read_extra_records(protocol: &mut Protocol<'_>) -> Result<BTreeMap<String, Bytes>> {
    let mut records = BTreeMap::new();
    for index in 0..EXTRA_RECORDS {
        match protocol.send(CLASS_90, INS_GET_RECORD, index, 0, EXTRA_RECORD_LEN, &[]) {
            Ok(record) => {
                records.insert(format!("extra/{index}"), record);
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                debug!(index, error = %e, "GET RECORD stopped");
                break;
            }
        }
    }
    Ok(records)
}

/// Discovery configuration
pub fn config() -> AppConfig {
    AppConfig::new(TYPE, APP_NAMES.map(Bytes::from_static))
        .with_balances(read_balance)
        .with_extra_data(read_extra_records)
        .with_file_selectors((1..=5).map(FileSelector::new))
}

/// `EF_PURSE_INFO` from the application FCI
pub fn purse_info(app: &Application) -> Option<&[u8]> {
    farecard_tlv::find_hex(&app.fci, TAG_PURSE_INFO, false)
}

/// Card serial number from `EF_PURSE_INFO`, hex
pub fn serial_number(purse_info: &[u8]) -> Option<String> {
    purse_info.get(4..12).map(hex::encode)
}

/// Balance in won from a GET BALANCE answer
pub fn decode_balance(data: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(data.get(..4)?.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use farecard_apdu_core::{Iso7816Protocol, MockTransceiver, Transceiver};
    use hex_literal::hex;

    #[test]
    fn test_extra_records_stop_at_first_failure() {
        let mut mock = MockTransceiver::new([
            [vec![0x01; 16], hex!("9000").to_vec()].concat(),
            [vec![0x02; 16], hex!("9000").to_vec()].concat(),
            hex!("6a83").to_vec(),
        ]);
        let transceiver: &mut dyn Transceiver = &mut mock;
        let mut protocol = Iso7816Protocol::new(transceiver);
        let records = read_extra_records(&mut protocol).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records["extra/1"].as_ref(), &[0x02; 16]);
        assert_eq!(mock.remaining(), 0);
        assert_eq!(mock.commands[1].as_ref(), hex!("9078010010"));
    }

    #[test]
    fn test_purse_info_from_fci() {
        let app = Application {
            aid: Bytes::from_static(APP_NAMES[0]),
            fci: Bytes::copy_from_slice(&hex!(
                "6f 13 b0 11 00 01 02 03 1010 0100 0000 1234 00 00 00 00 00"
            )),
            files: BTreeMap::new(),
            sfi_files: BTreeMap::new(),
            type_tag: TYPE.into(),
        };
        let info = purse_info(&app).unwrap();
        assert_eq!(serial_number(info).as_deref(), Some("1010010000001234"));
        assert_eq!(decode_balance(&hex!("00002710")), Some(10_000));
    }
}
