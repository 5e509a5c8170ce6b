//! Chinese transit cards (Shenzhen Tong and the PBOC-based city cards)

use std::collections::BTreeMap;

use bytes::Bytes;
use farecard_apdu_core::Result;
use farecard_apdu_core::command::CLASS_80;
use tracing::debug;

use super::discovery::{AppConfig, FileSelector, Protocol};

/// Family tag
pub const TYPE: &str = "china";

/// `PAY.SZT`, Shenzhen Tong
pub const AID_SZT: &[u8] = b"PAY.SZT";
/// PBOC transit application
pub const AID_PBOC_TRANSIT: &[u8] = &[0xA0, 0x00, 0x00, 0x06, 0x32, 0x01, 0x01, 0x05];
/// Beijing/Wuhan style transit application
pub const AID_CITY_UNION: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x86, 0x98, 0x07, 0x01];

/// Sub-DF holding transit files on some cards
pub const TRANSIT_DF: u16 = 0x1001;

const FILE_IDS: [u16; 8] = [4, 5, 8, 9, 10, 21, 24, 25];

const INS_GET_BALANCE: u8 = 0x5C;
const BALANCE_LEN: u8 = 4;

/// Probe the four balance slots with GET BALANCE
///
/// Any slot may be missing, so failures are dropped.
pub fn read_balances(protocol: &mut Protocol<'_>) -> Result<BTreeMap<usize, Bytes>> {
    let mut balances = BTreeMap::new();
    for index in 0..4u8 {
        match protocol.send(CLASS_80, INS_GET_BALANCE, index, 0x02, BALANCE_LEN, &[]) {
            Ok(balance) => {
                balances.insert(index as usize, balance);
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => debug!(index, error = %e, "Balance slot not readable"),
        }
    }
    Ok(balances)
}

/// Discovery configuration
pub fn config() -> AppConfig {
    let selectors = FILE_IDS
        .iter()
        .flat_map(|&id| [FileSelector::new(id), FileSelector::under(TRANSIT_DF, id)]);

    AppConfig::new(
        TYPE,
        [
            Bytes::from_static(AID_SZT),
            Bytes::from_static(AID_PBOC_TRANSIT),
            Bytes::from_static(AID_CITY_UNION),
        ],
    )
    .with_balances(read_balances)
    .with_file_selectors(selectors)
}

/// Balance in fen from a GET BALANCE answer
///
/// The top bit of the 32-bit value is set for negative balances.
pub fn decode_balance(data: &[u8]) -> Option<i64> {
    let raw = u32::from_be_bytes(data.get(..4)?.try_into().ok()?);
    let value = i64::from(raw & 0x7FFF_FFFF);
    Some(if raw & 0x8000_0000 != 0 { -value } else { value })
}
