//! Tag-length-value decoders for smart card data
//!
//! The decoders here are deliberately lenient. Card data is frequently padded,
//! truncated or simply wrong, so malformed input ends iteration early instead
//! of raising an error:
//!
//! - [`BerTlv`]: BER-TLV as found in file control information
//! - [`SimpleTlv`]: ISO 7816-4 simple-TLV (1-byte tag, 1 or 3 byte length)
//! - [`CompactTlv`]: compact-TLV (tag and length packed in one byte)
//!
//! This is not an ASN.1 implementation. Only the tag and length forms needed
//! to walk nested constructed templates are understood.
//!
//! ```
//! use farecard_tlv::{BerTlv, find};
//!
//! let fci = hex::decode("6f0da50b8801029f0801ff5f2d0165").unwrap();
//! let template = find(&fci, &[0xa5], true, false).unwrap();
//! let tags: Vec<_> = BerTlv::new(template).map(|t| t.id().to_vec()).collect();
//! assert_eq!(tags, vec![vec![0x88], vec![0x9f, 0x08], vec![0x5f, 0x2d]]);
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

mod ber;
mod compact;
mod simple;
mod tree;

pub use ber::{BerTlv, Tlv, find, find_hex, find_repeated, is_constructed, remove_header};
pub use compact::CompactTlv;
pub use simple::SimpleTlv;
pub use tree::{MAX_DEPTH, TlvNode, tree};
