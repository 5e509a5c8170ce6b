//! ISO 7816-4 cards
//!
//! Applications are found by SELECTing the AIDs of each [`AppConfig`] in
//! turn. Once selected, every SFI in the configured range is scanned for
//! records and binary data, the explicit file selectors are read, and the
//! family's proprietary balance and extra readers run last.
//!
//! [`Iso7816Dispatcher`] is the entry point for ISO-DEP cards: it falls back
//! to the DESFire and CEPAS readers when no application answers.

pub mod china;
mod discovery;
mod dispatch;
pub mod ksx6924;
mod model;

pub use discovery::{
    AppConfig, BalanceReader, ExtraDataReader, FileSelector, Protocol, discover,
};
pub use dispatch::Iso7816Dispatcher;
pub use model::{Application, File, Iso7816Capture};

/// Application configurations probed by default
pub fn builtin_configs() -> Vec<AppConfig> {
    vec![china::config(), ksx6924::config()]
}
