//! Contactless fare card scanning
//!
//! A [`Scanner`] runs one thread per [`ReaderBackend`] and merges what they
//! see into a single [`ScanEvent`] stream plus a progress stream. Two
//! backends ship with the crate:
//!
//! - [`pcsc::PcscBackend`] for any PC/SC reader
//! - [`pn533::Pn533Backend`] for PN533-family chips over raw USB
//!
//! Both are thin [`TargetDriver`]s around the shared [`run_poll_loop`], which
//! detects a card, reads it once, and waits for it to leave the field before
//! polling again.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cancel;
mod config;
mod driver;
mod error;
mod event;
pub mod pcsc;
pub mod pn533;
mod scanner;

pub use backend::ReaderBackend;
pub use cancel::CancellationToken;
pub use config::ScannerConfig;
pub use driver::{ScanContext, TargetDriver, run_poll_loop};
pub use error::{Result, ScanError};
pub use event::{
    ProgressReceiver, ProgressSender, ScanEvent, ScanEventReceiver, ScanEventSender, TargetFamily,
};
pub use scanner::Scanner;
