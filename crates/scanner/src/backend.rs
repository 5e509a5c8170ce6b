//! Reader backends

use std::fmt;

use crate::driver::ScanContext;
use crate::error::Result;

/// One piece of reader hardware, scanned on its own thread
///
/// `run` opens the hardware, typically hands a [`crate::TargetDriver`] to
/// [`crate::run_poll_loop`], and only returns once the context is cancelled or
/// the hardware fails.
pub trait ReaderBackend: Send + fmt::Debug {
    /// Name used in events and logs
    fn name(&self) -> &str;

    /// Scan until cancelled
    fn run(&mut self, ctx: &ScanContext) -> Result<()>;
}

impl<T: ReaderBackend + ?Sized> ReaderBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&mut self, ctx: &ScanContext) -> Result<()> {
        (**self).run(ctx)
    }
}
