//! Byte pipe to the chip

use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// Raw bulk endpoint pair of a PN533-family device
pub trait BulkIo: Send + std::fmt::Debug {
    /// Write one frame to the OUT endpoint
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()>;

    /// Read one transfer from the IN endpoint, `None` if nothing arrived in time
    fn read(&mut self, timeout: Duration) -> Result<Option<Bytes>>;
}

impl<T: BulkIo + ?Sized> BulkIo for Box<T> {
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        (**self).write(data, timeout)
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).read(timeout)
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    //! Scripted chip for tests

    use std::collections::VecDeque;
    use std::time::Duration;

    use bytes::Bytes;

    use super::BulkIo;
    use crate::error::Result;
    use crate::frame;

    type Chip = Box<dyn FnMut(u8, &[u8]) -> Option<std::result::Result<Vec<u8>, u8>> + Send>;

    /// Simulated chip answering host frames
    ///
    /// The handler gets the command code and data of every host frame. `None`
    /// acknowledges without answering, `Err(code)` answers with an error frame.
    pub struct MockBulk {
        /// Raw frames written by the host
        pub written: Vec<Bytes>,
        pending: VecDeque<Bytes>,
        chip: Chip,
    }

    impl std::fmt::Debug for MockBulk {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockBulk")
                .field("written", &self.written.len())
                .field("pending", &self.pending.len())
                .finish()
        }
    }

    impl MockBulk {
        /// Create a chip driven by `handler`
        pub fn new<F>(handler: F) -> Self
        where
            F: FnMut(u8, &[u8]) -> Option<std::result::Result<Vec<u8>, u8>> + Send + 'static,
        {
            Self {
                written: Vec::new(),
                pending: VecDeque::new(),
                chip: Box::new(handler),
            }
        }

        /// Queue raw bytes to be read before anything else
        pub fn queue(&mut self, bytes: impl Into<Bytes>) {
            self.pending.push_back(bytes.into());
        }

        /// Command codes written so far, ACKs excluded
        pub fn commands(&self) -> Vec<u8> {
            self.written
                .iter()
                .filter_map(|raw| frame::decode_command(raw).ok())
                .map(|(code, _)| code)
                .collect()
        }
    }

    impl BulkIo for MockBulk {
        fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<()> {
            self.written.push(Bytes::copy_from_slice(data));
            if data == frame::ACK {
                return Ok(());
            }

            let (code, payload) = frame::decode_command(data)?;
            self.pending.push_back(Bytes::from_static(&frame::ACK));
            match (self.chip)(code, &payload) {
                Some(Ok(response)) => self
                    .pending
                    .push_back(frame::encode_response(code.wrapping_add(1), &response)),
                Some(Err(error)) => self.pending.push_back(frame::encode_error(error)),
                None => {}
            }
            Ok(())
        }

        fn read(&mut self, _timeout: Duration) -> Result<Option<Bytes>> {
            Ok(self.pending.pop_front())
        }
    }
}
