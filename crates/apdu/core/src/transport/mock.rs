//! Scripted transceiver for tests

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use super::{Transceiver, TransportError};

type Handler = Box<dyn FnMut(&[u8]) -> Result<Bytes, TransportError> + Send>;

/// A transceiver that replays canned responses and records every command
///
/// Either a fixed queue of responses is consumed in order, or a handler
/// decides the answer from the command bytes.
pub struct MockTransceiver {
    responses: VecDeque<Result<Bytes, TransportError>>,
    handler: Option<Handler>,
    /// Commands that were sent
    pub commands: Vec<Bytes>,
}

impl MockTransceiver {
    /// Create a mock that returns the given responses in order
    pub fn new<I, B>(responses: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            responses: responses.into_iter().map(|r| Ok(r.into())).collect(),
            handler: None,
            commands: Vec::new(),
        }
    }

    /// Create a mock whose answers are computed from each command
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: FnMut(&[u8]) -> Result<Bytes, TransportError> + Send + 'static,
    {
        Self {
            responses: VecDeque::new(),
            handler: Some(Box::new(handler)),
            commands: Vec::new(),
        }
    }

    /// Queue one more response
    pub fn push(&mut self, response: impl Into<Bytes>) {
        self.responses.push_back(Ok(response.into()));
    }

    /// Queue a transport failure
    pub fn push_error(&mut self, error: TransportError) {
        self.responses.push_back(Err(error));
    }

    /// Number of queued responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

impl fmt::Debug for MockTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransceiver")
            .field("responses", &self.responses)
            .field("handler", &self.handler.is_some())
            .field("commands", &self.commands)
            .finish()
    }
}

impl Transceiver for MockTransceiver {
    fn do_transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.commands.push(Bytes::copy_from_slice(command));

        if let Some(handler) = self.handler.as_mut() {
            return handler(command);
        }

        self.responses
            .pop_front()
            .unwrap_or(Err(TransportError::Transmission))
    }
}
