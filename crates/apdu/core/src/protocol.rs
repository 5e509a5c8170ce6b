//! ISO 7816-4 command/response protocol
//!
//! [`Iso7816Protocol`] frames commands, interprets status words, retries once
//! when the card reports a wrong Le, and offers the SELECT / READ operations
//! that application discovery is built from.

use bytes::Bytes;
use tracing::{Level, debug, info, warn};

use crate::command::{CLASS_ISO7816, Command, INS_READ_BINARY, INS_READ_RECORD, INS_SELECT};
use crate::error::{Error, Result};
use crate::response::status::StatusWord;
use crate::response::utils::extract_status_and_payload;
use crate::transport::Transceiver;

/// SELECT P1: select by DF name
const SELECT_BY_NAME: u8 = 0x04;
/// SELECT P2: next occurrence
const SELECT_NEXT_OCCURRENCE: u8 = 0x02;

/// Log a final status word at the level it calls for
fn log_status(command: &Command, status: StatusWord) {
    let level = status.tracing_level();
    let description = status.description();
    if level == Level::WARN {
        warn!(ins = command.ins, %status, description, "Command refused");
    } else if level == Level::INFO {
        info!(ins = command.ins, %status, description, "Command completed with warning");
    } else {
        debug!(ins = command.ins, %status, description, "Command completed");
    }
}

/// ISO 7816-4 protocol layer over a single transceiver
///
/// Calls must not overlap on the same transceiver; `&mut self` enforces it.
#[derive(Debug)]
pub struct Iso7816Protocol<T> {
    transceiver: T,
}

impl<T: Transceiver> Iso7816Protocol<T> {
    /// Wrap a transceiver
    pub const fn new(transceiver: T) -> Self {
        Self { transceiver }
    }

    /// Access the underlying transceiver
    pub fn transceiver(&mut self) -> &mut T {
        &mut self.transceiver
    }

    /// Release the underlying transceiver
    pub fn into_inner(self) -> T {
        self.transceiver
    }

    fn send_real(&mut self, command: &Command) -> Result<Bytes> {
        let response = self.transceiver.transceive(&command.to_bytes())?;
        if response.len() < 2 {
            return Err(Error::MalformedResponse(response.len()));
        }
        Ok(response)
    }

    /// Send a command and return the response body
    ///
    /// A `6C XX` answer is retried exactly once with `Le = XX`. Any status
    /// other than `90 XX` afterwards is mapped through [`Error::from_status`].
    pub fn send(
        &mut self,
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        le: u8,
        params: &[u8],
    ) -> Result<Bytes> {
        let mut command = Command::new(cla, ins, p1, p2)
            .with_data(Bytes::copy_from_slice(params))
            .with_le(le);
        self.send_command(&mut command)
    }

    /// Send a prepared command, see [`Iso7816Protocol::send`]
    pub fn send_command(&mut self, command: &mut Command) -> Result<Bytes> {
        let mut response = self.send_real(command)?;
        let (mut status, _) = extract_status_and_payload(&response)?;

        if let Some(le) = status.corrected_le() {
            if le != command.le {
                debug!(
                    requested = command.le,
                    corrected = le,
                    "Card asked for a different Le, retrying"
                );
                command.le = le;
                response = self.send_real(command)?;
                status = extract_status_and_payload(&response)?.0;
            }
        }

        log_status(command, status);
        if !status.is_ok() {
            return Err(Error::from_status(status));
        }

        Ok(response.slice(..response.len() - 2))
    }

    /// SELECT by DF name (AID)
    pub fn select_by_name(&mut self, name: &[u8], next_occurrence: bool) -> Result<Bytes> {
        let p2 = if next_occurrence {
            SELECT_NEXT_OCCURRENCE
        } else {
            0x00
        };
        self.send(CLASS_ISO7816, INS_SELECT, SELECT_BY_NAME, p2, 0, name)
    }

    /// SELECT by DF name, returning `None` when the card refuses
    ///
    /// Transport failures still propagate.
    pub fn select_by_name_or_none(&mut self, name: &[u8]) -> Result<Option<Bytes>> {
        absent_on_refusal(self.select_by_name(name, false))
    }

    /// SELECT with an empty path, resetting the current file
    pub fn unselect(&mut self) -> Result<()> {
        self.send(CLASS_ISO7816, INS_SELECT, 0x00, 0x00, 0, &[])
            .map(|_| ())
    }

    /// SELECT by 2-byte file identifier
    pub fn select_by_id(&mut self, file_id: u16) -> Result<Bytes> {
        self.send(CLASS_ISO7816, INS_SELECT, 0x00, 0x00, 0, &file_id.to_be_bytes())
    }

    /// READ RECORD from the current file
    ///
    /// Returns `Ok(None)` if the card refuses the read; [`Error::EndOfFile`]
    /// and transport failures propagate.
    pub fn read_record(&mut self, record: u8) -> Result<Option<Bytes>> {
        speculative(self.send(CLASS_ISO7816, INS_READ_RECORD, record, 0x04, 0, &[]))
    }

    /// READ RECORD from a short file identifier
    pub fn read_record_sfi(&mut self, sfi: u8, record: u8) -> Result<Option<Bytes>> {
        let p2 = (sfi << 3) | 0x04;
        speculative(self.send(CLASS_ISO7816, INS_READ_RECORD, record, p2, 0, &[]))
    }

    /// READ BINARY from the current file
    pub fn read_binary(&mut self) -> Result<Option<Bytes>> {
        speculative(self.send(CLASS_ISO7816, INS_READ_BINARY, 0x00, 0x00, 0, &[]))
    }

    /// READ BINARY from a short file identifier
    pub fn read_binary_sfi(&mut self, sfi: u8) -> Result<Option<Bytes>> {
        speculative(self.send(CLASS_ISO7816, INS_READ_BINARY, 0x80 | sfi, 0x00, 0, &[]))
    }
}

/// Reads keep [`Error::EndOfFile`] as a loop terminator and turn every other
/// refusal into "no data".
fn speculative(result: Result<Bytes>) -> Result<Option<Bytes>> {
    match result {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.is_transport() || e.is_end_of_file() => Err(e),
        Err(_) => Ok(None),
    }
}

fn absent_on_refusal(result: Result<Bytes>) -> Result<Option<Bytes>> {
    match result {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.is_transport() => Err(e),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransceiver;
    use crate::{StatusWord, TransportError};
    use hex_literal::hex;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;

    /// Collects the level of every status event
    #[derive(Debug, Clone, Default)]
    struct StatusLevels(Arc<Mutex<Vec<Level>>>);

    impl<S: tracing::Subscriber> Layer<S> for StatusLevels {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().fields().field("status").is_some() {
                self.0.lock().unwrap().push(*event.metadata().level());
            }
        }
    }

    fn status_levels(responses: &[&[u8]]) -> Vec<Level> {
        let levels = StatusLevels::default();
        let _guard = tracing_subscriber::registry()
            .with(levels.clone())
            .set_default();

        let mut p = protocol(responses);
        for _ in responses {
            let _ = p.send(0x00, 0xB0, 0x00, 0x00, 0, &[]);
        }
        let levels = levels.0.lock().unwrap().clone();
        levels
    }

    fn protocol(responses: &[&[u8]]) -> Iso7816Protocol<MockTransceiver> {
        let responses = responses.iter().map(|r| Bytes::copy_from_slice(r));
        Iso7816Protocol::new(MockTransceiver::new(responses))
    }

    #[test]
    fn test_send_strips_status_word() {
        let mut p = protocol(&[&hex!("0102039000")]);
        let body = p.send(0x00, 0xB0, 0x00, 0x00, 0, &[]).unwrap();
        assert_eq!(body.as_ref(), &hex!("010203"));
        assert_eq!(p.transceiver().commands[0].as_ref(), &hex!("00B0000000"));
    }

    #[test]
    fn test_wrong_length_retries_once() {
        let mut p = protocol(&[&hex!("6C10"), &hex!("AABB9000")]);
        let body = p.send(0x00, 0xB2, 0x01, 0x0C, 0, &[]).unwrap();
        assert_eq!(body.as_ref(), &hex!("AABB"));

        let commands = &p.transceiver().commands;
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].as_ref(), &hex!("00B2010C00"));
        assert_eq!(commands[1].as_ref(), &hex!("00B2010C10"));
    }

    #[test]
    fn test_wrong_length_never_retries_twice() {
        let mut p = protocol(&[&hex!("6C10"), &hex!("6C20"), &hex!("9000")]);
        let err = p.send(0x00, 0xB2, 0x01, 0x0C, 0, &[]).unwrap_err();
        assert_eq!(err, Error::Protocol(StatusWord::new(0x6C, 0x20)));
        assert_eq!(p.transceiver().commands.len(), 2);
        assert_eq!(p.transceiver().remaining(), 1);
    }

    #[test]
    fn test_wrong_length_matching_le_is_not_retried() {
        let mut p = protocol(&[&hex!("6C04")]);
        let err = p.send(0x80, 0x5C, 0x00, 0x02, 4, &[]).unwrap_err();
        assert_eq!(err, Error::Protocol(StatusWord::new(0x6C, 0x04)));
        assert_eq!(p.transceiver().commands.len(), 1);
    }

    #[test]
    fn test_status_mapping() {
        let cases: [(&[u8], Error); 9] = [
            (&hex!("6986"), Error::NoCurrentElementaryFile),
            (&hex!("6982"), Error::SecurityStatusNotSatisfied),
            (&hex!("6985"), Error::CommandNotAllowed(StatusWord::new(0x69, 0x85))),
            (&hex!("6A82"), Error::FileNotFound),
            (&hex!("6A83"), Error::EndOfFile),
            (&hex!("6A86"), Error::WrongParameters(StatusWord::new(0x6A, 0x86))),
            (&hex!("6D00"), Error::InstructionNotSupported),
            (&hex!("6E00"), Error::ClassNotSupported),
            (&hex!("6F00"), Error::Protocol(StatusWord::new(0x6F, 0x00))),
        ];
        for (response, expected) in cases {
            let mut p = protocol(&[response]);
            assert_eq!(p.send(0x00, 0xA4, 0x04, 0x00, 0, &[0x01]).unwrap_err(), expected);
        }
    }

    #[test]
    fn test_one_byte_response_is_malformed() {
        let mut p = protocol(&[&hex!("90")]);
        assert_eq!(
            p.send(0x00, 0xA4, 0x00, 0x00, 0, &[]).unwrap_err(),
            Error::MalformedResponse(1)
        );
    }

    #[test]
    fn test_select_commands() {
        let mut p = protocol(&[
            &hex!("6F009000"),
            &hex!("9000"),
            &hex!("9000"),
            &hex!("9000"),
        ]);
        let fci = p.select_by_name(&hex!("D4100000030001"), false).unwrap();
        assert_eq!(fci.as_ref(), &hex!("6F00"));
        p.select_by_name(&hex!("D4100000030001"), true).unwrap();
        p.select_by_id(0x1001).unwrap();
        p.unselect().unwrap();

        let commands = &p.transceiver().commands;
        assert_eq!(commands[0].as_ref(), &hex!("00A4040007D410000003000100"));
        assert_eq!(commands[1].as_ref(), &hex!("00A4040207D410000003000100"));
        assert_eq!(commands[2].as_ref(), &hex!("00A4000002100100"));
        assert_eq!(commands[3].as_ref(), &hex!("00A4000000"));
    }

    #[test]
    fn test_read_commands_encode_sfi() {
        let mut p = protocol(&[&hex!("9000") as &[u8]; 4]);
        p.read_record(2).unwrap();
        p.read_record_sfi(3, 1).unwrap();
        p.read_binary().unwrap();
        p.read_binary_sfi(0x15).unwrap();

        let commands = &p.transceiver().commands;
        assert_eq!(commands[0].as_ref(), &hex!("00B2020400"));
        assert_eq!(commands[1].as_ref(), &hex!("00B2011C00"));
        assert_eq!(commands[2].as_ref(), &hex!("00B0000000"));
        assert_eq!(commands[3].as_ref(), &hex!("00B0950000"));
    }

    #[test]
    fn test_reads_absorb_refusals_but_not_eof() {
        let mut p = protocol(&[&hex!("6982"), &hex!("6A83"), &hex!("6A82")]);
        assert_eq!(p.read_record_sfi(1, 1).unwrap(), None);
        assert_eq!(p.read_record_sfi(1, 2).unwrap_err(), Error::EndOfFile);
        assert_eq!(p.read_binary_sfi(1).unwrap(), None);
    }

    #[test]
    fn test_transport_errors_propagate_through_probes() {
        let mut mock = MockTransceiver::new(Vec::<Bytes>::new());
        mock.push_error(TransportError::Device);
        mock.push(Bytes::copy_from_slice(&hex!("6A82")));
        let mut p = Iso7816Protocol::new(mock);

        assert_eq!(
            p.select_by_name_or_none(&hex!("A0000000")).unwrap_err(),
            Error::Transport(TransportError::Device)
        );
        assert_eq!(p.select_by_name_or_none(&hex!("A0000000")).unwrap(), None);
    }

    #[test]
    fn test_status_logged_at_its_level() {
        let levels = status_levels(&[&hex!("9000"), &hex!("6283"), &hex!("6A82"), &hex!("6982")]);
        assert_eq!(
            levels,
            [Level::DEBUG, Level::INFO, Level::DEBUG, Level::WARN]
        );
    }
}
