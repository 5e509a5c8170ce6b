//! Status word definitions for APDU responses

use std::fmt;

use tracing::Level;

/// Status Word (SW1-SW2) from an APDU response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Check if this status word indicates success (90 00)
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Check if SW1 reports normal processing (90 XX)
    ///
    /// Transit cards occasionally put proprietary data in SW2 of an otherwise
    /// successful answer, so only SW1 decides acceptance.
    pub const fn is_ok(&self) -> bool {
        self.sw1 == 0x90
    }

    /// Check if this status word indicates a warning (62 XX / 63 XX)
    pub const fn is_warning(&self) -> bool {
        self.sw1 == 0x62 || self.sw1 == 0x63
    }

    /// Check if this status word asks for a different Le (6C XX)
    pub const fn is_wrong_le(&self) -> bool {
        self.sw1 == 0x6C
    }

    /// The Le the card asked for when SW1 = 6C
    pub const fn corrected_le(&self) -> Option<u8> {
        if self.is_wrong_le() {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Check if the card reported a missing file or record (6A 82 / 6A 83)
    ///
    /// Discovery probes for these on every card, so they are not failures.
    pub const fn is_absence(&self) -> bool {
        self.sw1 == 0x6A && (self.sw2 == 0x82 || self.sw2 == 0x83)
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        if self.is_ok() || self.is_absence() {
            Level::DEBUG
        } else if self.is_warning() {
            Level::INFO
        } else {
            Level::WARN
        }
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "More data available",
            (0x62, 0x00) => "No information given",
            (0x62, 0x81) => "Part of returned data may be corrupted",
            (0x62, 0x82) => "End of file/record reached before reading Le bytes",
            (0x62, 0x83) => "Selected file invalidated",
            (0x63, n) if (n & 0xF0) == 0xC0 => "Counter value",
            (0x64, 0x00) => "State of non-volatile memory unchanged",
            (0x65, 0x81) => "Memory failure",
            (0x67, 0x00) => "Wrong length",
            (0x68, 0x81) => "Logical channel not supported",
            (0x69, 0x81) => "Command incompatible with file structure",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x83) => "Authentication method blocked",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x69, 0x86) => "Command not allowed (no current EF)",
            (0x6A, 0x81) => "Function not supported",
            (0x6A, 0x82) => "File not found",
            (0x6A, 0x83) => "Record not found",
            (0x6A, 0x86) => "Incorrect parameters P1-P2",
            (0x6A, 0x88) => "Referenced data not found",
            (0x6B, 0x00) => "Wrong parameters P1-P2",
            (0x6C, _) => "Wrong Le field",
            (0x6D, 0x00) => "Instruction code not supported or invalid",
            (0x6E, 0x00) => "Class not supported",
            (0x6F, 0x00) => "No precise diagnosis",
            (0x91, 0x00) => "DESFire operation ok",
            (0x91, 0xAF) => "DESFire additional frame",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_from_to_u16() {
        let sw = StatusWord::from_u16(0x9000);
        assert_eq!(sw.sw1, 0x90);
        assert_eq!(sw.sw2, 0x00);
        assert_eq!(sw.to_u16(), 0x9000);
    }

    #[test]
    fn test_status_word_is_methods() {
        assert!(StatusWord::new(0x90, 0x00).is_success());
        assert!(StatusWord::new(0x90, 0x01).is_ok());
        assert!(!StatusWord::new(0x90, 0x01).is_success());
        assert!(StatusWord::new(0x62, 0x83).is_warning());
        assert!(StatusWord::new(0x6A, 0x83).is_absence());
        assert!(!StatusWord::new(0x6A, 0x86).is_absence());
        assert_eq!(StatusWord::new(0x6C, 0x10).corrected_le(), Some(0x10));
        assert_eq!(StatusWord::new(0x90, 0x00).corrected_le(), None);
    }

    #[test]
    fn test_status_word_display_and_description() {
        assert_eq!(StatusWord::new(0x6A, 0x82).to_string(), "6A 82");
        assert_eq!(StatusWord::new(0x6A, 0x82).description(), "File not found");
        assert_eq!(StatusWord::new(0x12, 0x34).description(), "Unknown status word");
        assert_eq!(StatusWord::new(0x69, 0x82).tracing_level(), Level::WARN);
        assert_eq!(StatusWord::new(0x6A, 0x82).tracing_level(), Level::DEBUG);
        assert_eq!(StatusWord::new(0x62, 0x83).tracing_level(), Level::INFO);
        assert_eq!(StatusWord::new(0x90, 0x00).tracing_level(), Level::DEBUG);
    }
}
