use std::fmt::Display;

use crate::error::FrameError;

/// Synchronous idle character that terminates the checksummed part of a frame.
pub const SYN: char = '\x16';

/// Acknowledge byte the controller sends after the line terminator of a reply.
pub const ACK: u8 = 0x06;

/// Longest command that may be sent to a controller, checksum suffix included.
pub const MAX_COMMAND_LEN: usize = 100;

/// Verb used to write configuration attributes.
pub const VERB_WRITE_CONFIG: &str = "WCFG";

/// An 8-bit frame checksum.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Checksum {
    byte: u8,
}

impl Checksum {
    pub fn new(byte: u8) -> Checksum {
        Checksum { byte }
    }

    /// The raw checksum byte
    pub fn byte(&self) -> u8 {
        self.byte
    }

    /// The checksum as it appears on the wire: two uppercase hex digits
    pub fn hex(&self) -> String {
        format!("{:02X}", self.byte)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X}", self.byte)
    }
}

/// Breakdown of a received frame.
///
/// The fields are kept as they were received, that is still escaped.
/// Use [`crate::codec::decode_value`] to obtain the actual value of a field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedFrame {
    error: FrameError,
    fields: Vec<String>,
    checksum: Checksum,
}

impl ParsedFrame {
    pub fn new(error: FrameError, fields: Vec<String>, checksum: Checksum) -> ParsedFrame {
        ParsedFrame {
            error,
            fields,
            checksum,
        }
    }

    /// A frame that could not be obtained or recognized at all.
    pub fn failed(error: FrameError) -> ParsedFrame {
        ParsedFrame {
            error,
            fields: Vec::new(),
            checksum: Checksum::default(),
        }
    }

    /// True if the frame matched the frame format and, when requested, its checksum was correct.
    pub fn is_valid(&self) -> bool {
        self.error == FrameError::Ok
    }

    /// Why the frame is not valid, [`FrameError::Ok`] otherwise
    pub fn error(&self) -> FrameError {
        self.error
    }

    /// All fields in order of appearance, the verb being the first one
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// The checksum as received
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }
}

impl Display for ParsedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{valid: {}, error: {}, fields: {{{}}}, checksum: {}}}",
            self.is_valid(),
            self.error,
            self.fields.join(", "),
            self.checksum
        )
    }
}

#[test]
fn checksum_formats_as_two_hex_digits() {
    assert_eq!(Checksum::new(0x0b).hex(), "0B");
    assert_eq!(Checksum::new(0xfe).to_string(), "FE");
}

#[test]
fn failed_frame_is_invalid() {
    let frame = ParsedFrame::failed(FrameError::Timeout);
    assert!(!frame.is_valid());
    assert!(frame.fields().is_empty());
    assert_eq!(frame.field(0), None);
}
