//! # SPG Protocol Library
//!
//! This crate implements the SPG framed text protocol used by gCAU generator and
//! automation control units. Controllers are addressed over a serial link and answer
//! every request with a single checksummed reply frame.
//!
//! ## Overview
//!
//! The library covers the stateless parts of the protocol:
//!
//! - Checksum computation over a frame (up to and including the first `SYN`)
//! - Escaping and unescaping of field values
//! - Parsing of received frames into their raw fields
//! - Comparison of echoed reply fields against requested values
//! - The challenge computation used by the backdoor login
//!
//! Anything that owns a serial port or a timer lives in `gcau-client`.
//!
//! ## Frame Format
//!
//! - **Command**: `@[slave][&channel]/VERB/arg1/.../argN<SYN><checksum><CR>`
//! - **Reply**: `/field1/field2/.../fieldN/<SYN><checksum>` followed by `\r\n` and an `ACK` byte
//!
//! A `/` inside a field is written `\/` and is not a delimiter. The checksum is the
//! two's-complement of the 8-bit byte sum, written as two uppercase hex digits.
//!
//! ## Basic Usage
//!
//! ### Closing a command
//!
//! ```
//! use spg_protocol::codec::close_command;
//!
//! let command = close_command("@&1/BKDOOR");
//! assert_eq!(command, "@&1/BKDOOR\x1663\r");
//! ```
//!
//! ### Parsing a reply
//!
//! ```
//! use spg_protocol::{FrameError, codec::parse_frame};
//!
//! let frame = parse_frame("/ECHO/3/\x160B\r\n", true);
//! assert!(frame.is_valid());
//! assert_eq!(frame.field(0), Some("ECHO"));
//! assert_eq!(frame.field(1), Some("3"));
//!
//! let broken = parse_frame("/ECHO/3/\x1600", true);
//! assert_eq!(broken.error(), FrameError::WrongChecksum);
//! ```
//!
//! ### Escaping values
//!
//! ```
//! use spg_protocol::codec::{decode_value, encode_value};
//!
//! let escaped = encode_value("10/20: a_b");
//! assert_eq!(escaped, "10\\/20\\: a\\_b");
//! assert_eq!(decode_value(&escaped), "10/20: a_b");
//! ```
//!
//! ## Error Handling
//!
//! Protocol operations never fail with an error type. They report one
//! [`error::FrameError`] kind, with [`error::FrameError::Ok`] on success.
//!
//! ## Async Support
//!
//! With the `tokio` feature, [`line::SpgLineCodec`] splits a controller byte
//! stream into reply lines for use with `tokio-util`.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
pub use error::FrameError;
#[cfg(feature = "tokio")]
pub mod line;
