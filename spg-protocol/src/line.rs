//! Line codec for controller byte streams.
//!
//! A controller terminates each reply with `\r\n` followed by an `ACK` byte.
//! [`SpgLineCodec`] yields one reply line per frame and drops terminators and `ACK`s.
//! Encoding writes commands verbatim since [`crate::codec::close_command`] already
//! appends the carriage return.
use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::ACK;

/// Default upper bound for a single line. Registry replies are the longest frames and
/// stay well below this.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

#[derive(Clone, Debug)]
pub struct SpgLineCodec {
    max_line_len: usize,
}

impl SpgLineCodec {
    pub fn new() -> SpgLineCodec {
        SpgLineCodec::default()
    }

    pub fn with_max_line_len(max_line_len: usize) -> SpgLineCodec {
        SpgLineCodec { max_line_len }
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }
}

impl Default for SpgLineCodec {
    fn default() -> Self {
        SpgLineCodec {
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

impl Decoder for SpgLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let leading = src
            .iter()
            .take_while(|&&b| is_terminator(b) || b == ACK)
            .count();
        src.advance(leading);

        match src.iter().position(|&b| is_terminator(b)) {
            Some(end) => {
                let line = src.split_to(end);
                src.advance(1);
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None if src.len() > self.max_line_len => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Line too long! Maximum is {}, but got {} bytes without terminator",
                    self.max_line_len,
                    src.len()
                ),
            )),
            None => Ok(None),
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for SpgLineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), io::Error> {
        let line = item.as_ref();
        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_replies_and_drops_ack() {
        let mut codec = SpgLineCodec::new();
        let mut buf = BytesMut::from(&b"/ECHO/3/\x160B\r\n\x06/LOGIN/OK/\x164A\r\n\x06"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("/ECHO/3/\x160B")
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("/LOGIN/OK/\x164A")
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_terminator() {
        let mut codec = SpgLineCodec::new();
        let mut buf = BytesMut::from(&b"/ECHO/"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"3/\x160B\r");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("/ECHO/3/\x160B")
        );
    }

    #[test]
    fn commands_end_with_carriage_return() {
        let mut codec = SpgLineCodec::new();
        let mut buf = BytesMut::from(&b"@&1/BKDOOR\x1663\r"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("@&1/BKDOOR\x1663")
        );
    }

    #[test]
    fn rejects_overlong_lines() {
        let mut codec = SpgLineCodec::with_max_line_len(8);
        let mut buf = BytesMut::from(&b"/0123456789"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn encodes_verbatim() {
        let mut codec = SpgLineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("@/\r", &mut buf).unwrap();
        assert_eq!(&buf[..], b"@/\r");
    }
}
