/// Encoding and decoding of SPG frames and field values
use crate::{
    error::FrameError,
    protocol::{Checksum, ParsedFrame, SYN},
};

const ESCAPE: char = '\\';
const DELIMITER: char = '/';
const SYN_BYTE: u8 = SYN as u8;
const EPSILON: f64 = 1e-4;

/// Computes the checksum of a frame.
///
/// The bytes up to and including the first `SYN` are summed (the whole string if there is
/// no `SYN`), truncated to 8 bits and negated. Characters outside of ASCII count as `?`.
pub fn checksum(frame: &str) -> Checksum {
    let mut sum: u8 = 0;
    for c in frame.chars() {
        let byte = if c.is_ascii() { c as u8 } else { b'?' };
        sum = sum.wrapping_add(byte);
        if byte == SYN_BYTE {
            break;
        }
    }
    Checksum::new(sum.wrapping_neg())
}

/// Appends `SYN`, the checksum and a carriage return to a command.
pub fn close_command(body: &str) -> String {
    let mut closed = String::with_capacity(body.len() + 4);
    closed.push_str(body);
    closed.push(SYN);
    let checksum = checksum(&closed);
    closed.push_str(&checksum.hex());
    closed.push('\r');
    closed
}

/// Escapes a value so that it can be sent as a field.
///
/// Characters are folded into 7 bits first, so anything outside of ASCII is
/// transmitted as `c mod 128`.
pub fn encode_value(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    for c0 in raw.chars() {
        let c = (c0 as u32 % 128) as u8;
        match c {
            b'/' => result.push_str("\\/"),
            b':' => result.push_str("\\:"),
            0x00 => result.push_str("\\0"),
            0x07 => result.push_str("\\a"),
            0x08 => result.push_str("\\b"),
            0x0c => result.push_str("\\f"),
            b'\n' => result.push_str("\\n"),
            b'\r' => result.push_str("\\r"),
            b'\t' => result.push_str("\\t"),
            0x0b => result.push_str("\\v"),
            b'\\' => result.push_str("\\\\"),
            b'~' => result.push_str("\\~"),
            b'$' => result.push_str("\\$"),
            b'&' => result.push_str("\\&"),
            b'@' => result.push_str("\\@"),
            b'_' => result.push_str("\\_"),
            0x7f => result.push_str("\\d"),
            0x20..=0x7e => result.push(c as char),
            _ => {
                result.push_str("\\c");
                result.push((c + 0x40) as char);
            }
        }
    }
    result
}

/// Reverts [`encode_value`].
///
/// Decoding never fails: an unknown escape yields the escaped character itself, and a
/// trailing backslash or an incomplete `\c` sequence is dropped.
pub fn decode_value(escaped: &str) -> String {
    let mut result = String::with_capacity(escaped.len());
    let mut escaped_char = false;
    let mut control_char = false;
    for c in escaped.chars() {
        if control_char {
            if ('\x40'..='\x5f').contains(&c) {
                result.push(((c as u8) - 0x40) as char);
            }
            escaped_char = false;
            control_char = false;
        } else if escaped_char {
            match c {
                '0' => result.push('\0'),
                'a' => result.push('\x07'),
                'b' => result.push('\x08'),
                'c' => control_char = true,
                'd' => result.push('\x7f'),
                'f' => result.push('\x0c'),
                'n' => result.push('\n'),
                'r' => result.push('\r'),
                't' => result.push('\t'),
                'v' => result.push('\x0b'),
                '<' => result.push('\x1c'),
                '?' => result.push('\x1f'),
                other => result.push(other),
            }
            escaped_char = false;
        } else if c == ESCAPE {
            escaped_char = true;
        } else {
            result.push(c);
        }
    }
    result
}

/// Length of the escape sequence starting at the backslash at `i`.
/// A `\cX` control sequence is one unit, since `X` may itself be a backslash.
fn escape_len(bytes: &[u8], i: usize) -> usize {
    match bytes.get(i + 1) {
        Some(b'c') => 3,
        _ => 2,
    }
}

/// Splits text on every `/` that is not escaped. Fields are returned still escaped.
pub fn split_fields(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut fields = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += escape_len(bytes, i),
            b'/' => {
                fields.push(&text[start..i]);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    fields.push(&text[start.min(text.len())..]);
    fields
}

/// Locates the frame trailer `/<SYN><hex><hex>`.
/// Returns the index of the slash and the received checksum.
fn find_trailer(text: &str) -> Option<(usize, Checksum)> {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += escape_len(bytes, i),
            b'/' => {
                if let Some(checksum) = trailer_checksum(&bytes[i + 1..]) {
                    return Some((i, checksum));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

fn trailer_checksum(rest: &[u8]) -> Option<Checksum> {
    match rest {
        [SYN_BYTE, high, low, ..] => {
            let high = upper_hex_digit(*high)?;
            let low = upper_hex_digit(*low)?;
            Some(Checksum::new(high << 4 | low))
        }
        _ => None,
    }
}

fn upper_hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Parses a received frame of the form `/field/.../field/<SYN><checksum>`.
///
/// Anything following the checksum (typically the line terminator) is ignored.
/// If `verify_checksum` is set, the received checksum must match the computed one.
pub fn parse_frame(text: &str, verify_checksum: bool) -> ParsedFrame {
    if !text.starts_with(DELIMITER) {
        return ParsedFrame::failed(FrameError::WrongFrameFormat);
    }
    let Some((end, received)) = find_trailer(text) else {
        return ParsedFrame::failed(FrameError::WrongFrameFormat);
    };
    let fields = split_fields(&text[1..end])
        .into_iter()
        .map(str::to_owned)
        .collect();
    let error = if !verify_checksum || checksum(text) == received {
        FrameError::Ok
    } else {
        FrameError::WrongChecksum
    };
    ParsedFrame::new(error, fields, received)
}

/// Returns the error a controller explicitly reported with an `#ERROR <code>` reply.
/// For any other frame, the frame's own error kind is returned.
pub fn explicit_error(frame: &ParsedFrame) -> FrameError {
    match (frame.is_valid(), frame.field(0), frame.field(1)) {
        (true, Some("#ERROR"), Some(code)) => FrameError::from_reply_code(code),
        _ => frame.error(),
    }
}

/// Compares a replied field against the requested one.
///
/// Both must be given in the same form (both escaped or both decoded).
/// A reply made only of asterisks is a masked password and always matches.
/// Otherwise fields match if they are equal, or if they split into the same number of
/// space-separated tokens that are pairwise equal or numerically close.
pub fn compare_reply_field(requested: &str, replied: &str) -> bool {
    if !replied.is_empty() && replied.chars().all(|c| c == '*') {
        return true;
    }
    if requested == replied {
        return true;
    }
    let requests: Vec<&str> = requested.split(' ').collect();
    let replies: Vec<&str> = replied.split(' ').collect();
    if requests.len() != replies.len() {
        return false;
    }
    requests
        .iter()
        .zip(replies.iter())
        .all(|(request, reply)| request == reply || numbers_are_close(request, reply))
}

fn numbers_are_close(requested: &str, replied: &str) -> bool {
    match (requested.parse::<f64>(), replied.parse::<f64>()) {
        (Ok(f1), Ok(f2)) => {
            (f1 == 0.0 && f2.abs() < EPSILON) || ((f1 - f2) / f1).abs() < EPSILON
        }
        _ => false,
    }
}

/// Computes the reply to a backdoor login challenge made of three digits.
/// Returns `None` if the challenge is not exactly three ASCII digits.
pub fn backdoor_challenge_reply(challenge: &str) -> Option<String> {
    let digits: Vec<u32> = challenge
        .chars()
        .map(|c| c.to_digit(10))
        .collect::<Option<_>>()?;
    let [a, b, c] = digits[..] else {
        return None;
    };
    let z = (b + c + 2) % 10;
    let y = (z + b + 5) % 10;
    let x = (a + y + 7) % 10;
    Some(format!("{}{}{}", x, y, z))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checksum_stops_at_syn() {
        assert_eq!(checksum("/ECHO/3/\x16").hex(), "0B");
        assert_eq!(checksum("/ECHO/3/\x16garbage").hex(), "0B");
        assert_eq!(checksum("abc").hex(), "DA");
        assert_eq!(checksum("").byte(), 0);
    }

    #[test]
    fn checksum_counts_non_ascii_as_question_mark() {
        assert_eq!(checksum("é"), checksum("?"));
    }

    #[test]
    fn close_command_appends_trailer() {
        assert_eq!(close_command("@&1/BKDOOR"), "@&1/BKDOOR\x1663\r");
    }

    #[test]
    fn closed_frames_parse_with_valid_checksum() {
        for body in ["/ECHO/3/", "/a\\/b/c/", "/RCFG/REGISTRY/1.0/2.0/", "//"] {
            let frame = parse_frame(&close_command(body), true);
            assert!(frame.is_valid(), "{} did not parse: {}", body, frame);
        }
    }

    #[test]
    fn escaped_slash_is_not_a_delimiter() {
        let frame = parse_frame(&close_command("/WCFG/ANIX_1/10\\/20/"), true);
        assert_eq!(frame.fields(), &["WCFG", "ANIX_1", "10\\/20"]);
    }

    #[test]
    fn empty_fields_are_kept() {
        let frame = parse_frame(&close_command("/RCFG//x/"), true);
        assert_eq!(frame.fields(), &["RCFG", "", "x"]);
        let frame = parse_frame(&close_command("//"), true);
        assert_eq!(frame.fields(), &[""]);
    }

    #[test]
    fn malformed_frames() {
        for text in [
            "",
            "ECHO/3/\x160B",
            "/ECHO/3\x160B",
            "/ECHO/3/\x160b",
            "/ECHO/3/\x160",
            "/\x1600",
            "/ECHO/3\\/\x160B",
        ] {
            assert_eq!(
                parse_frame(text, false).error(),
                FrameError::WrongFrameFormat,
                "{:?}",
                text
            );
        }
    }

    #[test]
    fn wrong_checksum_is_detected_only_when_verified() {
        let frame = parse_frame("/ECHO/3/\x1600", true);
        assert_eq!(frame.error(), FrameError::WrongChecksum);
        assert_eq!(frame.fields(), &["ECHO", "3"]);
        assert_eq!(frame.checksum().byte(), 0);
        assert!(parse_frame("/ECHO/3/\x1600", false).is_valid());
    }

    #[test]
    fn encode_escapes_reserved_characters() {
        assert_eq!(encode_value("a/b:c"), "a\\/b\\:c");
        assert_eq!(encode_value("~$&@_\\"), "\\~\\$\\&\\@\\_\\\\");
        assert_eq!(encode_value("\n\r\t\x07\x08\x0c\x0b\0"), "\\n\\r\\t\\a\\b\\f\\v\\0");
        assert_eq!(encode_value("\x7f"), "\\d");
        assert_eq!(encode_value("\x01\x1b"), "\\cA\\c[");
        assert_eq!(encode_value("plain text 123"), "plain text 123");
    }

    #[test]
    fn control_escape_ending_in_backslash_keeps_framing() {
        assert_eq!(encode_value("\x1c"), "\\c\\");
        assert_eq!(split_fields("a\\c\\/b"), &["a\\c\\", "b"]);
        for value in 0u8..128 {
            let raw = (value as char).to_string();
            let body = format!("/WCFG/OBJ/{}/", encode_value(&raw));
            let frame = parse_frame(&close_command(&body), true);
            assert!(frame.is_valid(), "byte {:#04x}: {}", value, frame);
            assert_eq!(frame.fields().len(), 3, "byte {:#04x}", value);
            assert_eq!(decode_value(&frame.fields()[2]), raw, "byte {:#04x}", value);
        }
    }

    #[test]
    fn encode_folds_into_seven_bits() {
        // U+00E9 is 0xE9, folded to 0x69 ('i')
        assert_eq!(encode_value("é"), "i");
        // U+0080 folds to NUL
        assert_eq!(encode_value("\u{80}"), "\\0");
    }

    #[test]
    fn decode_reverts_encode_for_every_byte() {
        for value in 0u32..=255 {
            let c = char::from_u32(value).unwrap();
            let folded = char::from_u32(value % 128).unwrap();
            let encoded = encode_value(&c.to_string());
            assert_eq!(
                decode_value(&encoded),
                folded.to_string(),
                "byte {:#04x} encoded as {:?}",
                value,
                encoded
            );
        }
    }

    #[test]
    fn decode_is_lenient() {
        assert_eq!(decode_value("abc\\"), "abc");
        assert_eq!(decode_value("abc\\c"), "abc");
        assert_eq!(decode_value("a\\c1b"), "ab");
        assert_eq!(decode_value("\\x\\:"), "x:");
        assert_eq!(decode_value("\\<\\?"), "\x1c\x1f");
    }

    #[test]
    fn split_fields_respects_escapes() {
        assert_eq!(split_fields("a/b\\/c/d"), vec!["a", "b\\/c", "d"]);
        assert_eq!(split_fields(""), vec![""]);
        assert_eq!(split_fields("a\\\\/b"), vec!["a\\\\", "b"]);
        assert_eq!(split_fields("trailing\\"), vec!["trailing\\"]);
    }

    #[test]
    fn explicit_errors() {
        let frame = parse_frame(&close_command("/#ERROR/BV/"), true);
        assert_eq!(explicit_error(&frame), FrameError::RepliedBadAttributeValue);

        let frame = parse_frame(&close_command("/#ERROR/ZZ/"), true);
        assert_eq!(explicit_error(&frame), FrameError::UndefinedError);

        let frame = parse_frame(&close_command("/WCFG/ANIX_1/"), true);
        assert_eq!(explicit_error(&frame), FrameError::Ok);

        let frame = parse_frame("/#ERROR/BV/\x1600", true);
        assert_eq!(explicit_error(&frame), FrameError::WrongChecksum);
    }

    #[test]
    fn compare_reply_fields() {
        assert!(compare_reply_field("secret", "******"));
        assert!(compare_reply_field("abc", "abc"));
        assert!(compare_reply_field("12.5 3", "12.50003 3"));
        assert!(compare_reply_field("0", "0.00001"));
        assert!(!compare_reply_field("0", "0.001"));
        assert!(!compare_reply_field("12.5 3", "12.5"));
        assert!(!compare_reply_field("12.5", "12.6"));
        assert!(!compare_reply_field("abc", "abd"));
        assert!(!compare_reply_field("abc", ""));
    }

    #[test]
    fn backdoor_challenge() {
        assert_eq!(backdoor_challenge_reply("123").as_deref(), Some("247"));
        assert_eq!(backdoor_challenge_reply("000").as_deref(), Some("472"));
        assert_eq!(backdoor_challenge_reply("987").as_deref(), Some("607"));
        assert_eq!(backdoor_challenge_reply("12"), None);
        assert_eq!(backdoor_challenge_reply("1234"), None);
        assert_eq!(backdoor_challenge_reply("1a3"), None);
        assert_eq!(backdoor_challenge_reply(""), None);
    }
}
