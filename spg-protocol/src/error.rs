use std::{error::Error, fmt::Display};

/// Outcome of a protocol operation.
///
/// Every request/reply exchange ends with exactly one of these kinds. `Ok` is part of
/// the enumeration so that callers can store and forward outcomes uniformly.
/// The `Replied*` kinds are errors reported by the controller itself through an
/// `#ERROR` reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrameError {
    Ok,
    UndefinedError,
    Timeout,
    WrongFrameFormat,
    WrongChecksum,
    ReplyTooShort,
    ReplyTooLong,
    WrongValueFormat,
    RepliedSyntaxError,
    RepliedUnknownVerb,
    RepliedUnknownObject,
    RepliedBadAttributeAddress,
    RepliedBadAttributeValue,
    RepliedBadAttributeRange,
    RepliedAccessLevelTooLow,
    RepliedNotExecuted,
    RepliedLevelLocked,
    RepliedNotLogged,
    RepliedGenericUndefinedError,
    RepliedBufferOverflow,
    RepliedProtocolTemporaryDisconnected,
    WrongVerbInReply,
    WrongObjectInReply,
    ReplyFieldDoesNotMatchRequestField,
}

impl FrameError {
    /// Maps the two-letter code of an `#ERROR` reply.
    /// Unknown codes map to [`FrameError::UndefinedError`].
    pub fn from_reply_code(code: &str) -> FrameError {
        match code {
            "SE" => FrameError::RepliedSyntaxError,
            "UV" => FrameError::RepliedUnknownVerb,
            "UO" => FrameError::RepliedUnknownObject,
            "BA" => FrameError::RepliedBadAttributeAddress,
            "BV" => FrameError::RepliedBadAttributeValue,
            "BR" => FrameError::RepliedBadAttributeRange,
            "AL" => FrameError::RepliedAccessLevelTooLow,
            "NE" => FrameError::RepliedNotExecuted,
            "LL" => FrameError::RepliedLevelLocked,
            "NL" => FrameError::RepliedNotLogged,
            "UE" => FrameError::RepliedGenericUndefinedError,
            "BO" => FrameError::RepliedBufferOverflow,
            "DC" => FrameError::RepliedProtocolTemporaryDisconnected,
            _ => FrameError::UndefinedError,
        }
    }

    /// Numeric code of the outcome, positive only for `Ok`.
    /// These are the values gCAU tooling reports in its logs.
    pub fn code(self) -> i32 {
        match self {
            FrameError::Ok => 1,
            FrameError::UndefinedError => -1,
            FrameError::Timeout => -5,
            FrameError::WrongFrameFormat => -10,
            FrameError::WrongChecksum => -15,
            FrameError::ReplyTooShort => -20,
            FrameError::ReplyTooLong => -25,
            FrameError::WrongValueFormat => -30,
            FrameError::RepliedSyntaxError => -40,
            FrameError::RepliedUnknownVerb => -41,
            FrameError::RepliedUnknownObject => -42,
            FrameError::RepliedBadAttributeAddress => -43,
            FrameError::RepliedBadAttributeValue => -44,
            FrameError::RepliedBadAttributeRange => -45,
            FrameError::RepliedAccessLevelTooLow => -46,
            FrameError::RepliedNotExecuted => -47,
            FrameError::RepliedLevelLocked => -48,
            FrameError::RepliedNotLogged => -49,
            FrameError::RepliedGenericUndefinedError => -50,
            FrameError::RepliedBufferOverflow => -51,
            FrameError::RepliedProtocolTemporaryDisconnected => -52,
            FrameError::WrongVerbInReply => -60,
            FrameError::WrongObjectInReply => -65,
            FrameError::ReplyFieldDoesNotMatchRequestField => -100,
        }
    }

    pub fn is_ok(self) -> bool {
        self == FrameError::Ok
    }
}

impl Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FrameError::Ok => "Ok",
            FrameError::UndefinedError => "Undefined error",
            FrameError::Timeout => "Timed out waiting for a reply",
            FrameError::WrongFrameFormat => "Wrong frame format",
            FrameError::WrongChecksum => "Wrong checksum",
            FrameError::ReplyTooShort => "Reply too short",
            FrameError::ReplyTooLong => "Reply too long",
            FrameError::WrongValueFormat => "Wrong value format",
            FrameError::RepliedSyntaxError => "Controller replied: syntax error",
            FrameError::RepliedUnknownVerb => "Controller replied: unknown verb",
            FrameError::RepliedUnknownObject => "Controller replied: unknown object",
            FrameError::RepliedBadAttributeAddress => "Controller replied: bad attribute address",
            FrameError::RepliedBadAttributeValue => "Controller replied: bad attribute value",
            FrameError::RepliedBadAttributeRange => "Controller replied: bad attribute range",
            FrameError::RepliedAccessLevelTooLow => "Controller replied: access level too low",
            FrameError::RepliedNotExecuted => "Controller replied: not executed",
            FrameError::RepliedLevelLocked => "Controller replied: level locked",
            FrameError::RepliedNotLogged => "Controller replied: not logged in",
            FrameError::RepliedGenericUndefinedError => "Controller replied: undefined error",
            FrameError::RepliedBufferOverflow => "Controller replied: buffer overflow",
            FrameError::RepliedProtocolTemporaryDisconnected => {
                "Controller replied: protocol temporarily disconnected"
            }
            FrameError::WrongVerbInReply => "Wrong verb in reply",
            FrameError::WrongObjectInReply => "Wrong object in reply",
            FrameError::ReplyFieldDoesNotMatchRequestField => {
                "Reply field does not match request field"
            }
        };
        write!(f, "{}", text)
    }
}

impl Error for FrameError {}

#[test]
fn reply_codes_map_to_kinds() {
    assert_eq!(FrameError::from_reply_code("SE"), FrameError::RepliedSyntaxError);
    assert_eq!(FrameError::from_reply_code("NL"), FrameError::RepliedNotLogged);
    assert_eq!(
        FrameError::from_reply_code("DC"),
        FrameError::RepliedProtocolTemporaryDisconnected
    );
    assert_eq!(FrameError::from_reply_code("XX"), FrameError::UndefinedError);
    assert_eq!(FrameError::from_reply_code(""), FrameError::UndefinedError);
}

#[test]
fn only_ok_has_a_positive_code() {
    assert_eq!(FrameError::Ok.code(), 1);
    assert_eq!(FrameError::ReplyFieldDoesNotMatchRequestField.code(), -100);
    assert!(FrameError::Timeout.code() < 0);
}
