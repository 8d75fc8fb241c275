//! Structural matchers for the statements found in `.agc` and patch files.
//!
//! Each matcher recognizes one statement shape and extracts its parts, or returns `None`.
//! Whitespace follows the usual definition of [`char::is_whitespace`].

/// `OBJ.[!]ATTR` followed by anything
pub(crate) struct ObjectAttribute<'a> {
    pub object: &'a str,
    pub read_only: bool,
    pub attribute: &'a str,
    pub rest: &'a str,
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Cursor<'a> {
        Cursor { rest: text }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !pred(*c))
            .map_or(self.rest.len(), |(i, _)| i);
        let (taken, rest) = self.rest.split_at(end);
        self.rest = rest;
        taken
    }

    fn eat(&mut self, c: char) -> bool {
        match self.rest.strip_prefix(c) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    /// Consumes `\s*=\s*"` and reports whether it was present.
    fn eat_assignment(&mut self) -> bool {
        self.skip_whitespace();
        if !self.eat('=') {
            return false;
        }
        self.skip_whitespace();
        self.eat('"')
    }
}

fn is_object_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Splits the text following an opening quote at its last quote.
fn up_to_last_quote(text: &str) -> Option<&str> {
    text.rfind('"').map(|end| &text[..end])
}

/// Matches `OBJ.[!]ATTR<rest>` where `OBJ` is `[A-Z][A-Z0-9_]*` and `ATTR` is alphanumeric.
pub(crate) fn object_attribute(line: &str) -> Option<ObjectAttribute<'_>> {
    if !line.starts_with(|c: char| c.is_ascii_uppercase()) {
        return None;
    }
    let mut cursor = Cursor::new(line);
    let object = cursor.take_while(is_object_char);
    if !cursor.eat('.') {
        return None;
    }
    let read_only = cursor.eat('!');
    let attribute = cursor.take_while(|c| c.is_ascii_alphanumeric());
    if attribute.is_empty() {
        return None;
    }
    Some(ObjectAttribute {
        object,
        read_only,
        attribute,
        rest: cursor.rest,
    })
}

/// Matches the value part `\s*=\s*"value"`, the value extending to the last quote.
pub(crate) fn quoted_assignment(text: &str) -> Option<&str> {
    let mut cursor = Cursor::new(text);
    if !cursor.eat_assignment() {
        return None;
    }
    up_to_last_quote(cursor.rest)
}

/// Matches `OBJ.[!]ATTR = "value"`
pub(crate) fn object_value(line: &str) -> Option<(ObjectAttribute<'_>, &str)> {
    let matched = object_attribute(line)?;
    let value = quoted_assignment(matched.rest)?;
    Some((matched, value))
}

fn name_and_open_value(line: &str, meta: bool) -> Option<(&str, &str)> {
    let mut cursor = Cursor::new(line);
    if meta && !cursor.eat('$') {
        return None;
    }
    let name = cursor.take_while(is_name_char);
    if name.is_empty() || !cursor.eat_assignment() {
        return None;
    }
    let name_len = name.len() + usize::from(meta);
    Some((&line[..name_len], cursor.rest))
}

/// Matches `$Name = "value"`. The name includes the dollar sign.
pub(crate) fn meta_value(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = name_and_open_value(line, true)?;
    Some((name, up_to_last_quote(rest)?))
}

/// Matches `$Name = "value` where the value is not closed on the same line.
pub(crate) fn open_meta_value(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = name_and_open_value(line, true)?;
    if rest.contains('"') {
        return None;
    }
    Some((name, rest))
}

/// Matches `Name = "value"`
pub(crate) fn generic_value(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = name_and_open_value(line, false)?;
    Some((name, up_to_last_quote(rest)?))
}

/// Matches the last line of a multi-line value: `contents"` followed by blanks.
pub(crate) fn closing_quote(line: &str) -> Option<&str> {
    line.trim_end_matches([' ', '\t']).strip_suffix('"')
}

fn digits(cursor: &mut Cursor<'_>, count: usize) -> Option<u32> {
    let taken = cursor.take_while(|c| c.is_ascii_digit());
    if taken.len() != count {
        return None;
    }
    taken.parse().ok()
}

/// Matches `$ValidUntil = "YYYY/MM/DD"` and returns year, month and day.
/// The date itself is not validated.
pub(crate) fn valid_until(line: &str) -> Option<(i32, u32, u32)> {
    let mut cursor = Cursor::new(line.strip_prefix("$ValidUntil")?);
    if !cursor.eat_assignment() {
        return None;
    }
    let year = digits(&mut cursor, 4)?;
    if !cursor.eat('/') {
        return None;
    }
    let month = digits(&mut cursor, 2)?;
    if !cursor.eat('/') {
        return None;
    }
    let day = digits(&mut cursor, 2)?;
    if !cursor.eat('"') {
        return None;
    }
    Some((i32::try_from(year).ok()?, month, day))
}

/// Matches `#comment`. A lone `#` is not a comment.
pub(crate) fn comment(line: &str) -> Option<&str> {
    let text = line.strip_prefix('#')?;
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn object_values() {
        let (matched, value) = object_value("ANIX_2.!STATUS = \"OK\"").unwrap();
        assert_eq!(matched.object, "ANIX_2");
        assert!(matched.read_only);
        assert_eq!(matched.attribute, "STATUS");
        assert_eq!(value, "OK");

        let (matched, value) = object_value("SYSTEM.Name=\"a \"quoted\" b\" # trailing").unwrap();
        assert_eq!(matched.object, "SYSTEM");
        assert!(!matched.read_only);
        assert_eq!(value, "a \"quoted\" b");
    }

    #[test]
    fn object_value_rejects_malformed_lines() {
        assert!(object_value("anix.VALUE = \"1\"").is_none());
        assert!(object_value("ANIX VALUE = \"1\"").is_none());
        assert!(object_value("ANIX.VALUE = 1").is_none());
        assert!(object_value("ANIX.VALUE = \"1").is_none());
        assert!(object_value("ANIX. = \"1\"").is_none());
        assert!(object_value("$Meta = \"1\"").is_none());
    }

    #[test]
    fn object_attribute_without_value() {
        let matched = object_attribute("CALIBR.Gain1").unwrap();
        assert_eq!(matched.object, "CALIBR");
        assert_eq!(matched.attribute, "Gain1");
        assert_eq!(matched.rest, "");
        assert!(quoted_assignment(matched.rest).is_none());
    }

    #[test]
    fn meta_values() {
        assert_eq!(
            meta_value("$GCAUConfigurationData = \"Start\""),
            Some(("$GCAUConfigurationData", "Start"))
        );
        assert_eq!(meta_value("$Notes = \"first"), None);
        assert_eq!(open_meta_value("$Notes = \"first"), Some(("$Notes", "first")));
        assert_eq!(open_meta_value("$Notes = \"closed\""), None);
        assert_eq!(meta_value("$ = \"x\""), None);
    }

    #[test]
    fn generic_values() {
        assert_eq!(generic_value("Version = \"3\""), Some(("Version", "3")));
        assert_eq!(generic_value("Ver sion = \"3\""), None);
    }

    #[test]
    fn closing_quotes_and_comments() {
        assert_eq!(closing_quote("last line\" \t"), Some("last line"));
        assert_eq!(closing_quote("not the last"), None);
        assert_eq!(comment("# remark"), Some(" remark"));
        assert_eq!(comment("#"), None);
    }

    #[test]
    fn valid_until_dates() {
        assert_eq!(
            valid_until("$ValidUntil = \"2024/02/30\" # ignored"),
            Some((2024, 2, 30))
        );
        assert_eq!(valid_until("$ValidUntil=\"2024/2/03\""), None);
        assert_eq!(valid_until("$ValidUntil = \"20245/02/03\""), None);
        assert_eq!(valid_until("$ValidUntil = \"2024/02/03"), None);
        assert_eq!(valid_until(" $ValidUntil = \"2024/02/03\""), None);
    }
}
