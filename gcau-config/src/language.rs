//! Language files uploaded to controllers, named `LF_<version>_<subversion>_<tag>.up.txt`.
//!
//! Each non-blank line is a record `prefix/contents` closed by SYN and the checksum of
//! everything up to and including SYN, like a protocol frame.
use std::path::Path;

use spg_protocol::{SYN, codec::checksum};

use crate::{
    agc::{file_name_of, read_lines},
    error::FileError,
};

const FILE_PREFIX: &str = "LF_";
const FILE_SUFFIX: &str = ".up.txt";

/// Version, subversion and language tag encoded in a language file name
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LanguageFileName<'a> {
    pub version: u32,
    pub sub_version: u32,
    pub language_tag: &'a str,
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let start = text.len().checked_sub(suffix.len())?;
    let tail = text.get(start..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &text[..start])
}

fn number(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl LanguageFileName<'_> {
    pub fn parse(file_name: &str) -> Option<LanguageFileName<'_>> {
        let stem = strip_prefix_ignore_case(file_name, FILE_PREFIX)?;
        let stem = strip_suffix_ignore_case(stem, FILE_SUFFIX)?;
        let (version, rest) = stem.split_once('_')?;
        let (sub_version, language_tag) = rest.split_once('_')?;
        if language_tag.is_empty() {
            return None;
        }
        Some(LanguageFileName {
            version: number(version)?,
            sub_version: number(sub_version)?,
            language_tag,
        })
    }
}

/// One record of a language file
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LanguageRecord {
    /// The complete trimmed line
    pub line: String,
    pub prefix: String,
    pub contents: String,
    pub checksum: String,
}

fn is_upper_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'A'..=b'F').contains(&b)
}

/// Splits `prefix/contents<SYN><hex2>`. The prefix ends at the first '/',
/// the contents at the last SYN followed by a checksum.
fn split_record(line: &str) -> Option<(&str, &str, &str)> {
    let slash = line.get(1..)?.find('/')? + 1;
    let body = &line[slash + 1..];
    let bytes = body.as_bytes();
    let syn = (1..bytes.len()).rev().find(|&i| {
        bytes[i] == SYN as u8
            && bytes.get(i + 1).copied().is_some_and(is_upper_hex)
            && bytes.get(i + 2).copied().is_some_and(is_upper_hex)
    })?;
    Some((&line[..slash], &body[..syn], &body[syn + 1..syn + 3]))
}

/// A language file whose records were checked for syntax and, optionally, checksums.
#[derive(Clone, Debug)]
pub struct LanguageFile {
    file_name: String,
    version: u32,
    sub_version: u32,
    language_tag: String,
    records: Vec<LanguageRecord>,
}

impl LanguageFile {
    pub fn open(path: impl AsRef<Path>, verify_checksums: bool) -> Result<LanguageFile, FileError> {
        let path = path.as_ref();
        let file_name = file_name_of(path);
        if LanguageFileName::parse(&file_name).is_none() {
            return Err(FileError::WrongFileName(file_name));
        }
        let contents = read_lines(path)?;
        LanguageFile::from_lines(file_name, &contents, verify_checksums)
    }

    pub fn from_lines(
        file_name: impl Into<String>,
        contents: &[String],
        verify_checksums: bool,
    ) -> Result<LanguageFile, FileError> {
        let file_name = file_name.into();
        let Some(name) = LanguageFileName::parse(&file_name) else {
            return Err(FileError::WrongFileName(file_name));
        };
        let (version, sub_version, language_tag) =
            (name.version, name.sub_version, name.language_tag.to_owned());

        let mut records = Vec::new();
        for (index, line) in contents.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((prefix, body, expected)) = split_record(line) else {
                return Err(FileError::Syntax { line: index + 1 });
            };
            if verify_checksums {
                let computed = checksum(&format!("{}/{}{}", prefix, body, SYN));
                if computed.hex() != expected {
                    return Err(FileError::WrongChecksum {
                        line: index + 1,
                        expected: computed.hex(),
                        got: expected.to_owned(),
                    });
                }
            }
            records.push(LanguageRecord {
                line: line.trim().to_owned(),
                prefix: prefix.to_owned(),
                contents: body.to_owned(),
                checksum: expected.to_owned(),
            });
        }
        log::debug!("{}: {} records", file_name, records.len());
        Ok(LanguageFile {
            file_name,
            version,
            sub_version,
            language_tag,
            records,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn sub_version(&self) -> u32 {
        self.sub_version
    }

    pub fn language_tag(&self) -> &str {
        &self.language_tag
    }

    pub fn records(&self) -> &[LanguageRecord] {
        &self.records
    }

    /// Record contents without prefix and checksum
    pub fn stripped_records(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.contents.as_str())
    }
}
