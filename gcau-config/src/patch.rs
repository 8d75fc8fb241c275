//! # Patch Files
//!
//! A patch file carries a free text description and the object attributes to write:
//!
//! ```text
//! [Description]
//! Raise the pressure limits
//! [Data]
//! $ValidUntil = "2030/12/31"
//! ANIX_1.!STATUS = "OK"
//! ANIX_1.LIMIT = "12.5"
//! ```
//!
//! Lines before `[Description]` are ignored. In encoded files (`.agcp`) every line after
//! `[Data]` is encrypted with a [PatchCipher]. Decoded files (`.agcp0`) are plain text.
//! A configuration file (`.agc`) can be read as a patch as well: its notes become the
//! description and the attributes of its configuration section become the data.
use std::path::Path;

use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::{
    agc::{AgcConfigurationFile, AgcLineKind, file_name_of, has_extension, read_lines},
    cipher::PatchCipher,
    classes::{ClassRestrictions, filter_patch_objects},
    error::FileError,
    object::{Attribute, PatchObject, PatchObjectBuilder},
    scan,
};

pub const DESCRIPTION_TAG: &str = "[Description]";
pub const DATA_TAG: &str = "[Data]";

const CONFIGURATION_SECTION: &str = "$GCAUConfigurationData";
const CALIBRATION_SECTION: &str = "$GCAUCalibrationData";
const CALIBRATION_OBJECT: &str = "CALIBR";
const NOTES: &str = "$Notes";

/// How the contents of a patch file are stored, decided by the file extension
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatchFileKind {
    /// `.agcp`: data lines are encrypted
    Encoded,
    /// `.agcp0`
    Decoded,
    /// `.agc`: a configuration file
    Configuration,
}

impl PatchFileKind {
    pub fn from_file_name(file_name: &str) -> Option<PatchFileKind> {
        if has_extension(file_name, ".agcp") {
            Some(PatchFileKind::Encoded)
        } else if has_extension(file_name, ".agcp0") {
            Some(PatchFileKind::Decoded)
        } else if has_extension(file_name, ".agc") {
            Some(PatchFileKind::Configuration)
        } else {
            None
        }
    }
}

/// A statement `OBJ.[!]ATTR` with an optional `= "value"`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParsedAgcLine<'a> {
    pub object: &'a str,
    pub attribute: &'a str,
    pub read_only: bool,
    pub value: Option<&'a str>,
}

/// Parses a single data line of a patch file.
pub fn parse_agc_line(line: &str) -> Option<ParsedAgcLine<'_>> {
    let matched = scan::object_attribute(line)?;
    Some(ParsedAgcLine {
        object: matched.object,
        attribute: matched.attribute,
        read_only: matched.read_only,
        value: scan::quoted_assignment(matched.rest),
    })
}

fn is_tag(line: &str, tag: &str) -> bool {
    line.eq_ignore_ascii_case(tag)
}

/// Decrypts every line following the `[Data]` tag.
pub fn decode_contents(lines: &[String], cipher: &PatchCipher) -> Result<Vec<String>, FileError> {
    let mut in_data = false;
    let mut decoded = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if in_data {
            let plain = cipher
                .decrypt_line(line.trim())
                .map_err(|error| FileError::Decrypt {
                    line: index + 1,
                    error,
                })?;
            decoded.push(plain);
        } else {
            in_data = is_tag(line, DATA_TAG);
            decoded.push(line.clone());
        }
    }
    Ok(decoded)
}

/// Encrypts every line following the `[Data]` tag.
pub fn encode_contents(lines: &[String], cipher: &PatchCipher) -> Vec<String> {
    let mut in_data = false;
    lines
        .iter()
        .map(|line| {
            if in_data {
                cipher.encrypt_line(line)
            } else {
                in_data = is_tag(line, DATA_TAG);
                line.clone()
            }
        })
        .collect()
}

/// Rewrites a configuration file as decoded patch contents.
fn patch_lines_of(file: &AgcConfigurationFile, full_attribute_set: bool) -> Vec<String> {
    let mut description = vec![DESCRIPTION_TAG.to_owned()];
    let mut data = vec![DATA_TAG.to_owned()];
    let mut previous_object = String::new();
    let mut push_data = |object: &str, line: String| {
        if !previous_object.is_empty() && !previous_object.eq_ignore_ascii_case(object) {
            data.push(String::new());
        }
        data.push(line);
        previous_object = object.to_owned();
    };
    for line in file.lines() {
        if line.in_section(CONFIGURATION_SECTION) {
            if line.name().eq_ignore_ascii_case(NOTES) {
                description.extend(
                    line.values()
                        .into_iter()
                        .map(str::trim_end)
                        .filter(|value| !value.is_empty())
                        .map(str::to_owned),
                );
            }
            if let AgcLineKind::ObjectAttribute { object, attribute } = &line.kind {
                push_data(
                    object,
                    format!(
                        "{}.{}{} = \"{}\"",
                        object,
                        if attribute.read_only { "!" } else { "" },
                        attribute.name,
                        attribute.value().unwrap_or_default()
                    ),
                );
            }
        }
        if full_attribute_set
            && line.in_section(CALIBRATION_SECTION)
            && let AgcLineKind::ObjectAttribute { object, attribute } = &line.kind
            && object == CALIBRATION_OBJECT
        {
            push_data(
                object,
                format!(
                    "{}.{} = \"{}\"",
                    object,
                    attribute.name,
                    attribute.value().unwrap_or_default()
                ),
            );
        }
    }
    description.append(&mut data);
    description
}

fn outdated(line: &str, now: NaiveDateTime) -> bool {
    let Some((year, month, day)) = scan::valid_until(line) else {
        return false;
    };
    match NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(23, 59, 59))
    {
        Some(limit) => now > limit,
        None => {
            log::debug!("Ignoring invalid validity date in {:?}", line);
            false
        }
    }
}

/// A loaded patch
#[derive(Clone, Debug)]
pub struct PatchFile {
    file_name: String,
    kind: PatchFileKind,
    full_attribute_set: bool,
    outdated: bool,
    description: Vec<String>,
    contents: Vec<String>,
    objects: Vec<PatchObject>,
}

impl PatchFile {
    /// Reads a patch file of any kind. Encoded files need the `cipher`.
    ///
    /// With `full_attribute_set`, attributes without value are kept and a configuration
    /// file contributes its calibration data as well.
    pub fn open(
        path: impl AsRef<Path>,
        full_attribute_set: bool,
        cipher: Option<&PatchCipher>,
    ) -> Result<PatchFile, FileError> {
        let path = path.as_ref();
        let file_name = file_name_of(path);
        let Some(kind) = PatchFileKind::from_file_name(&file_name) else {
            return Err(FileError::WrongExtension(file_name));
        };
        let contents = match kind {
            PatchFileKind::Configuration => {
                patch_lines_of(&AgcConfigurationFile::open(path)?, full_attribute_set)
            }
            PatchFileKind::Decoded => read_lines(path)?,
            PatchFileKind::Encoded => {
                let cipher = cipher.ok_or(FileError::MissingCipher)?;
                decode_contents(&read_lines(path)?, cipher)?
            }
        };
        log::debug!("Read {} lines of {}", contents.len(), path.display());
        PatchFile::from_lines(file_name, kind, contents, full_attribute_set)
    }

    /// Uses a configuration file as patch.
    pub fn from_configuration(
        file: &AgcConfigurationFile,
        full_attribute_set: bool,
    ) -> Result<PatchFile, FileError> {
        PatchFile::from_lines(
            file.file_name(),
            PatchFileKind::Configuration,
            patch_lines_of(file, full_attribute_set),
            full_attribute_set,
        )
    }

    /// Builds a patch from decoded contents.
    pub fn from_lines(
        file_name: impl Into<String>,
        kind: PatchFileKind,
        contents: Vec<String>,
        full_attribute_set: bool,
    ) -> Result<PatchFile, FileError> {
        PatchFile::from_lines_at(
            file_name,
            kind,
            contents,
            full_attribute_set,
            Local::now().naive_local(),
        )
    }

    /// Like [PatchFile::from_lines], checking validity against `now`.
    pub fn from_lines_at(
        file_name: impl Into<String>,
        kind: PatchFileKind,
        contents: Vec<String>,
        full_attribute_set: bool,
        now: NaiveDateTime,
    ) -> Result<PatchFile, FileError> {
        enum Stage {
            Preamble,
            Description,
            Data,
        }

        let file_name = file_name.into();
        let mut stage = Stage::Preamble;
        let mut description = Vec::new();
        let mut objects = Vec::new();
        let mut current: Option<PatchObjectBuilder> = None;
        let mut is_outdated = false;

        for line in &contents {
            match stage {
                Stage::Preamble => {
                    if is_tag(line, DESCRIPTION_TAG) {
                        stage = Stage::Description;
                    }
                }
                Stage::Description => {
                    if is_tag(line, DATA_TAG) {
                        stage = Stage::Data;
                    } else {
                        description.push(line.clone());
                    }
                }
                Stage::Data => {
                    is_outdated |= outdated(line, now);
                    let Some(parsed) = parse_agc_line(line) else {
                        continue;
                    };
                    if current.as_ref().is_some_and(|b| b.name() != parsed.object)
                        && let Some(done) = current.take()
                    {
                        objects.push(done.seal());
                    }
                    let builder =
                        current.get_or_insert_with(|| PatchObjectBuilder::new(parsed.object));
                    let position = builder.claim_position();
                    if parsed.value.is_some() || full_attribute_set {
                        builder.push(Attribute::new(
                            parsed.attribute,
                            position,
                            parsed.value.map(str::to_owned),
                            parsed.read_only,
                        ));
                    }
                }
            }
        }
        if !matches!(stage, Stage::Data) {
            return Err(FileError::InconsistentFile);
        }
        if let Some(done) = current {
            objects.push(done.seal());
        }
        if is_outdated {
            log::warn!("{} is outdated", file_name);
        }
        Ok(PatchFile {
            file_name,
            kind,
            full_attribute_set,
            outdated: is_outdated,
            description,
            contents,
            objects,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn kind(&self) -> PatchFileKind {
        self.kind
    }

    pub fn full_attribute_set(&self) -> bool {
        self.full_attribute_set
    }

    /// True if a `$ValidUntil` date of the data section has passed
    pub fn is_outdated(&self) -> bool {
        self.outdated
    }

    /// Lines between `[Description]` and `[Data]`
    pub fn description(&self) -> &[String] {
        &self.description
    }

    /// The complete file contents with data in clear text
    pub fn decoded_contents(&self) -> &[String] {
        &self.contents
    }

    /// The complete file contents with encrypted data, as written to `.agcp` files
    pub fn encoded_contents(&self, cipher: &PatchCipher) -> Vec<String> {
        encode_contents(&self.contents, cipher)
    }

    pub fn patch_objects(&self) -> &[PatchObject] {
        &self.objects
    }

    /// The patch objects trimmed to what `restrictions` allow
    pub fn restricted_patch_objects(&self, restrictions: &ClassRestrictions) -> Vec<PatchObject> {
        filter_patch_objects(&self.objects, restrictions)
    }
}
