//! # Configuration Files
//!
//! Line-oriented breakdown of `.agc` configuration files.
//!
//! Each line is classified by shape, tried in this order:
//!
//! 1. `OBJ.[!]ATTR = "value"`: an object attribute
//! 2. `$Name = "value"`: a meta definition. `"Start"`/`"End"` open and close a section
//!    named after the meta
//! 3. `$Name = "value` without closing quote: a meta value spanning several lines
//! 4. `Name = "value"`: any other definition
//! 5. `#text`: a comment
//! 6. anything else is unknown
use std::{fs, io, path::Path};

use crate::{error::FileError, object::Attribute, scan};

const FILE_EXTENSION: &str = ".agc";
const CALIBRATION_SECTION: &str = "$GCAUCalibrationData";
const CALIBRATION_OBJECT: &str = "CALIBR";
const DEFAULT_CALIBRATION_VALUE: &str = "1024";

/// The shape of one configuration line and what it carries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AgcLineKind {
    ObjectAttribute { object: String, attribute: Attribute },
    Meta { name: String, value: String },
    MultiLineMeta { name: String, values: Vec<String> },
    Other { name: String, value: String },
    Comment { text: String },
    Unknown,
}

/// One classified statement of a configuration file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AgcLine {
    pub kind: AgcLineKind,
    /// The raw source line. For a multi-line meta, only its first line.
    pub contents: String,
    /// The section open at this line, empty if none
    pub section: String,
    /// 1-based line number
    pub line_number: usize,
}

impl AgcLine {
    /// Object, meta or definition name. `#` for comments and empty for unknown lines.
    pub fn name(&self) -> &str {
        match &self.kind {
            AgcLineKind::ObjectAttribute { object, .. } => object,
            AgcLineKind::Meta { name, .. }
            | AgcLineKind::MultiLineMeta { name, .. }
            | AgcLineKind::Other { name, .. } => name,
            AgcLineKind::Comment { .. } => "#",
            AgcLineKind::Unknown => "",
        }
    }

    /// All values carried by the line, several for a multi-line meta
    pub fn values(&self) -> Vec<&str> {
        match &self.kind {
            AgcLineKind::ObjectAttribute { attribute, .. } => {
                attribute.value().into_iter().collect()
            }
            AgcLineKind::Meta { value, .. } | AgcLineKind::Other { value, .. } => {
                vec![value.as_str()]
            }
            AgcLineKind::MultiLineMeta { values, .. } => {
                values.iter().map(String::as_str).collect()
            }
            AgcLineKind::Comment { text } => vec![text.as_str()],
            AgcLineKind::Unknown => Vec::new(),
        }
    }

    pub fn in_section(&self, section: &str) -> bool {
        self.section.eq_ignore_ascii_case(section)
    }
}

/// Reads a text file as lines.
/// Files that are not valid UTF-8 are read as Latin-1.
pub(crate) fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let bytes = fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    };
    Ok(text.lines().map(str::to_owned).collect())
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn has_extension(file_name: &str, extension: &str) -> bool {
    let file_name = file_name.trim();
    file_name.len() > extension.len()
        && file_name
            .get(file_name.len() - extension.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(extension))
}

/// Contents of a `.agc` configuration file.
#[derive(Clone, Debug)]
pub struct AgcConfigurationFile {
    file_name: String,
    contents: Vec<String>,
}

impl AgcConfigurationFile {
    /// Reads a configuration file. The file name must end with `.agc`.
    pub fn open(path: impl AsRef<Path>) -> Result<AgcConfigurationFile, FileError> {
        let path = path.as_ref();
        let file_name = file_name_of(path);
        if !Self::has_valid_file_name(&file_name) {
            return Err(FileError::WrongExtension(file_name));
        }
        let contents = read_lines(path)?;
        log::debug!("Read {} lines from {}", contents.len(), path.display());
        Ok(AgcConfigurationFile {
            file_name,
            contents,
        })
    }

    pub fn from_lines(file_name: impl Into<String>, contents: Vec<String>) -> AgcConfigurationFile {
        AgcConfigurationFile {
            file_name: file_name.into(),
            contents,
        }
    }

    pub fn has_valid_file_name(file_name: &str) -> bool {
        has_extension(file_name, FILE_EXTENSION)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn contents(&self) -> &[String] {
        &self.contents
    }

    /// Iterates over the classified lines of the file
    pub fn lines(&self) -> AgcLines<'_> {
        AgcLines::new(&self.contents)
    }

    /// True if some calibration value differs from its default of 1024
    pub fn contains_non_default_calibration_data(&self) -> bool {
        self.lines().any(|line| match &line.kind {
            AgcLineKind::ObjectAttribute { object, attribute } => {
                line.in_section(CALIBRATION_SECTION)
                    && object == CALIBRATION_OBJECT
                    && attribute.value() != Some(DEFAULT_CALIBRATION_VALUE)
            }
            _ => false,
        })
    }
}

/// Iterator over classified configuration lines.
///
/// Carries the open section and the attribute position counter from one line to the next.
/// The counter restarts at 1 whenever the object name changes.
pub struct AgcLines<'a> {
    contents: &'a [String],
    index: usize,
    previous_object: Option<&'a str>,
    position: u16,
    section: String,
}

impl<'a> AgcLines<'a> {
    pub fn new(contents: &'a [String]) -> AgcLines<'a> {
        AgcLines {
            contents,
            index: 0,
            previous_object: None,
            position: 1,
            section: String::new(),
        }
    }

    fn classify(&mut self, line: &'a str) -> AgcLineKind {
        if let Some((matched, value)) = scan::object_value(line) {
            if self.previous_object != Some(matched.object) {
                self.previous_object = Some(matched.object);
                self.position = 1;
            }
            let attribute = Attribute::new(
                matched.attribute,
                self.position,
                Some(value.to_owned()),
                matched.read_only,
            );
            self.position = self.position.saturating_add(1);
            return AgcLineKind::ObjectAttribute {
                object: matched.object.to_owned(),
                attribute,
            };
        }
        if let Some((name, value)) = scan::meta_value(line) {
            if value.eq_ignore_ascii_case("Start") {
                self.section = name.to_owned();
            } else if value.eq_ignore_ascii_case("End") {
                self.section.clear();
            }
            return AgcLineKind::Meta {
                name: name.to_owned(),
                value: value.to_owned(),
            };
        }
        if let Some((name, first)) = scan::open_meta_value(line) {
            let mut values = vec![first.to_owned()];
            while let Some(next) = self.contents.get(self.index) {
                self.index += 1;
                if let Some(last) = scan::closing_quote(next) {
                    values.push(last.to_owned());
                    break;
                }
                values.push(next.clone());
            }
            return AgcLineKind::MultiLineMeta {
                name: name.to_owned(),
                values,
            };
        }
        if let Some((name, value)) = scan::generic_value(line) {
            return AgcLineKind::Other {
                name: name.to_owned(),
                value: value.to_owned(),
            };
        }
        if let Some(text) = scan::comment(line) {
            return AgcLineKind::Comment {
                text: text.to_owned(),
            };
        }
        AgcLineKind::Unknown
    }
}

impl Iterator for AgcLines<'_> {
    type Item = AgcLine;

    fn next(&mut self) -> Option<AgcLine> {
        let line = self.contents.get(self.index)?;
        self.index += 1;
        let line_number = self.index;
        let kind = self.classify(line);
        Some(AgcLine {
            kind,
            contents: line.clone(),
            section: self.section.clone(),
            line_number,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_owned).collect()
    }

    #[test]
    fn positions_restart_with_each_object() {
        let file = AgcConfigurationFile::from_lines(
            "test.agc",
            lines(
                "ANIX_2.!STATUS = \"OK\"\n\
                 ANIX_2.VALUE = \"10\"\n\
                 ANIX_3.STATUS = \"KO\"\n",
            ),
        );
        let positions: Vec<(String, u16, bool)> = file
            .lines()
            .filter_map(|line| match line.kind {
                AgcLineKind::ObjectAttribute { object, attribute } => {
                    Some((object, attribute.position, attribute.read_only))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            positions,
            vec![
                ("ANIX_2".to_owned(), 1, true),
                ("ANIX_2".to_owned(), 2, false),
                ("ANIX_3".to_owned(), 1, false),
            ]
        );
    }

    #[test]
    fn sections_open_and_close() {
        let file = AgcConfigurationFile::from_lines(
            "test.agc",
            lines(
                "$GCAUConfigurationData = \"Start\"\n\
                 SYSTEM.Name = \"plant\"\n\
                 $GCAUConfigurationData = \"end\"\n\
                 SYSTEM.Name = \"outside\"\n",
            ),
        );
        let sections: Vec<String> = file.lines().map(|line| line.section).collect();
        assert_eq!(
            sections,
            vec![
                "$GCAUConfigurationData",
                "$GCAUConfigurationData",
                "",
                ""
            ]
        );
    }

    #[test]
    fn multi_line_meta_consumes_lines() {
        let file = AgcConfigurationFile::from_lines(
            "test.agc",
            lines(
                "$Notes = \"first line\n\
                 second line\n\
                 last line\"  \n\
                 # a comment\n\
                 Version = \"3\"\n\
                 #\n\
                 garbage\n",
            ),
        );
        let all: Vec<AgcLine> = file.lines().collect();
        assert_eq!(all.len(), 5);
        assert_eq!(
            all[0].kind,
            AgcLineKind::MultiLineMeta {
                name: "$Notes".to_owned(),
                values: vec![
                    "first line".to_owned(),
                    "second line".to_owned(),
                    "last line".to_owned()
                ],
            }
        );
        assert_eq!(all[0].line_number, 1);
        assert_eq!(all[1].line_number, 4);
        assert_eq!(all[1].name(), "#");
        assert_eq!(all[1].values(), vec![" a comment"]);
        assert_eq!(
            all[2].kind,
            AgcLineKind::Other {
                name: "Version".to_owned(),
                value: "3".to_owned()
            }
        );
        assert_eq!(all[3].kind, AgcLineKind::Unknown);
        assert_eq!(all[4].kind, AgcLineKind::Unknown);
        assert_eq!(all[4].contents, "garbage");
    }

    #[test]
    fn unterminated_multi_line_meta_runs_to_end() {
        let file = AgcConfigurationFile::from_lines("test.agc", lines("$Notes = \"a\nb\nc"));
        let all: Vec<AgcLine> = file.lines().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].values(), vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_non_default_calibration() {
        let default = AgcConfigurationFile::from_lines(
            "test.agc",
            lines(
                "$GCAUCalibrationData = \"Start\"\n\
                 CALIBR.Gain1 = \"1024\"\n\
                 $GCAUCalibrationData = \"End\"\n\
                 CALIBR.Gain2 = \"1000\"\n",
            ),
        );
        assert!(!default.contains_non_default_calibration_data());

        let modified = AgcConfigurationFile::from_lines(
            "test.agc",
            lines(
                "$GCAUCalibrationData = \"Start\"\n\
                 CALIBR.Gain1 = \"1024\"\n\
                 CALIBR.Gain2 = \"1000\"\n",
            ),
        );
        assert!(modified.contains_non_default_calibration_data());
    }

    #[test]
    fn file_name_extension() {
        assert!(AgcConfigurationFile::has_valid_file_name("site.agc"));
        assert!(AgcConfigurationFile::has_valid_file_name("SITE.AGC "));
        assert!(!AgcConfigurationFile::has_valid_file_name("site.agcp"));
        assert!(!AgcConfigurationFile::has_valid_file_name(".agc"));
    }

    #[test]
    fn open_rejects_wrong_extension() {
        let err = AgcConfigurationFile::open("site.txt").unwrap_err();
        assert!(matches!(err, FileError::WrongExtension(name) if name == "site.txt"));
    }
}
