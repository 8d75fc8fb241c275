//! # Class Restrictions
//!
//! Controllers only accept the configuration classes, instances and attributes of the
//! class version they run. A class-restriction source describes these limits in two YAML
//! documents:
//!
//! ```yaml
//! maxClasses: 12
//! ---
//! ANIX:
//!   - { minClasses: 0, instances: 4, cfgAttributes: 10 }
//!   - { minClasses: 8, instances: 8, cfgAttributes: 12 }
//! SYSTEM:
//!   - { minClasses: 0, instances: 0, cfgAttributes: 20 }
//! ```
//!
//! Once the class version of a controller is known, [ClassRestrictions::resolve] selects the
//! applicable definition of each class and [filter_patch_objects] trims patch objects down
//! to what the controller accepts.
//!
//! ```
//! use gcau_config::classes::{ClassRestrictions, filter_patch_objects};
//! use gcau_config::object::{Attribute, PatchObject};
//!
//! let mut restrictions = ClassRestrictions::from_yaml_str(
//!     "maxClasses: 12\n---\nANIX:\n  - { minClasses: 0, instances: 4, cfgAttributes: 1 }\n",
//!     "classes.yaml",
//! )
//! .unwrap();
//! assert!(restrictions.resolve(10));
//!
//! let objects = vec![
//!     PatchObject::new(
//!         "ANIX_1",
//!         vec![
//!             Attribute::new("VALUE", 1, Some("10".into()), false),
//!             Attribute::new("UNIT", 2, Some("bar".into()), false),
//!         ],
//!         2,
//!     ),
//!     PatchObject::new("ANIX_5", vec![Attribute::new("VALUE", 1, Some("1".into()), false)], 1),
//! ];
//! let filtered = filter_patch_objects(&objects, &restrictions);
//! assert_eq!(filtered.len(), 1);
//! assert_eq!(filtered[0].attributes().len(), 1);
//! ```
use std::{collections::HashMap, fmt::Display, fs, num::ParseIntError, path::Path};

use serde::Deserialize;
use serde_yaml::Value;

use crate::{
    agc::file_name_of,
    error::ClassSourceError,
    object::{Attribute, PatchObject},
};

const MAX_CLASSES_KEY: &str = "maxClasses";
const MIN_CLASSES_KEY: &str = "minClasses";
const INSTANCES_KEY: &str = "instances";
const CFG_ATTRIBUTES_KEY: &str = "cfgAttributes";

const EVENT_ENABLE_OBJECT: &str = "SYSVAR";
const EVENT_ENABLE_POSITION: u16 = 18;
const EVENT_CLASS: &str = "EVT";
/// Events per character of `SYSVAR.EventEnable`
const EVENTS_PER_DIGIT: u32 = 4;

/// Limits of a class from a given class version on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClassVersionDef {
    pub min_class_version: u32,
    /// 0 if the class has a single instance named after the class
    pub instance_count: u32,
    pub attribute_count: u32,
}

impl ClassVersionDef {
    pub fn new(min_class_version: u32, instance_count: u32, attribute_count: u32) -> Self {
        ClassVersionDef {
            min_class_version,
            instance_count,
            attribute_count,
        }
    }
}

/// All known definitions of one class, in source order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClassDefs {
    definitions: Vec<ClassVersionDef>,
    selected: Option<usize>,
}

impl ClassDefs {
    pub fn new(definitions: Vec<ClassVersionDef>) -> ClassDefs {
        ClassDefs {
            definitions,
            selected: None,
        }
    }

    pub fn definitions(&self) -> &[ClassVersionDef] {
        &self.definitions
    }

    /// Selects the definition with the greatest minimum version not above `actual_version`.
    /// The first one wins among equal minimum versions.
    ///
    /// Returns whether a definition applies.
    pub fn set_selected_index(&mut self, actual_version: u32) -> bool {
        let mut selected: Option<(usize, u32)> = None;
        for (index, definition) in self.definitions.iter().enumerate() {
            let min = definition.min_class_version;
            if min <= actual_version && selected.is_none_or(|(_, best)| best < min) {
                selected = Some((index, min));
            }
        }
        self.selected = selected.map(|(index, _)| index);
        self.selected.is_some()
    }

    /// Index of the definition chosen by the last [ClassDefs::set_selected_index]
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&ClassVersionDef> {
        self.definitions.get(self.selected?)
    }
}

/// Class limits of all controller class versions.
///
/// The default value carries no restriction at all and passes every object through.
#[derive(Clone, Debug, Default)]
pub struct ClassRestrictions {
    valid: bool,
    max_version: i32,
    target_class_version: Option<u32>,
    classes: HashMap<String, ClassDefs>,
}

fn structure_error(source: &str, message: impl Display) -> ClassSourceError {
    ClassSourceError::Structure(format!("Error in {}{}", source, message))
}

/// Text of a scalar node, `None` for sequences, mappings and tagged values.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

fn key_text(key: &Value) -> String {
    scalar_text(key).unwrap_or_default()
}

fn parse_definition(
    value: &Value,
    source: &str,
    class_name: &str,
    index: usize,
) -> Result<ClassVersionDef, ClassSourceError> {
    let Value::Mapping(entries) = value else {
        return Err(structure_error(
            source,
            format_args!(
                " with definition of {}: list element {} is not a simple mapping",
                class_name, index
            ),
        ));
    };
    let mut min_classes = None;
    let mut instances = None;
    let mut cfg_attributes = None;
    for (key, value) in entries {
        let key = key_text(key);
        let slot = match key.as_str() {
            MIN_CLASSES_KEY => &mut min_classes,
            INSTANCES_KEY => &mut instances,
            CFG_ATTRIBUTES_KEY => &mut cfg_attributes,
            _ => {
                return Err(structure_error(
                    source,
                    format_args!(
                        " with definition of {}, index {}: key '{}' is unexpected",
                        class_name, index, key
                    ),
                ));
            }
        };
        let Some(text) = scalar_text(value) else {
            return Err(structure_error(
                source,
                format_args!(
                    " with definition of {}, index {}, key {}: not a plain scalar",
                    class_name, index, key
                ),
            ));
        };
        if slot.is_some() {
            return Err(structure_error(
                source,
                format_args!(
                    " with definition of {}, index {}, key {}: defined multiple times",
                    class_name, index, key
                ),
            ));
        }
        let number = text.trim().parse::<u32>().map_err(|_| {
            structure_error(
                source,
                format_args!(
                    " with definition of {}, index {}, key {}: value is not a valid positive integer",
                    class_name, index, key
                ),
            )
        })?;
        *slot = Some(number);
    }
    let require = |slot: Option<u32>, key: &str| {
        slot.ok_or_else(|| {
            structure_error(
                source,
                format_args!(
                    " with definition of {}, index {}: key '{}' not defined",
                    class_name, index, key
                ),
            )
        })
    };
    Ok(ClassVersionDef::new(
        require(min_classes, MIN_CLASSES_KEY)?,
        require(instances, INSTANCES_KEY)?,
        require(cfg_attributes, CFG_ATTRIBUTES_KEY)?,
    ))
}

impl ClassRestrictions {
    /// Builds the restrictions from the two documents of a class-restriction source.
    /// `source` names the source in error messages.
    pub fn from_documents(
        documents: &[Value],
        source: &str,
    ) -> Result<ClassRestrictions, ClassSourceError> {
        let [header, body] = documents else {
            return Err(structure_error(source, ": does not contain two documents"));
        };
        let (Value::Mapping(header), Value::Mapping(body)) = (header, body) else {
            return Err(structure_error(
                source,
                ": main entries of documents are not of Mapping type",
            ));
        };
        if header.len() != 1 {
            return Err(structure_error(
                source,
                ": first document has not only one entry",
            ));
        }
        let Some(max_version) = header.get(MAX_CLASSES_KEY) else {
            return Err(structure_error(
                source,
                ": first document has no entry 'maxClasses'",
            ));
        };
        let max_version = scalar_text(max_version)
            .and_then(|text| text.trim().parse::<i32>().ok())
            .ok_or_else(|| {
                structure_error(
                    source,
                    ": 'maxClasses' in first document is not an integer",
                )
            })?;

        let mut classes = HashMap::with_capacity(body.len());
        for (class_name, definitions) in body {
            let class_name = key_text(class_name);
            let Value::Sequence(definitions) = definitions else {
                return Err(structure_error(
                    source,
                    format_args!(" with definition of {}: not a list", class_name),
                ));
            };
            let definitions = definitions
                .iter()
                .enumerate()
                .map(|(i, value)| parse_definition(value, source, &class_name, i + 1))
                .collect::<Result<Vec<_>, _>>()?;
            classes.insert(class_name, ClassDefs::new(definitions));
        }
        log::debug!(
            "Loaded restrictions of {} classes up to version {} from {}",
            classes.len(),
            max_version,
            source
        );
        Ok(ClassRestrictions {
            valid: true,
            max_version,
            target_class_version: None,
            classes,
        })
    }

    /// Parses a multi-document YAML text.
    pub fn from_yaml_str(text: &str, source: &str) -> Result<ClassRestrictions, ClassSourceError> {
        let documents = serde_yaml::Deserializer::from_str(text)
            .map(Value::deserialize)
            .collect::<Result<Vec<_>, _>>()?;
        ClassRestrictions::from_documents(&documents, source)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<ClassRestrictions, ClassSourceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        ClassRestrictions::from_yaml_str(&text, &file_name_of(path))
    }

    /// True if the restrictions were loaded from a well-formed source
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn max_version(&self) -> i32 {
        self.max_version
    }

    /// Class version of the connected controller. `None` means no filtering takes place.
    pub fn target_class_version(&self) -> Option<u32> {
        self.target_class_version
    }

    /// Has no effect on restrictions that are not valid.
    pub fn set_target_class_version(&mut self, version: u32) {
        self.target_class_version = if self.valid { Some(version) } else { None };
    }

    pub fn class(&self, name: &str) -> Option<&ClassDefs> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &ClassDefs)> {
        self.classes.iter().map(|(name, defs)| (name.as_str(), defs))
    }

    /// Targets `actual_version` and selects the applicable definition of every class.
    ///
    /// Returns true if every class has an applicable definition.
    pub fn resolve(&mut self, actual_version: u32) -> bool {
        self.set_target_class_version(actual_version);
        let mut resolved = true;
        for (name, defs) in self.classes.iter_mut() {
            if !defs.set_selected_index(actual_version) {
                log::debug!("Class {} is not defined in version {}", name, actual_version);
                resolved = false;
            }
        }
        resolved
    }
}

/// Splits an object name into class name and instance, `ANIX_1` into `ANIX` and 1.
/// Objects without instance suffix are instance 0.
pub fn split_object_name(object: &str) -> Result<(&str, u32), ParseIntError> {
    if let Some((class, instance)) = object.rsplit_once('_')
        && !class.is_empty()
        && !instance.is_empty()
        && instance.bytes().all(|b| b.is_ascii_digit())
    {
        return Ok((class, instance.parse()?));
    }
    Ok((object, 0))
}

/// Reasons the restrictions cannot be applied to an object
#[derive(Debug)]
enum RestrictionMiss {
    UnknownClass(String),
    BadInstance(ParseIntError),
    UnresolvedEventClass,
    MissingEventEnableValue,
}

impl Display for RestrictionMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestrictionMiss::UnknownClass(class) => write!(f, "class {} is unknown", class),
            RestrictionMiss::BadInstance(error) => write!(f, "bad instance number: {}", error),
            RestrictionMiss::UnresolvedEventClass => {
                write!(f, "class {} is not resolved", EVENT_CLASS)
            }
            RestrictionMiss::MissingEventEnableValue => write!(f, "EventEnable has no value"),
        }
    }
}

/// Right-aligns `value` to `length` characters, cutting off or padding with '0' on the left.
fn fit_event_enable(value: &str, length: usize) -> String {
    let count = value.chars().count();
    if count > length {
        value.chars().skip(count - length).collect()
    } else {
        format!("{:0>width$}", value, width = length)
    }
}

fn event_enable_length(restrictions: &ClassRestrictions) -> Result<usize, RestrictionMiss> {
    let events = restrictions
        .class(EVENT_CLASS)
        .ok_or_else(|| RestrictionMiss::UnknownClass(EVENT_CLASS.to_owned()))?
        .selected()
        .ok_or(RestrictionMiss::UnresolvedEventClass)?;
    Ok((events.instance_count / EVENTS_PER_DIGIT) as usize)
}

/// Applies the restrictions to a single object.
/// `Ok(None)` drops the object.
fn restrict_object(
    object: &PatchObject,
    restrictions: &ClassRestrictions,
) -> Result<Option<PatchObject>, RestrictionMiss> {
    let (class, instance) = split_object_name(object.name()).map_err(RestrictionMiss::BadInstance)?;
    let defs = restrictions
        .class(class)
        .ok_or_else(|| RestrictionMiss::UnknownClass(class.to_owned()))?;
    let Some(definition) = defs.selected() else {
        return Ok(None);
    };
    if definition.instance_count != 0 && instance > definition.instance_count {
        return Ok(None);
    }
    let mut attributes = Vec::new();
    for attribute in object.attributes() {
        if u32::from(attribute.position) > definition.attribute_count {
            continue;
        }
        if object.name() == EVENT_ENABLE_OBJECT && attribute.position == EVENT_ENABLE_POSITION {
            let length = event_enable_length(restrictions)?;
            let value = attribute
                .value()
                .ok_or(RestrictionMiss::MissingEventEnableValue)?;
            attributes.push(Attribute {
                value: Some(fit_event_enable(value, length)),
                ..attribute.clone()
            });
        } else {
            attributes.push(attribute.clone());
        }
    }
    if attributes.is_empty() {
        return Ok(None);
    }
    let total = u16::try_from(attributes.len()).unwrap_or(u16::MAX);
    Ok(Some(PatchObject::new(object.name(), attributes, total)))
}

/// Keeps the objects, instances and attributes the targeted class version accepts.
///
/// Returns a copy of `objects` if no class version is targeted. An object the restrictions
/// cannot be applied to, e.g. one of an unknown class, is kept unfiltered.
pub fn filter_patch_objects(
    objects: &[PatchObject],
    restrictions: &ClassRestrictions,
) -> Vec<PatchObject> {
    if restrictions.target_class_version().is_none() {
        return objects.to_vec();
    }
    let mut filtered = Vec::with_capacity(objects.len());
    for object in objects {
        match restrict_object(object, restrictions) {
            Ok(Some(restricted)) => filtered.push(restricted),
            Ok(None) => log::debug!("{} is not supported by the controller", object.name()),
            Err(miss) => {
                log::warn!("Passing {} unfiltered: {}", object.name(), miss);
                filtered.push(object.clone());
            }
        }
    }
    filtered
}
