use std::fmt::Display;

/// One attribute of a configuration object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// 1-based position of the attribute within its object
    pub position: u16,
    /// `None` if the attribute exists but carries no value.
    /// This only happens when a patch file is read with the full attribute set.
    pub value: Option<String>,
    /// Read-only attributes are never written to a controller
    pub read_only: bool,
}

impl Attribute {
    pub fn new(
        name: impl Into<String>,
        position: u16,
        value: Option<String>,
        read_only: bool,
    ) -> Attribute {
        Attribute {
            name: name.into(),
            position,
            value,
            read_only,
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// A configuration object instance, e.g. `ANIX_1`, with the attributes to be patched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PatchObject {
    name: String,
    attributes: Vec<Attribute>,
    total_number_of_attributes: u16,
}

impl PatchObject {
    pub fn new(
        name: impl Into<String>,
        attributes: Vec<Attribute>,
        total_number_of_attributes: u16,
    ) -> PatchObject {
        PatchObject {
            name: name.into(),
            attributes,
            total_number_of_attributes,
        }
    }

    /// The object name including its instance suffix, e.g. `ANIX_1`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes ordered by position
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Number of attribute positions the object spans, including attributes without value
    pub fn total_number_of_attributes(&self) -> u16 {
        self.total_number_of_attributes
    }

    pub fn attribute(&self, position: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.position == position)
    }

    /// Renders the attribute at `position` as a configuration statement
    /// `OBJ.[!]ATTR = "value"`.
    pub fn build_line(&self, position: u16) -> Option<String> {
        let attribute = self.attribute(position)?;
        Some(format!(
            "{}.{}{} = \"{}\"",
            self.name,
            if attribute.read_only { "!" } else { "" },
            attribute.name,
            attribute.value().unwrap_or_default()
        ))
    }
}

impl Display for PatchObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} of {} attributes)",
            self.name,
            self.attributes.len(),
            self.total_number_of_attributes
        )
    }
}

/// Accumulates the attributes of one object while a file is read.
///
/// Every statement for the object claims the next position, whether or not
/// its attribute ends up being kept.
#[derive(Debug)]
pub(crate) struct PatchObjectBuilder {
    name: String,
    attributes: Vec<Attribute>,
    next_position: u16,
}

impl PatchObjectBuilder {
    pub fn new(name: impl Into<String>) -> PatchObjectBuilder {
        PatchObjectBuilder {
            name: name.into(),
            attributes: Vec::new(),
            next_position: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn claim_position(&mut self) -> u16 {
        let position = self.next_position;
        self.next_position = self.next_position.saturating_add(1);
        position
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    pub fn seal(self) -> PatchObject {
        PatchObject {
            name: self.name,
            attributes: self.attributes,
            total_number_of_attributes: self.next_position - 1,
        }
    }
}
