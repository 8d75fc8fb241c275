//! Splitting of object writes into commands of bounded length.
//!
//! A write command looks like `@[slave][&channel]/VERB/OBJECT/pos:value/pos:value...`.
//! Commands may not exceed [MAX_COMMAND_LEN] bytes including their closing suffix, so the
//! attributes of one object are spread over as many commands as needed, each restating
//! the full header.
use std::fmt::Display;

use gcau_config::{Attribute, PatchObject};
use spg_protocol::{
    FrameError, MAX_COMMAND_LEN,
    codec::{close_command, compare_reply_field, decode_value, encode_value, parse_frame},
};

/// SYN, two checksum digits and the carriage return
const SUFFIX_LEN: usize = 4;

/// One command of a write, with the attributes it carries
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    attributes: Vec<Attribute>,
    command: String,
}

impl Chunk {
    fn new(header: &str) -> Chunk {
        Chunk {
            attributes: Vec::new(),
            command: header.to_owned(),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The closed command, ready to be sent
    pub fn command(&self) -> &str {
        &self.command
    }
}

/// The commands writing one [PatchObject]
#[derive(Clone, Debug)]
pub struct WriteChunks {
    object_name: String,
    verb: String,
    prefix: String,
    chunks: Vec<Chunk>,
}

/// `@[slave][&channel]`
pub fn command_prefix(slave_number: Option<u32>, channel: Option<u32>) -> String {
    let mut prefix = String::from("@");
    if let Some(slave) = slave_number {
        prefix.push_str(&slave.to_string());
    }
    if let Some(channel) = channel {
        prefix.push('&');
        prefix.push_str(&channel.to_string());
    }
    prefix
}

impl WriteChunks {
    /// Builds the commands writing `object` with `verb`, e.g. `WCFG`.
    ///
    /// Read-only attributes and attributes without value are not written.
    /// An object without writable attributes yields no command at all.
    pub fn new(
        object: &PatchObject,
        verb: &str,
        slave_number: Option<u32>,
        channel: Option<u32>,
    ) -> WriteChunks {
        let prefix = command_prefix(slave_number, channel);
        let header = format!("{}/{}/{}", prefix, verb, object.name());
        let mut chunks = Vec::new();
        let mut chunk = Chunk::new(&header);
        for attribute in object.attributes() {
            if attribute.read_only {
                continue;
            }
            let Some(value) = attribute.value() else {
                continue;
            };
            let addition = format!("/{}:{}", attribute.position, encode_value(value));
            if !chunk.attributes.is_empty()
                && chunk.command.len() + addition.len() + SUFFIX_LEN > MAX_COMMAND_LEN
            {
                let full = std::mem::replace(&mut chunk, Chunk::new(&header));
                chunks.push(full);
            }
            chunk.command.push_str(&addition);
            chunk.attributes.push(attribute.clone());
        }
        if !chunk.attributes.is_empty() {
            chunks.push(chunk);
        }
        for chunk in chunks.iter_mut() {
            chunk.command = close_command(&chunk.command);
        }
        WriteChunks {
            object_name: object.name().to_owned(),
            verb: verb.to_owned(),
            prefix,
            chunks,
        }
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Verifies that `reply` echoes the verb, the object and every value sent with `chunk`.
    pub fn check_reply(&self, reply: &str, chunk: &Chunk) -> FrameError {
        let frame = parse_frame(reply, true);
        if !frame.is_valid() {
            return frame.error();
        }
        let fields = frame.fields();
        if fields.len() < 2 {
            return FrameError::ReplyTooShort;
        }
        if fields[0] != self.verb {
            return FrameError::WrongVerbInReply;
        }
        if fields[1] != self.object_name {
            return FrameError::WrongObjectInReply;
        }
        for attribute in &chunk.attributes {
            let Some(field) = fields.get(usize::from(attribute.position) + 1) else {
                return FrameError::ReplyTooShort;
            };
            let requested = attribute.value().unwrap_or_default();
            if !compare_reply_field(requested, &decode_value(field)) {
                log::debug!(
                    "{}.{}: requested {:?} but controller replied {:?}",
                    self.object_name,
                    attribute.name,
                    requested,
                    field
                );
                return FrameError::ReplyFieldDoesNotMatchRequestField;
            }
        }
        FrameError::Ok
    }
}

impl Display for WriteChunks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chunks for {} with verb {}:", self.object_name, self.verb)?;
        if self.chunks.is_empty() {
            return write!(f, " <Empty>");
        }
        for (index, chunk) in self.chunks.iter().enumerate() {
            let positions: Vec<String> = chunk
                .attributes
                .iter()
                .map(|a| a.position.to_string())
                .collect();
            write!(
                f,
                "\n Chunk #{}:\n  position list: {}\n  command: {:?}",
                index + 1,
                positions.join(" "),
                chunk.command
            )?;
        }
        Ok(())
    }
}
