//! # gCAU Configuration Files
//!
//! This crate models the files used to configure gCAU controllers:
//!
//! * [agc]: configuration files (`.agc`), broken down line by line
//! * [patch]: patch files (`.agcp`, `.agcp0`) and the [PatchObject]s they contain
//! * [classes]: class restrictions deciding which objects and attributes a controller
//!   of a given class version accepts
//! * [language]: language files uploaded to controllers
//!
//! No I/O towards controllers happens here; see the `gcau-client` crate for that.
//!
//! ## Example
//!
//! ```
//! use gcau_config::{PatchFile, PatchFileKind};
//!
//! let contents = [
//!     "[Description]",
//!     "Raise the pressure limit",
//!     "[Data]",
//!     "ANIX_2.!STATUS = \"OK\"",
//!     "ANIX_2.LIMIT = \"12.5\"",
//! ];
//! let patch = PatchFile::from_lines(
//!     "limits.agcp0",
//!     PatchFileKind::Decoded,
//!     contents.iter().map(|l| l.to_string()).collect(),
//!     false,
//! )
//! .unwrap();
//!
//! let anix = &patch.patch_objects()[0];
//! assert_eq!(anix.name(), "ANIX_2");
//! assert_eq!(anix.attributes().len(), 2);
//! assert!(anix.attribute(1).unwrap().read_only);
//! assert_eq!(anix.attribute(2).unwrap().value(), Some("12.5"));
//! ```
pub mod agc;
pub mod cipher;
pub mod classes;
pub mod error;
pub mod language;
pub mod object;
pub mod patch;
mod scan;

pub use agc::{AgcConfigurationFile, AgcLine, AgcLineKind};
pub use cipher::PatchCipher;
pub use classes::{ClassRestrictions, filter_patch_objects, split_object_name};
pub use error::{ClassSourceError, CryptoError, FileError};
pub use language::LanguageFile;
pub use object::{Attribute, PatchObject};
pub use patch::{PatchFile, PatchFileKind, parse_agc_line};
