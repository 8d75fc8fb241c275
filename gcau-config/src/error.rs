use std::{error::Error, fmt::Display, io};

/// Errors that may occur when loading a configuration, patch or language file.
#[derive(Debug)]
pub enum FileError {
    IoError(io::Error),
    WrongExtension(String),
    /// The file name does not follow the language file pattern.
    WrongFileName(String),
    /// The `[Data]` section was never reached.
    InconsistentFile,
    /// An encrypted patch file was opened without key material.
    MissingCipher,
    Decrypt {
        line: usize,
        error: CryptoError,
    },
    Syntax {
        line: usize,
    },
    WrongChecksum {
        line: usize,
        expected: String,
        got: String,
    },
}

impl From<io::Error> for FileError {
    fn from(value: io::Error) -> Self {
        FileError::IoError(value)
    }
}

impl Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::IoError(error) => write!(f, "{}", error),
            FileError::WrongExtension(file_name) => {
                write!(f, "File extension of {} is wrong", file_name)
            }
            FileError::WrongFileName(file_name) => write!(
                f,
                "File name {} does not comply with language file pattern",
                file_name
            ),
            FileError::InconsistentFile => write!(f, "Inconsistent file"),
            FileError::MissingCipher => {
                write!(f, "Encrypted patch file requires key material")
            }
            FileError::Decrypt { line, error } => {
                write!(f, "Cannot decrypt line {}: {}", line, error)
            }
            FileError::Syntax { line } => write!(f, "Syntax error at line {}", line),
            FileError::WrongChecksum {
                line,
                expected,
                got,
            } => write!(
                f,
                "Wrong checksum at line {} (should be {}, not {})",
                line, expected, got
            ),
        }
    }
}

impl Error for FileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FileError::IoError(error) => Some(error),
            FileError::Decrypt { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Errors of the patch file cipher.
#[derive(Debug)]
pub enum CryptoError {
    InvalidHex(hex::FromHexError),
    InvalidLength { expected: usize, got: usize },
    BadPadding,
    InvalidUtf8,
}

impl From<hex::FromHexError> for CryptoError {
    fn from(value: hex::FromHexError) -> Self {
        CryptoError::InvalidHex(value)
    }
}

impl Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::InvalidHex(error) => write!(f, "Not a valid hex string: {}", error),
            CryptoError::InvalidLength { expected, got } => {
                write!(f, "Expected {} bytes of key material, but got {}", expected, got)
            }
            CryptoError::BadPadding => write!(f, "Bad padding in decrypted data"),
            CryptoError::InvalidUtf8 => write!(f, "Decrypted data is not valid UTF-8"),
        }
    }
}

impl Error for CryptoError {}

/// Errors that may occur when reading a class-restriction source.
#[derive(Debug)]
pub enum ClassSourceError {
    IoError(io::Error),
    Yaml(serde_yaml::Error),
    /// The documents are valid YAML but do not describe class restrictions.
    Structure(String),
}

impl From<io::Error> for ClassSourceError {
    fn from(value: io::Error) -> Self {
        ClassSourceError::IoError(value)
    }
}

impl From<serde_yaml::Error> for ClassSourceError {
    fn from(value: serde_yaml::Error) -> Self {
        ClassSourceError::Yaml(value)
    }
}

impl Display for ClassSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassSourceError::IoError(error) => write!(f, "{}", error),
            ClassSourceError::Yaml(error) => write!(f, "Invalid YAML: {}", error),
            ClassSourceError::Structure(message) => write!(f, "{}", message),
        }
    }
}

impl Error for ClassSourceError {}
