//! Line cipher of distributed patch files.
//!
//! Every data line of an `.agcp` file is encrypted on its own with AES-128 in CBC mode,
//! PKCS#7 padded and written as uppercase hex. The same key and IV are used for all lines.
use std::fmt::Debug;

use aes::Aes128;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::error::CryptoError;

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

const BLOCK_LEN: usize = 16;

/// Key material for patch files
#[derive(Clone, PartialEq, Eq)]
pub struct PatchCipher {
    key: [u8; 16],
    iv: [u8; 16],
}

fn key_material(text: &str) -> Result<[u8; 16], CryptoError> {
    let bytes = hex::decode(text.trim())?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidLength { expected: 16, got })
}

impl PatchCipher {
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> PatchCipher {
        PatchCipher { key, iv }
    }

    /// Builds the cipher from 32-digit hex strings.
    pub fn from_hex(key: &str, iv: &str) -> Result<PatchCipher, CryptoError> {
        Ok(PatchCipher {
            key: key_material(key)?,
            iv: key_material(iv)?,
        })
    }

    pub fn encrypt_line(&self, line: &str) -> String {
        let encrypted = Encryptor::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(line.as_bytes());
        hex::encode_upper(encrypted)
    }

    pub fn decrypt_line(&self, line: &str) -> Result<String, CryptoError> {
        let encrypted = hex::decode(line)?;
        if encrypted.is_empty() || encrypted.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::InvalidLength {
                expected: encrypted.len().div_ceil(BLOCK_LEN).max(1) * BLOCK_LEN,
                got: encrypted.len(),
            });
        }
        let decrypted = Decryptor::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&encrypted)
            .map_err(|_| CryptoError::BadPadding)?;
        String::from_utf8(decrypted).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl Debug for PatchCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cipher() -> PatchCipher {
        PatchCipher::from_hex(
            "000102030405060708090A0B0C0D0E0F",
            "0f0e0d0c0b0a09080706050403020100",
        )
        .unwrap()
    }

    #[test]
    fn encrypted_lines_are_uppercase_hex() {
        let encrypted = cipher().encrypt_line("ANIX_1.VALUE = \"10\"");
        assert_eq!(encrypted.len(), 64);
        assert!(
            encrypted
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
        assert_eq!(
            cipher().decrypt_line(&encrypted).unwrap(),
            "ANIX_1.VALUE = \"10\""
        );
    }

    #[test]
    fn empty_line_takes_one_block() {
        let encrypted = cipher().encrypt_line("");
        assert_eq!(encrypted.len(), 32);
        assert_eq!(cipher().decrypt_line(&encrypted).unwrap(), "");
    }

    #[test]
    fn rejects_bad_key_material() {
        assert!(matches!(
            PatchCipher::from_hex("0001", "0f0e0d0c0b0a09080706050403020100"),
            Err(CryptoError::InvalidLength {
                expected: 16,
                got: 2
            })
        ));
        assert!(matches!(
            PatchCipher::from_hex("zz", "0f0e0d0c0b0a09080706050403020100"),
            Err(CryptoError::InvalidHex(_))
        ));
    }

    #[test]
    fn rejects_truncated_lines() {
        let encrypted = cipher().encrypt_line("SYSTEM.Name = \"plant\"");
        assert!(matches!(
            cipher().decrypt_line(&encrypted[..30]),
            Err(CryptoError::InvalidLength { .. })
        ));
        assert!(matches!(
            cipher().decrypt_line("not hex"),
            Err(CryptoError::InvalidHex(_))
        ));
    }

    #[test]
    fn debug_hides_key_material() {
        assert_eq!(format!("{:?}", cipher()), "PatchCipher { .. }");
    }
}
