//! Per-value authenticated encryption
//!
//! Every encrypted leaf is stored as
//! `ENC[AES256_GCM,data:<b64>,iv:<b64>,tag:<b64>,type:<type>]`.
//! AES-256-GCM runs with a 32-byte IV and a 16-byte tag. The additional
//! authenticated data binds the value to its position in the tree (or, for
//! the document MAC, to the last-modified timestamp).

use crate::keys::DataKey;
use aes_gcm::aead::consts::U32;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of the IV in bytes
pub const IV_SIZE: usize = 32;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

const PREFIX: &str = "ENC[AES256_GCM,";

type Aes256Gcm32 = AesGcm<Aes256, U32>;

/// Failures of a single encrypt/decrypt call
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CipherError {
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("authentication failed (wrong key, tampered value or wrong position)")]
    Authentication,

    #[error("could not encrypt value")]
    Encryption,

    #[error("invalid data key length: {0} bytes")]
    InvalidKey(usize),
}

/// Type tag recorded next to each ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    Comment,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Str => write!(f, "str"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Bytes => write!(f, "bytes"),
            ValueType::Comment => write!(f, "comment"),
        }
    }
}

impl FromStr for ValueType {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(ValueType::Str),
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "bool" => Ok(ValueType::Bool),
            "bytes" => Ok(ValueType::Bytes),
            "comment" => Ok(ValueType::Comment),
            other => Err(CipherError::Malformed(format!("unknown type '{}'", other))),
        }
    }
}

/// Parsed form of an `ENC[...]` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    pub data: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
    pub value_type: ValueType,
}

impl FromStr for EncryptedValue {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| CipherError::Malformed("not an ENC[AES256_GCM,...] value".into()))?;

        let mut data = None;
        let mut iv = None;
        let mut tag = None;
        let mut value_type = None;

        for part in body.split(',') {
            let (name, value) = part
                .split_once(':')
                .ok_or_else(|| CipherError::Malformed(format!("bad segment '{}'", name_of(part))))?;
            match name {
                "data" => data = Some(decode_b64("data", value)?),
                "iv" => iv = Some(decode_b64("iv", value)?),
                "tag" => tag = Some(decode_b64("tag", value)?),
                "type" => value_type = Some(value.parse::<ValueType>()?),
                other => {
                    return Err(CipherError::Malformed(format!("unknown segment '{}'", other)))
                }
            }
        }

        let missing = |field: &str| CipherError::Malformed(format!("missing {}", field));
        let iv = iv.ok_or_else(|| missing("iv"))?;
        let tag = tag.ok_or_else(|| missing("tag"))?;

        if iv.len() != IV_SIZE {
            return Err(CipherError::Malformed(format!(
                "invalid iv size: expected {}, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        if tag.len() != TAG_SIZE {
            return Err(CipherError::Malformed(format!(
                "invalid tag size: expected {}, got {}",
                TAG_SIZE,
                tag.len()
            )));
        }

        Ok(Self {
            data: data.ok_or_else(|| missing("data"))?,
            iv,
            tag,
            value_type: value_type.ok_or_else(|| missing("type"))?,
        })
    }
}

impl fmt::Display for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}data:{},iv:{},tag:{},type:{}]",
            PREFIX,
            BASE64.encode(&self.data),
            BASE64.encode(&self.iv),
            BASE64.encode(&self.tag),
            self.value_type
        )
    }
}

/// Segment name only, so error text never echoes ciphertext
fn name_of(part: &str) -> &str {
    part.split_once(':').map_or("", |(n, _)| n)
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, CipherError> {
    BASE64
        .decode(value)
        .map_err(|e| CipherError::Malformed(format!("invalid base64 in {}: {}", field, e)))
}

/// Whether `s` looks like an encrypted value
pub fn is_encrypted(s: &str) -> bool {
    s.starts_with(PREFIX)
}

fn cipher_for(key: &DataKey) -> Result<Aes256Gcm32, CipherError> {
    Aes256Gcm32::new_from_slice(key.as_bytes()).map_err(|_| CipherError::InvalidKey(key.len()))
}

/// Encrypt `plaintext` under `key`, binding it to `aad`.
///
/// An empty string stays empty, matching what decrypt accepts.
pub fn encrypt(
    plaintext: &[u8],
    value_type: ValueType,
    key: &DataKey,
    aad: &str,
) -> Result<String, CipherError> {
    if plaintext.is_empty() && value_type == ValueType::Str {
        return Ok(String::new());
    }

    let cipher = cipher_for(key)?;

    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let mut sealed = cipher
        .encrypt(
            Nonce::<U32>::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| CipherError::Encryption)?;

    let tag = sealed.split_off(sealed.len() - TAG_SIZE);

    Ok(EncryptedValue {
        data: sealed,
        iv: iv.to_vec(),
        tag,
        value_type,
    }
    .to_string())
}

/// Decrypt an `ENC[...]` string produced with `key` and `aad`.
///
/// The empty string decrypts to an empty `str`.
pub fn decrypt(
    ciphertext: &str,
    key: &DataKey,
    aad: &str,
) -> Result<(Zeroizing<Vec<u8>>, ValueType), CipherError> {
    if ciphertext.is_empty() {
        return Ok((Zeroizing::new(Vec::new()), ValueType::Str));
    }

    let parsed: EncryptedValue = ciphertext.parse()?;
    let cipher = cipher_for(key)?;

    let mut sealed = Vec::with_capacity(parsed.data.len() + TAG_SIZE);
    sealed.extend_from_slice(&parsed.data);
    sealed.extend_from_slice(&parsed.tag);

    let plaintext = cipher
        .decrypt(
            Nonce::<U32>::from_slice(&parsed.iv),
            Payload {
                msg: &sealed,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| CipherError::Authentication)?;

    Ok((Zeroizing::new(plaintext), parsed.value_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = DataKey::generate();
        let enc = encrypt(b"super-secret", ValueType::Str, &key, "db:password:").unwrap();

        assert!(is_encrypted(&enc));
        assert!(enc.ends_with(",type:str]"));

        let (plain, ty) = decrypt(&enc, &key, "db:password:").unwrap();
        assert_eq!(plain.as_slice(), b"super-secret");
        assert_eq!(ty, ValueType::Str);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = DataKey::generate();
        let enc = encrypt(b"value", ValueType::Str, &key, "FOO:").unwrap();
        assert_eq!(
            decrypt(&enc, &key, "BAR:").unwrap_err(),
            CipherError::Authentication
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let enc = encrypt(b"value", ValueType::Int, &DataKey::generate(), "n:").unwrap();
        assert_eq!(
            decrypt(&enc, &DataKey::generate(), "n:").unwrap_err(),
            CipherError::Authentication
        );
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = DataKey::generate();
        let a = encrypt(b"same", ValueType::Str, &key, "k:").unwrap();
        let b = encrypt(b"same", ValueType::Str, &key, "k:").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_string_passthrough() {
        let key = DataKey::generate();
        assert_eq!(encrypt(b"", ValueType::Str, &key, "k:").unwrap(), "");
        let (plain, ty) = decrypt("", &key, "k:").unwrap();
        assert!(plain.is_empty());
        assert_eq!(ty, ValueType::Str);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            "plaintext".parse::<EncryptedValue>(),
            Err(CipherError::Malformed(_))
        ));
        assert!(matches!(
            "ENC[AES256_GCM,data:AAAA,iv:AAAA,tag:AAAA,type:str]".parse::<EncryptedValue>(),
            Err(CipherError::Malformed(_))
        ));
        assert!(matches!(
            "ENC[AES256_GCM,data:!!,iv:AAAA,tag:AAAA,type:str]".parse::<EncryptedValue>(),
            Err(CipherError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let key = DataKey::generate();
        let enc = encrypt(b"1", ValueType::Int, &key, "n:").unwrap();
        let tampered = enc.replace("type:int", "type:uint");
        assert!(matches!(
            decrypt(&tampered, &key, "n:"),
            Err(CipherError::Malformed(_))
        ));
    }

    #[test]
    fn test_display_parse_roundtrip() {
        let key = DataKey::generate();
        let enc = encrypt(b"x", ValueType::Bool, &key, "").unwrap();
        let parsed: EncryptedValue = enc.parse().unwrap();
        assert_eq!(parsed.iv.len(), IV_SIZE);
        assert_eq!(parsed.tag.len(), TAG_SIZE);
        assert_eq!(parsed.to_string(), enc);
    }
}
