//! age key service
//!
//! The data key is wrapped for each X25519 recipient as an ASCII-armored age
//! message. Identities are loaded from, in order:
//! 1. `SOPS_AGE_KEY` (inline, one identity per line)
//! 2. `SOPS_AGE_KEY_FILE`
//! 3. `<config dir>/sops/age/keys.txt` when it exists

use crate::config::KeyConfig;
use crate::error::{Error, Result};
use crate::keys::{DataKey, KeyBackend, KeyService, MasterKey};
use crate::metadata::AgeKey;
use ::age::armor::{ArmoredReader, ArmoredWriter, Format as ArmorFormat};
use ::age::x25519::{Identity, Recipient};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;
use zeroize::Zeroizing;

/// Unwraps data keys with age X25519 identities
pub struct AgeKeyService {
    identities: Vec<Identity>,
}

impl AgeKeyService {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    /// Load identities from every configured source.
    ///
    /// Finding no identity is not an error here; unwrapping will report it.
    pub fn from_config(config: &KeyConfig) -> Result<Self> {
        let mut identities = Vec::new();

        if let Some(inline) = &config.age_keys {
            let parsed = parse_identities(inline.as_str())
                .map_err(|e| Error::key_resolution(format!("SOPS_AGE_KEY: {}", e)))?;
            debug!(count = parsed.len(), "Loaded age identities from environment");
            identities.extend(parsed);
        }

        if let Some(path) = config.age_key_file() {
            identities.extend(Self::read_key_file(&path)?);
        } else if let Some(path) = config.default_age_key_file() {
            if path.exists() {
                identities.extend(Self::read_key_file(&path)?);
            }
        }

        Ok(Self::new(identities))
    }

    fn read_key_file(path: &Path) -> Result<Vec<Identity>> {
        let content = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?);
        let parsed = parse_identities(&content)
            .map_err(|e| Error::key_resolution(format!("{}: {}", path.display(), e)))?;
        debug!(
            count = parsed.len(),
            path = %path.display(),
            "Loaded age identities from key file"
        );
        Ok(parsed)
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    /// Wrap `data_key` for each recipient, one metadata entry per recipient
    pub fn wrap(data_key: &DataKey, recipients: &[String]) -> Result<Vec<AgeKey>> {
        recipients
            .iter()
            .map(|recipient| {
                let parsed = recipient.trim().parse::<Recipient>().map_err(|e| {
                    Error::usage(format!("Invalid age recipient '{}': {}", recipient, e))
                })?;
                let enc = wrap_for(data_key, &parsed)?;
                Ok(AgeKey {
                    recipient: recipient.trim().to_string(),
                    enc,
                })
            })
            .collect()
    }
}

impl KeyService for AgeKeyService {
    fn backend(&self) -> KeyBackend {
        KeyBackend::Age
    }

    fn unwrap_key(&self, key: &MasterKey<'_>) -> Result<DataKey> {
        let MasterKey::Age(entry) = key else {
            return Err(Error::key_resolution(format!(
                "age service cannot unwrap {} keys",
                key.backend()
            )));
        };

        if self.identities.is_empty() {
            return Err(Error::key_resolution(
                "no age identities found (set SOPS_AGE_KEY or SOPS_AGE_KEY_FILE)",
            ));
        }

        let decryptor = ::age::Decryptor::new(ArmoredReader::new(entry.enc.as_bytes()))
            .map_err(|e| Error::key_resolution(format!("failed to read age envelope: {}", e)))?;

        let mut reader = decryptor
            .decrypt(
                self.identities
                    .iter()
                    .map(|identity| identity as &dyn ::age::Identity),
            )
            .map_err(|e| Error::key_resolution(format!("failed to decrypt data key: {}", e)))?;

        let mut bytes = Zeroizing::new(Vec::new());
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::key_resolution(format!("failed to read data key: {}", e)))?;

        DataKey::from_bytes(std::mem::take(&mut *bytes))
    }
}

/// Parse identity lines, skipping blanks and `#` comments
fn parse_identities(content: &str) -> std::result::Result<Vec<Identity>, String> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| {
            line.parse::<Identity>()
                .map_err(|e| format!("invalid age identity on line {}: {}", idx + 1, e))
        })
        .collect()
}

fn wrap_for(data_key: &DataKey, recipient: &Recipient) -> Result<String> {
    let encryptor =
        ::age::Encryptor::with_recipients(std::iter::once(recipient as &dyn ::age::Recipient))
            .map_err(|e| Error::usage(format!("Failed to create age encryptor: {}", e)))?;

    let wrap_err = |e: std::io::Error| Error::usage(format!("Failed to wrap data key: {}", e));

    let mut armored = Vec::new();
    let armor = ArmoredWriter::wrap_output(&mut armored, ArmorFormat::AsciiArmor).map_err(wrap_err)?;
    let mut writer = encryptor.wrap_output(armor).map_err(wrap_err)?;
    writer.write_all(data_key.as_bytes()).map_err(wrap_err)?;
    writer.finish().and_then(|armor| armor.finish()).map_err(wrap_err)?;

    String::from_utf8(armored).map_err(|_| Error::usage("age armor produced non UTF-8 output"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EncryptionRules, KeyWrapping, Metadata};
    use ::age::secrecy::ExposeSecret;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let identity = Identity::generate();
        let recipient = identity.to_public().to_string();
        let data_key = DataKey::generate();

        let wrapped = AgeKeyService::wrap(&data_key, &[recipient.clone()]).unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].recipient, recipient);
        assert!(wrapped[0].enc.starts_with("-----BEGIN AGE ENCRYPTED FILE-----"));

        let service = AgeKeyService::new(vec![identity]);
        let unwrapped = service.unwrap_key(&MasterKey::Age(&wrapped[0])).unwrap();
        assert_eq!(unwrapped.as_bytes(), data_key.as_bytes());
    }

    #[test]
    fn test_unauthorized_identity_fails() {
        let owner = Identity::generate();
        let data_key = DataKey::generate();
        let wrapped = AgeKeyService::wrap(&data_key, &[owner.to_public().to_string()]).unwrap();

        let service = AgeKeyService::new(vec![Identity::generate()]);
        let err = service.unwrap_key(&MasterKey::Age(&wrapped[0])).unwrap_err();
        assert!(matches!(err, Error::KeyResolution { .. }));
    }

    #[test]
    fn test_resolve_keeps_age_failure_reason() {
        let owner = Identity::generate();
        let keys = KeyWrapping {
            age: AgeKeyService::wrap(&DataKey::generate(), &[owner.to_public().to_string()])
                .unwrap(),
            ..Default::default()
        };
        let metadata = Metadata::new(keys, EncryptionRules::new());

        let resolver = crate::keys::KeyResolver::new()
            .with_service(AgeKeyService::new(vec![Identity::generate()]));
        let err = resolver.resolve(&metadata).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("failed to decrypt data key: No matching keys found"));
        assert!(!message.contains("REDACTED"));
    }

    #[test]
    fn test_no_identities_fails() {
        let owner = Identity::generate();
        let wrapped =
            AgeKeyService::wrap(&DataKey::generate(), &[owner.to_public().to_string()]).unwrap();

        let service = AgeKeyService::new(vec![]);
        let err = service.unwrap_key(&MasterKey::Age(&wrapped[0])).unwrap_err();
        assert!(err.to_string().contains("no age identities found"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let err = AgeKeyService::wrap(&DataKey::generate(), &["age1nope".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
    }

    #[test]
    fn test_parse_identities_skips_comments() {
        let identity = Identity::generate();
        let content = format!(
            "# created: 2024-01-01\n# public key: {}\n\n{}\n",
            identity.to_public(),
            identity.to_string().expose_secret()
        );
        let parsed = parse_identities(&content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].to_public().to_string(), identity.to_public().to_string());
    }

    #[test]
    fn test_parse_identities_reports_line() {
        let Err(err) = parse_identities("# header\nnot-a-key\n") else {
            panic!("expected a parse error");
        };
        assert!(err.contains("line 2"));
        assert!(!err.contains("not-a-key"));
    }

    #[test]
    fn test_second_recipient_can_unwrap() {
        let first = Identity::generate();
        let second = Identity::generate();
        let data_key = DataKey::generate();
        let keys = KeyWrapping {
            age: AgeKeyService::wrap(
                &data_key,
                &[first.to_public().to_string(), second.to_public().to_string()],
            )
            .unwrap(),
            ..Default::default()
        };
        let metadata = Metadata::new(keys, EncryptionRules::new());

        let resolver =
            crate::keys::KeyResolver::new().with_service(AgeKeyService::new(vec![second]));
        let recovered = resolver.resolve(&metadata).unwrap();
        assert_eq!(recovered.as_bytes(), data_key.as_bytes());
    }
}
