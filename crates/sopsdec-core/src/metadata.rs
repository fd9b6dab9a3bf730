//! Document metadata
//!
//! Every encrypted document carries a `sops` section with the wrapped data
//! key (one entry per key-management backend), the last-modified timestamp,
//! the encrypted MAC and the rules that decide which values are encrypted.

use crate::keys::MasterKey;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Suffix used when a document configures no encryption rule at all
pub const DEFAULT_UNENCRYPTED_SUFFIX: &str = "_unencrypted";

/// Metadata format version written by [`Metadata::new`]
pub const METADATA_VERSION: &str = "3.9.0";

/// age recipient entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeKey {
    pub recipient: String,
    pub enc: String,
}

/// PGP entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgpKey {
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
    pub fp: String,
}

/// AWS KMS entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmsKey {
    pub arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,
}

/// GCP KMS entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpKmsKey {
    pub resource_id: String,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
}

/// Azure Key Vault entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureKvKey {
    pub vault_url: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
}

/// HashiCorp Vault transit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultKey {
    pub vault_address: String,
    pub engine_path: String,
    pub key_name: String,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
}

/// Wrapped copies of the data key, grouped by backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyWrapping {
    pub age: Vec<AgeKey>,
    pub pgp: Vec<PgpKey>,
    pub kms: Vec<KmsKey>,
    pub gcp_kms: Vec<GcpKmsKey>,
    pub azure_kv: Vec<AzureKvKey>,
    pub hc_vault: Vec<VaultKey>,
}

impl KeyWrapping {
    pub fn is_empty(&self) -> bool {
        self.age.is_empty()
            && self.pgp.is_empty()
            && self.kms.is_empty()
            && self.gcp_kms.is_empty()
            && self.azure_kv.is_empty()
            && self.hc_vault.is_empty()
    }
}

/// Which leaves are encrypted, decided from the keys on their path
#[derive(Debug, Clone, Default)]
pub struct EncryptionRules {
    unencrypted_suffix: Option<String>,
    encrypted_suffix: Option<String>,
    unencrypted_regex: Option<Regex>,
    encrypted_regex: Option<Regex>,
    mac_only_encrypted: bool,
}

impl EncryptionRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unencrypted_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.unencrypted_suffix = Some(suffix.into());
        self
    }

    pub fn with_encrypted_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.encrypted_suffix = Some(suffix.into());
        self
    }

    pub fn with_unencrypted_regex(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.unencrypted_regex = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn with_encrypted_regex(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.encrypted_regex = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn with_mac_only_encrypted(mut self, enabled: bool) -> Self {
        self.mac_only_encrypted = enabled;
        self
    }

    pub fn mac_only_encrypted(&self) -> bool {
        self.mac_only_encrypted
    }

    fn is_unconfigured(&self) -> bool {
        self.unencrypted_suffix.is_none()
            && self.encrypted_suffix.is_none()
            && self.unencrypted_regex.is_none()
            && self.encrypted_regex.is_none()
    }

    fn effective_unencrypted_suffix(&self) -> Option<&str> {
        if self.is_unconfigured() {
            Some(DEFAULT_UNENCRYPTED_SUFFIX)
        } else {
            self.unencrypted_suffix.as_deref()
        }
    }

    /// Whether the leaf at `path` is stored encrypted.
    ///
    /// Rules are applied in order; a later rule overrides an earlier one.
    pub fn should_encrypt(&self, path: &[String]) -> bool {
        let mut encrypted = true;

        if let Some(suffix) = self.effective_unencrypted_suffix() {
            if path.iter().any(|k| k.ends_with(suffix)) {
                encrypted = false;
            }
        }
        if let Some(suffix) = &self.encrypted_suffix {
            encrypted = path.iter().any(|k| k.ends_with(suffix.as_str()));
        }
        if let Some(re) = &self.unencrypted_regex {
            if path.iter().any(|k| re.is_match(k)) {
                encrypted = false;
            }
        }
        if let Some(re) = &self.encrypted_regex {
            encrypted = path.iter().any(|k| re.is_match(k));
        }

        encrypted
    }
}

/// On-disk shape of the `sops` section
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMetadata {
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    kms: Vec<KmsKey>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    gcp_kms: Vec<GcpKmsKey>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    azure_kv: Vec<AzureKvKey>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    hc_vault: Vec<VaultKey>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    age: Vec<AgeKey>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pgp: Vec<PgpKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_groups: Option<serde_json::Value>,
    lastmodified: String,
    mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unencrypted_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unencrypted_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_regex: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    mac_only_encrypted: bool,
    #[serde(default)]
    version: String,
}

/// Key lists written as `null` by older releases read as empty
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Parsed and validated document metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawMetadata", into = "RawMetadata")]
pub struct Metadata {
    pub keys: KeyWrapping,
    /// Shamir key groups; present only in documents this crate cannot open
    pub key_groups: Option<serde_json::Value>,
    pub last_modified: DateTime<FixedOffset>,
    /// Encrypted MAC (`ENC[...]`)
    pub mac: String,
    pub version: String,
    rules: EncryptionRules,
}

impl Metadata {
    /// Metadata for a new document; the MAC is filled in when sealing.
    pub fn new(keys: KeyWrapping, rules: EncryptionRules) -> Self {
        Self {
            keys,
            key_groups: None,
            last_modified: Utc::now().fixed_offset(),
            mac: String::new(),
            version: METADATA_VERSION.to_string(),
            rules,
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<FixedOffset>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn rules(&self) -> &EncryptionRules {
        &self.rules
    }

    /// Timestamp text authenticated together with the MAC.
    ///
    /// RFC 3339 with whole seconds; UTC is written as `Z`.
    pub fn mac_aad(&self) -> String {
        format_timestamp(&self.last_modified)
    }

    /// Wrapped data keys in the order they are tried
    pub fn master_keys(&self) -> Vec<MasterKey<'_>> {
        let k = &self.keys;
        k.age
            .iter()
            .map(MasterKey::Age)
            .chain(k.pgp.iter().map(MasterKey::Pgp))
            .chain(k.kms.iter().map(MasterKey::Kms))
            .chain(k.gcp_kms.iter().map(MasterKey::GcpKms))
            .chain(k.azure_kv.iter().map(MasterKey::AzureKv))
            .chain(k.hc_vault.iter().map(MasterKey::HcVault))
            .collect()
    }
}

fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl TryFrom<RawMetadata> for Metadata {
    type Error = String;

    fn try_from(raw: RawMetadata) -> Result<Self, Self::Error> {
        let last_modified = DateTime::parse_from_rfc3339(raw.lastmodified.trim())
            .map_err(|e| format!("invalid lastmodified '{}': {}", raw.lastmodified, e))?;

        if raw.mac.trim().is_empty() {
            return Err("missing mac".to_string());
        }

        let keys = KeyWrapping {
            age: raw.age,
            pgp: raw.pgp,
            kms: raw.kms,
            gcp_kms: raw.gcp_kms,
            azure_kv: raw.azure_kv,
            hc_vault: raw.hc_vault,
        };
        if keys.is_empty() && raw.key_groups.is_none() {
            return Err("no key wrapping entries (age, pgp, kms, ...)".to_string());
        }

        let mut rules = EncryptionRules::new().with_mac_only_encrypted(raw.mac_only_encrypted);
        rules.unencrypted_suffix = raw.unencrypted_suffix;
        rules.encrypted_suffix = raw.encrypted_suffix;
        if let Some(pattern) = raw.unencrypted_regex.as_deref() {
            rules = rules
                .with_unencrypted_regex(pattern)
                .map_err(|e| format!("invalid unencrypted_regex: {}", e))?;
        }
        if let Some(pattern) = raw.encrypted_regex.as_deref() {
            rules = rules
                .with_encrypted_regex(pattern)
                .map_err(|e| format!("invalid encrypted_regex: {}", e))?;
        }

        Ok(Self {
            keys,
            key_groups: raw.key_groups,
            last_modified,
            mac: raw.mac,
            version: raw.version,
            rules,
        })
    }
}

impl From<Metadata> for RawMetadata {
    fn from(m: Metadata) -> Self {
        let lastmodified = format_timestamp(&m.last_modified);
        let unencrypted_suffix = m
            .rules
            .effective_unencrypted_suffix()
            .map(str::to_string);
        let rules = m.rules;
        let keys = m.keys;

        Self {
            kms: keys.kms,
            gcp_kms: keys.gcp_kms,
            azure_kv: keys.azure_kv,
            hc_vault: keys.hc_vault,
            age: keys.age,
            pgp: keys.pgp,
            key_groups: m.key_groups,
            lastmodified,
            mac: m.mac,
            unencrypted_suffix,
            encrypted_suffix: rules.encrypted_suffix,
            unencrypted_regex: rules.unencrypted_regex.map(|r| r.as_str().to_string()),
            encrypted_regex: rules.encrypted_regex.map(|r| r.as_str().to_string()),
            mac_only_encrypted: rules.mac_only_encrypted,
            version: m.version,
        }
    }
}
