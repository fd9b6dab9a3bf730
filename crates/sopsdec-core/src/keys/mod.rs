//! Data key recovery
//!
//! The data key is wrapped once per key-management backend listed in the
//! document metadata. A [`KeyResolver`] walks those entries in order and asks
//! the matching [`KeyService`] to unwrap each one until one succeeds.

pub mod age;

pub use self::age::AgeKeyService;

use crate::config::KeyConfig;
use crate::error::{Error, Result};
use crate::metadata::{AgeKey, AzureKvKey, GcpKmsKey, KmsKey, Metadata, PgpKey, VaultKey};
use crate::security::sanitize_error;
use rand::RngCore;
use std::fmt;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the data key in bytes (256 bits)
pub const DATA_KEY_SIZE: usize = 32;

/// Symmetric key that encrypts every value of a document.
///
/// Zeroed on drop; `Debug` never shows the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: Vec<u8>,
}

impl DataKey {
    /// Wrap unwrapped key material, checking its length
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != DATA_KEY_SIZE {
            let len = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(Error::key_resolution(format!(
                "data key must be {} bytes, got {} bytes",
                DATA_KEY_SIZE, len
            )));
        }
        Ok(Self { bytes })
    }

    /// Fresh random key for a new document
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; DATA_KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey([REDACTED {} bytes])", self.bytes.len())
    }
}

/// Key-management backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBackend {
    Age,
    Pgp,
    Kms,
    GcpKms,
    AzureKv,
    HcVault,
}

impl fmt::Display for KeyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyBackend::Age => write!(f, "age"),
            KeyBackend::Pgp => write!(f, "pgp"),
            KeyBackend::Kms => write!(f, "kms"),
            KeyBackend::GcpKms => write!(f, "gcp_kms"),
            KeyBackend::AzureKv => write!(f, "azure_kv"),
            KeyBackend::HcVault => write!(f, "hc_vault"),
        }
    }
}

/// One wrapped copy of the data key, borrowed from the metadata
#[derive(Debug, Clone, Copy)]
pub enum MasterKey<'a> {
    Age(&'a AgeKey),
    Pgp(&'a PgpKey),
    Kms(&'a KmsKey),
    GcpKms(&'a GcpKmsKey),
    AzureKv(&'a AzureKvKey),
    HcVault(&'a VaultKey),
}

impl MasterKey<'_> {
    pub fn backend(&self) -> KeyBackend {
        match self {
            MasterKey::Age(_) => KeyBackend::Age,
            MasterKey::Pgp(_) => KeyBackend::Pgp,
            MasterKey::Kms(_) => KeyBackend::Kms,
            MasterKey::GcpKms(_) => KeyBackend::GcpKms,
            MasterKey::AzureKv(_) => KeyBackend::AzureKv,
            MasterKey::HcVault(_) => KeyBackend::HcVault,
        }
    }

    /// Public identifier of the wrapping key (recipient, fingerprint, ARN, ...)
    pub fn identifier(&self) -> String {
        match self {
            MasterKey::Age(k) => k.recipient.clone(),
            MasterKey::Pgp(k) => k.fp.clone(),
            MasterKey::Kms(k) => k.arn.clone(),
            MasterKey::GcpKms(k) => k.resource_id.clone(),
            MasterKey::AzureKv(k) => format!("{}/keys/{}/{}", k.vault_url, k.name, k.version),
            MasterKey::HcVault(k) => {
                format!("{}/v1/{}/keys/{}", k.vault_address, k.engine_path, k.key_name)
            }
        }
    }

    /// Wrapped data key as stored in the document
    pub fn enc(&self) -> &str {
        match self {
            MasterKey::Age(k) => &k.enc,
            MasterKey::Pgp(k) => &k.enc,
            MasterKey::Kms(k) => &k.enc,
            MasterKey::GcpKms(k) => &k.enc,
            MasterKey::AzureKv(k) => &k.enc,
            MasterKey::HcVault(k) => &k.enc,
        }
    }
}

/// Trait for key-management backends
pub trait KeyService {
    /// Backend this service unwraps keys for
    fn backend(&self) -> KeyBackend;

    /// Recover the data key from one wrapped copy.
    ///
    /// Only called with master keys of [`KeyService::backend`]'s kind.
    fn unwrap_key(&self, key: &MasterKey<'_>) -> Result<DataKey>;
}

/// Recovers the data key of a document from its metadata
pub struct KeyResolver {
    services: Vec<Box<dyn KeyService>>,
}

impl KeyResolver {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// Resolver with every backend this crate ships, configured from `config`
    pub fn from_config(config: &KeyConfig) -> Result<Self> {
        let age = AgeKeyService::from_config(config)?;
        Ok(Self::new().with_service(age))
    }

    pub fn with_service(mut self, service: impl KeyService + 'static) -> Self {
        self.services.push(Box::new(service));
        self
    }

    fn service_for(&self, backend: KeyBackend) -> Option<&dyn KeyService> {
        self.services
            .iter()
            .find(|s| s.backend() == backend)
            .map(|s| s.as_ref())
    }

    /// Unwrap the data key, trying master keys in document order.
    ///
    /// Fails with a key resolution error listing every attempt when no
    /// backend succeeds. Nothing is retried.
    pub fn resolve(&self, metadata: &Metadata) -> Result<DataKey> {
        self.resolve_with_backend(metadata).map(|(key, _)| key)
    }

    /// Like [`KeyResolver::resolve`], also naming the backend that succeeded
    pub fn resolve_with_backend(&self, metadata: &Metadata) -> Result<(DataKey, KeyBackend)> {
        if metadata.key_groups.is_some() {
            return Err(Error::key_resolution(
                "documents using key groups (Shamir secret sharing) are not supported",
            ));
        }

        let mut failures = Vec::new();

        for master_key in metadata.master_keys() {
            let backend = master_key.backend();
            let Some(service) = self.service_for(backend) else {
                debug!(%backend, "No key service configured, skipping");
                failures.push(format!("{}: no key service configured", backend));
                continue;
            };

            match service.unwrap_key(&master_key) {
                Ok(key) => {
                    debug!(%backend, key = %master_key.identifier(), "Unwrapped data key");
                    return Ok((key, backend));
                }
                Err(e) => {
                    let reason = match &e {
                        Error::KeyResolution { reason } => sanitize_error(reason),
                        other => sanitize_error(&other.to_string()),
                    };
                    warn!(%backend, key = %master_key.identifier(), error = %reason, "Key service failed");
                    failures.push(format!("{} ({}): {}", backend, master_key.identifier(), reason));
                }
            }
        }

        if failures.is_empty() {
            return Err(Error::key_resolution("document lists no master keys"));
        }
        Err(Error::key_resolution(failures.join("; ")))
    }
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new()
    }
}
