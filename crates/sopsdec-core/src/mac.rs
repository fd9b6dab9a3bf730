//! Document MAC
//!
//! SHA-512 over the canonical text of every leaf in document order,
//! rendered as uppercase hex. With `mac_only_encrypted` only leaves the
//! rules mark as encrypted contribute. Comments never do.

use crate::cipher;
use crate::error::{Error, Result};
use crate::keys::DataKey;
use crate::metadata::{EncryptionRules, Metadata};
use crate::tree::{Plaintext, Tree};
use sha2::{Digest, Sha512};
use tracing::{debug, warn};

/// Recompute the MAC of a plaintext tree
pub fn compute(tree: &Tree<Plaintext>, rules: &EncryptionRules) -> String {
    let mut hasher = Sha512::new();
    tree.for_each_leaf(|path, value| {
        if rules.mac_only_encrypted() && !rules.should_encrypt(path) {
            return;
        }
        if let Some(bytes) = value.canonical_bytes() {
            hasher.update(&bytes);
        }
    });
    hex::encode_upper(hasher.finalize())
}

/// Check the stored MAC against the decrypted tree.
///
/// A stored MAC that cannot be decrypted (wrong key or altered timestamp)
/// is reported as an integrity failure.
pub fn verify(tree: &Tree<Plaintext>, metadata: &Metadata, key: &DataKey) -> Result<()> {
    let actual = compute(tree, metadata.rules());

    let expected = match cipher::decrypt(&metadata.mac, key, &metadata.mac_aad()) {
        Ok((bytes, _)) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(error = %e, "Stored MAC could not be decrypted");
            return Err(Error::integrity("<undecryptable>", actual));
        }
    };

    if expected != actual {
        warn!("Document MAC mismatch");
        return Err(Error::integrity(expected, actual));
    }

    debug!("Document MAC verified");
    Ok(())
}
