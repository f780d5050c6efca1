//! Server identity: a persistent ed25519 keypair.
//!
//! Generated on first start and reused afterwards. Clients pin the server by
//! its fingerprint and check the signature carried in every `Welcome` frame.

use std::path::Path;

use anyhow::{Context, Result};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::info;

const KEY_FILE: &str = "identity.key";
const KEY_LEN: usize = 32;
const FINGERPRINT_LEN: usize = 16;

pub struct ServerIdentity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl ServerIdentity {
    /// Load from `<data_dir>/identity.key`, or generate and save a new keypair.
    pub fn load_or_generate(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(KEY_FILE);

        if path.exists() {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read identity key: {}", path.display()))?;
            let seed: [u8; KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
                anyhow::anyhow!("identity key must be {} bytes, got {}", KEY_LEN, v.len())
            })?;
            let identity = Self::from_seed(seed);
            info!("Loaded server identity: {}", identity.fingerprint());
            Ok(identity)
        } else {
            let identity = Self::generate();
            identity.save(&path)?;
            info!("Generated new server identity: {}", identity.fingerprint());
            Ok(identity)
        }
    }

    /// Fresh identity, not persisted.
    pub fn generate() -> Self {
        let seed: [u8; KEY_LEN] = rand::random();
        Self::from_seed(seed)
    }

    fn from_seed(seed: [u8; KEY_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Write the 32-byte key seed to disk with mode 0600.
    fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.signing_key.to_bytes())
            .with_context(|| format!("failed to write identity key: {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }

    /// URL-safe base64 of the raw public key.
    pub fn public_key(&self) -> String {
        data_encoding::BASE64URL_NOPAD.encode(self.verifying_key.as_bytes())
    }

    /// URL-safe base64 of the first 16 bytes of SHA-256(public key).
    pub fn fingerprint(&self) -> String {
        let hash = Sha256::digest(self.verifying_key.as_bytes());
        data_encoding::BASE64URL_NOPAD.encode(&hash[..FINGERPRINT_LEN])
    }

    /// Sign `message`, returning URL-safe base64 of the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature = self.signing_key.sign(message);
        data_encoding::BASE64URL_NOPAD.encode(&signature.to_bytes())
    }
}

/// Check a base64 `signature` over `message` against a base64 `public_key`.
pub fn verify(public_key: &str, message: &[u8], signature: &str) -> bool {
    use ed25519_dalek::Verifier;

    let Ok(key_bytes) = data_encoding::BASE64URL_NOPAD.decode(public_key.as_bytes()) else {
        return false;
    };
    let Ok(sig_bytes) = data_encoding::BASE64URL_NOPAD.decode(signature.as_bytes()) else {
        return false;
    };
    let Ok(key_arr) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(sig_arr) = <[u8; 64]>::try_from(sig_bytes) else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_bytes(&key_arr) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_arr);
    vk.verify(message, &sig).is_ok()
}
