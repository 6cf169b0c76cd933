//! Credential vault: AES-256-GCM over a PBKDF2-derived key.
//!
//! At rest a blob is `hex(iv):hex(auth_tag):hex(cipher_text)`. The plaintext
//! is the JSON encoding of [`Credentials`].

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_SALT: &[u8] = b"neighbor-engage/credential-vault/v1";
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const WIRE_DELIMITER: char = ':';

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Wrong passphrase, tampered bytes, or a blob that is not three hex fields.
    #[error("credential authentication failed: {0}")]
    Authentication(&'static str),

    #[error("failed to encode credentials: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("encryption failed")]
    Encrypt,
}

/// Blog account login pair. Held in memory for one run only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub account_id: String,
    pub account_secret: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, account_secret: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            account_secret: account_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("account_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
    pub cipher_text: Vec<u8>,
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{WIRE_DELIMITER}{}{WIRE_DELIMITER}{}",
            hex::encode(&self.iv),
            hex::encode(&self.auth_tag),
            hex::encode(&self.cipher_text)
        )
    }
}

impl FromStr for EncryptedBlob {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(WIRE_DELIMITER).collect();
        let [iv, tag, ct] = parts.as_slice() else {
            return Err(VaultError::Authentication("blob must have exactly three parts"));
        };
        let decode = |field: &str| {
            hex::decode(field).map_err(|_| VaultError::Authentication("blob field is not hex"))
        };
        Ok(Self {
            iv: decode(iv)?,
            auth_tag: decode(tag)?,
            cipher_text: decode(ct)?,
        })
    }
}

/// Encrypts and decrypts [`Credentials`] under `master_secret || passphrase`.
pub struct CredentialVault {
    master_secret: String,
    rng: SystemRandom,
}

impl CredentialVault {
    pub fn new(master_secret: impl Into<String>) -> Self {
        Self {
            master_secret: master_secret.into(),
            rng: SystemRandom::new(),
        }
    }

    pub fn encrypt(
        &self,
        credentials: &Credentials,
        passphrase: &str,
    ) -> Result<EncryptedBlob, VaultError> {
        let key = self.derive_key(passphrase)?;

        let mut iv = [0u8; NONCE_LEN];
        self.rng.fill(&mut iv).map_err(|_| VaultError::Encrypt)?;

        let mut in_out = serde_json::to_vec(credentials)?;
        let tag = key
            .seal_in_place_separate_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::Encrypt)?;

        Ok(EncryptedBlob {
            iv: iv.to_vec(),
            auth_tag: tag.as_ref().to_vec(),
            cipher_text: in_out,
        })
    }

    pub fn decrypt(&self, blob: &EncryptedBlob, passphrase: &str) -> Result<Credentials, VaultError> {
        if blob.auth_tag.len() != TAG_LEN {
            return Err(VaultError::Authentication("auth tag has wrong length"));
        }
        let nonce = Nonce::try_assume_unique_for_key(&blob.iv)
            .map_err(|_| VaultError::Authentication("iv has wrong length"))?;
        let key = self
            .derive_key(passphrase)
            .map_err(|_| VaultError::Authentication("key derivation failed"))?;

        // ring expects cipher_text || tag in one buffer.
        let mut in_out = Vec::with_capacity(blob.cipher_text.len() + TAG_LEN);
        in_out.extend_from_slice(&blob.cipher_text);
        in_out.extend_from_slice(&blob.auth_tag);

        let plain = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::Authentication("auth tag did not verify"))?;

        serde_json::from_slice(plain)
            .map_err(|_| VaultError::Authentication("decrypted payload is not a credentials record"))
    }

    /// Parse the `iv:authTag:cipherText` form and decrypt it.
    pub fn decrypt_wire(&self, wire: &str, passphrase: &str) -> Result<Credentials, VaultError> {
        let blob: EncryptedBlob = wire.parse()?;
        self.decrypt(&blob, passphrase)
    }

    fn derive_key(&self, passphrase: &str) -> Result<LessSafeKey, VaultError> {
        let mut secret = Vec::with_capacity(self.master_secret.len() + passphrase.len());
        secret.extend_from_slice(self.master_secret.as_bytes());
        secret.extend_from_slice(passphrase.as_bytes());

        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or(VaultError::Encrypt)?;
        let mut key_bytes = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            KEY_SALT,
            &secret,
            &mut key_bytes,
        );

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes).map_err(|_| VaultError::Encrypt)?;
        Ok(LessSafeKey::new(unbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("neighbor_fan", "hunter2!")
    }

    #[test]
    fn test_roundtrip_with_same_passphrase() {
        let vault = CredentialVault::new("master");
        let blob = vault.encrypt(&creds(), "open sesame").unwrap();
        assert_eq!(vault.decrypt(&blob, "open sesame").unwrap(), creds());
    }

    #[test]
    fn test_wrong_passphrase_fails_closed() {
        let vault = CredentialVault::new("master");
        let blob = vault.encrypt(&creds(), "open sesame").unwrap();
        let err = vault.decrypt(&blob, "open sesame ").unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
    }

    #[test]
    fn test_wrong_master_secret_fails_closed() {
        let blob = CredentialVault::new("master-a").encrypt(&creds(), "p").unwrap();
        let err = CredentialVault::new("master-b").decrypt(&blob, "p").unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let vault = CredentialVault::new("master");
        let a = vault.encrypt(&creds(), "p").unwrap();
        let b = vault.encrypt(&creds(), "p").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.cipher_text, b.cipher_text);
    }

    #[test]
    fn test_tampered_cipher_text_rejected() {
        let vault = CredentialVault::new("master");
        let mut blob = vault.encrypt(&creds(), "p").unwrap();
        blob.cipher_text[0] ^= 0x01;
        assert!(matches!(
            vault.decrypt(&blob, "p"),
            Err(VaultError::Authentication(_))
        ));
    }

    #[test]
    fn test_wire_format_roundtrip() {
        let vault = CredentialVault::new("master");
        let blob = vault.encrypt(&creds(), "p").unwrap();
        let wire = blob.to_string();
        assert_eq!(wire.matches(':').count(), 2);
        assert_eq!(vault.decrypt_wire(&wire, "p").unwrap(), creds());
    }

    #[test]
    fn test_wire_with_wrong_part_count_rejected() {
        let vault = CredentialVault::new("master");
        for wire in ["abcd", "ab:cd", "ab:cd:ef:01", ""] {
            let err = vault.decrypt_wire(wire, "p").unwrap_err();
            assert!(matches!(err, VaultError::Authentication(_)), "{wire:?}");
        }
    }

    #[test]
    fn test_non_hex_field_rejected() {
        let err = "zz:00:00".parse::<EncryptedBlob>().unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", creds());
        assert!(rendered.contains("neighbor_fan"));
        assert!(!rendered.contains("hunter2"));
    }
}
