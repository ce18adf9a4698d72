use cosmian_pkcs11_sys::{CK_KEY_TYPE, CK_OBJECT_HANDLE, CK_ULONG, CKK_AES, CKO_SECRET_KEY};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    HResult, hsm_ensure,
    session::{AesKeySize, AesKeySpec, Mechanism, Session, Template},
};

/// Template of a secret key created by `C_UnwrapKey`: a private, sensitive,
/// non extractable and non modifiable session key for encryption and decryption
#[must_use]
pub fn unwrapped_secret_key_template(key_type: CK_KEY_TYPE, value_len: CK_ULONG) -> Template {
    Template::new()
        .class(CKO_SECRET_KEY)
        .key_type(key_type)
        .token(false)
        .private(true)
        .sensitive(true)
        .modifiable(false)
        .extractable(false)
        .encrypt(true)
        .decrypt(true)
        .wrap(false)
        .unwrap(false)
        .value_len(value_len)
}

/// Handles of a clear key imported on the token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedKey {
    pub wrapping_key: CK_OBJECT_HANDLE,
    pub key: CK_OBJECT_HANDLE,
}

impl Session {
    /// Generate the AES-128 key used to import clear keys: it can encrypt and
    /// unwrap, but neither decrypt nor wrap
    ///
    /// # Errors
    /// Fails if the token refuses the template.
    pub fn generate_import_key(&self) -> HResult<CK_OBJECT_HANDLE> {
        self.generate_aes_key(&AesKeySpec {
            size: AesKeySize::Aes128,
            modifiable: false,
            encrypt: true,
            decrypt: false,
            wrap: false,
            unwrap: true,
            ..AesKeySpec::default()
        })
    }

    /// Encrypt clear key material under `wrapping_key` with `CKM_AES_KW` so that
    /// it can be passed to `C_UnwrapKey`
    ///
    /// # Errors
    /// Fails if the wrapping key cannot encrypt or the key length is not a
    /// multiple of 8 bytes.
    pub fn encrypt_known_key(
        &self,
        wrapping_key: CK_OBJECT_HANDLE,
        iv: [u8; 8],
        clear_key: &[u8],
    ) -> HResult<Vec<u8>> {
        hsm_ensure!(
            !clear_key.is_empty() && clear_key.len() % 8 == 0,
            "the clear key length must be a non zero multiple of 8 bytes, got {}",
            clear_key.len()
        );
        self.encrypt(&Mechanism::AesKw { iv }, wrapping_key, clear_key)
    }

    /// Import a known AES key: generate an import key and a random IV, encrypt
    /// the clear key with `CKM_AES_KW` and unwrap it into a session AES key.
    ///
    /// # Errors
    /// Fails if the clear key is not 16, 24 or 32 bytes long or if a token
    /// operation fails.
    pub fn import_known_aes_key(&self, clear_key: &Zeroizing<Vec<u8>>) -> HResult<ImportedKey> {
        let size = AesKeySize::from_bits(clear_key.len() * 8)?;
        let wrapping_key = self.generate_import_key()?;
        let random = self.generate_random(8)?;
        let mut iv = [0_u8; 8];
        iv.copy_from_slice(&random);
        let encrypted_key = self.encrypt_known_key(wrapping_key, iv, clear_key)?;
        let key = self.unwrap_key(
            &Mechanism::AesKw { iv },
            wrapping_key,
            &encrypted_key,
            &unwrapped_secret_key_template(CKK_AES, size.byte_len()),
        )?;
        debug!("Known key imported as handle {key}");
        Ok(ImportedKey { wrapping_key, key })
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{CKA_CLASS, CKA_KEY_TYPE, CKA_VALUE_LEN, CKK_AES, CKO_SECRET_KEY};

    use super::unwrapped_secret_key_template;
    use crate::session::AttributeValue;

    #[test]
    fn unwrapped_key_template() {
        let template = unwrapped_secret_key_template(CKK_AES, 16);
        assert_eq!(
            template.get(CKA_CLASS),
            Some(&AttributeValue::Ulong(CKO_SECRET_KEY))
        );
        assert_eq!(
            template.get(CKA_KEY_TYPE),
            Some(&AttributeValue::Ulong(CKK_AES))
        );
        assert_eq!(template.get(CKA_VALUE_LEN), Some(&AttributeValue::Ulong(16)));
    }
}
