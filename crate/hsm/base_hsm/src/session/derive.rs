//! Key derivation: ECDH, `PKCS#5` PBKDF2 and the Luna NIST SP 800-108 KDF.
//!
//! Every derived key is an AES session key that is private, sensitive, non
//! extractable and non modifiable, usable for encryption and decryption only.

use cosmian_pkcs11_sys::{CK_OBJECT_HANDLE, CK_ULONG, CKK_AES, CKO_SECRET_KEY};
use tracing::debug;

use crate::{
    HResult,
    session::{AesKeySize, EcKdf, Mechanism, Session, Template},
};

fn derived_aes_key_template(size: AesKeySize) -> Template {
    Template::new()
        .class(CKO_SECRET_KEY)
        .key_type(CKK_AES)
        .token(false)
        .private(true)
        .sensitive(true)
        .encrypt(true)
        .decrypt(true)
        .wrap(false)
        .unwrap(false)
        .derive(false)
        .extractable(false)
        .modifiable(false)
        .value_len(size.byte_len())
}

impl Session {
    /// Derive an AES key from a local EC private key and the peer's `CKA_EC_POINT`
    /// with `CKM_ECDH1_DERIVE` and the `CKD_SHA1_KDF` key derivation function
    ///
    /// # Errors
    /// Fails if the private key cannot derive or the point is not on its curve.
    pub fn ecdh1_derive_aes_key(
        &self,
        private_key: CK_OBJECT_HANDLE,
        peer_public_point: &[u8],
        shared_data: &[u8],
        size: AesKeySize,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let mechanism = Mechanism::Ecdh1Derive {
            kdf: EcKdf::Sha1,
            shared_data,
            public_data: peer_public_point,
        };
        let key = self.derive_key(&mechanism, private_key, &derived_aes_key_template(size))?;
        debug!("ECDH derived key {key} from private key {private_key}");
        Ok(key)
    }

    /// Generate an AES key from a password with `CKM_PKCS5_PBKD2` (HMAC-SHA1 PRF)
    ///
    /// # Errors
    /// Fails if the token rejects the parameters.
    pub fn pbkdf2_generate_aes_key(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: CK_ULONG,
        size: AesKeySize,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let mechanism = Mechanism::pbkdf2(password, salt, iterations);
        self.generate_key(&mechanism, &derived_aes_key_template(size))
    }

    /// Derive an AES key from `base_key` with the Luna `CKM_NIST_PRF_KDF`
    /// in counter mode (AES-CMAC PRF, counter 1, encoding scheme 1)
    ///
    /// # Errors
    /// Fails if the base key cannot derive or the library is not a Luna library.
    pub fn nist_prf_kdf_derive(
        &self,
        base_key: CK_OBJECT_HANDLE,
        label: &[u8],
        context: &[u8],
        size: AesKeySize,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let mechanism = Mechanism::nist_prf_kdf_aes_cmac(label, context);
        self.derive_key(&mechanism, base_key, &derived_aes_key_template(size))
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{CKA_DERIVE, CKA_EXTRACTABLE, CKA_TOKEN, CKA_VALUE_LEN};

    use super::derived_aes_key_template;
    use crate::session::{AesKeySize, AttributeValue};

    #[test]
    fn derived_keys_stay_in_the_session() {
        let template = derived_aes_key_template(AesKeySize::Aes256);
        assert_eq!(template.get(CKA_TOKEN), Some(&AttributeValue::Bool(0)));
        assert_eq!(template.get(CKA_EXTRACTABLE), Some(&AttributeValue::Bool(0)));
        assert_eq!(template.get(CKA_DERIVE), Some(&AttributeValue::Bool(0)));
        assert_eq!(template.get(CKA_VALUE_LEN), Some(&AttributeValue::Ulong(32)));
    }
}
