use cosmian_pkcs11_sys::{CK_OBJECT_HANDLE, CK_ULONG, CKK_AES, CKO_SECRET_KEY};
use tracing::debug;

use crate::{
    HError, HResult,
    session::{Mechanism, Session, Template},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AesKeySize {
    Aes128,
    Aes192,
    #[default]
    Aes256,
}

impl AesKeySize {
    /// Key length in bytes, the value of `CKA_VALUE_LEN`
    #[must_use]
    pub const fn byte_len(self) -> CK_ULONG {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// # Errors
    /// Fails if `bits` is not 128, 192 or 256.
    pub fn from_bits(bits: usize) -> HResult<Self> {
        match bits {
            128 => Ok(Self::Aes128),
            192 => Ok(Self::Aes192),
            256 => Ok(Self::Aes256),
            x => Err(HError::Default(format!("invalid AES key size: {x} bits"))),
        }
    }
}

/// Attributes of a generated AES key.
///
/// The default is a private, sensitive, non extractable session key usable
/// for encryption and decryption only.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct AesKeySpec {
    pub label: Option<String>,
    pub size: AesKeySize,
    pub token: bool,
    pub private: bool,
    pub sensitive: bool,
    pub extractable: bool,
    pub modifiable: bool,
    pub encrypt: bool,
    pub decrypt: bool,
    pub wrap: bool,
    pub unwrap: bool,
    pub derive: bool,
    /// MAC generation and verification (`CKM_AES_CMAC`)
    pub sign_verify: bool,
    pub usage_limit: Option<CK_ULONG>,
}

impl Default for AesKeySpec {
    fn default() -> Self {
        Self {
            label: None,
            size: AesKeySize::default(),
            token: false,
            private: true,
            sensitive: true,
            extractable: false,
            modifiable: true,
            encrypt: true,
            decrypt: true,
            wrap: false,
            unwrap: false,
            derive: false,
            sign_verify: false,
            usage_limit: None,
        }
    }
}

impl AesKeySpec {
    #[must_use]
    pub fn new(size: AesKeySize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn template(&self) -> Template {
        let mut template = Template::new()
            .class(CKO_SECRET_KEY)
            .key_type(CKK_AES)
            .token(self.token)
            .private(self.private)
            .sensitive(self.sensitive)
            .extractable(self.extractable)
            .modifiable(self.modifiable)
            .encrypt(self.encrypt)
            .decrypt(self.decrypt)
            .wrap(self.wrap)
            .unwrap(self.unwrap)
            .derive(self.derive)
            .sign(self.sign_verify)
            .verify(self.sign_verify)
            .value_len(self.size.byte_len());
        if let Some(label) = &self.label {
            template = template.label(label);
        }
        if let Some(limit) = self.usage_limit {
            template = template.usage_limit(limit);
        }
        template
    }
}

impl Session {
    /// Generate an AES key with `CKM_AES_KEY_GEN`
    ///
    /// # Errors
    /// Fails if the token refuses the template.
    pub fn generate_aes_key(&self, spec: &AesKeySpec) -> HResult<CK_OBJECT_HANDLE> {
        let handle = self.generate_key(&Mechanism::AesKeyGen, &spec.template())?;
        debug!(
            "Generated {:?} key {handle} (token: {}, label: {:?})",
            spec.size, spec.token, spec.label
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{CKA_LABEL, CKA_TOKEN, CKA_VALUE_LEN};

    use super::{AesKeySize, AesKeySpec};
    use crate::{luna::CKA_USAGE_LIMIT, session::AttributeValue};

    #[test]
    fn aes_sizes() {
        assert_eq!(AesKeySize::from_bits(256).unwrap(), AesKeySize::Aes256);
        assert_eq!(AesKeySize::Aes128.byte_len(), 16);
        AesKeySize::from_bits(512).unwrap_err();
    }

    #[test]
    fn aes_spec_template() {
        let template = AesKeySpec::new(AesKeySize::Aes128).template();
        assert_eq!(template.get(CKA_VALUE_LEN), Some(&AttributeValue::Ulong(16)));
        assert_eq!(template.get(CKA_LABEL), None);
        assert_eq!(template.get(CKA_USAGE_LIMIT), None);

        let template = AesKeySpec {
            label: Some("k".to_owned()),
            token: true,
            usage_limit: Some(10),
            ..AesKeySpec::default()
        }
        .template();
        assert_eq!(template.get(CKA_TOKEN), Some(&AttributeValue::Bool(1)));
        assert_eq!(template.get(CKA_USAGE_LIMIT), Some(&AttributeValue::Ulong(10)));
        assert_eq!(
            template.get(CKA_LABEL),
            Some(&AttributeValue::Bytes(b"k".to_vec()))
        );
    }
}
