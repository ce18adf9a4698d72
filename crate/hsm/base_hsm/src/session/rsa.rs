use cosmian_pkcs11_sys::{CK_OBJECT_HANDLE, CK_ULONG, CKK_RSA, CKO_PRIVATE_KEY, CKO_PUBLIC_KEY};
use tracing::debug;

use crate::{
    HError, HResult,
    session::{Mechanism, Session, Template},
};

/// F4 public exponent
pub const RSA_PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsaKeySize {
    Rsa1024,
    #[default]
    Rsa2048,
    Rsa3072,
    Rsa4096,
}

impl RsaKeySize {
    #[must_use]
    pub const fn bits(self) -> CK_ULONG {
        match self {
            Self::Rsa1024 => 1024,
            Self::Rsa2048 => 2048,
            Self::Rsa3072 => 3072,
            Self::Rsa4096 => 4096,
        }
    }

    /// # Errors
    /// Fails for sizes other than 1024, 2048, 3072 and 4096 bits.
    pub fn from_bits(bits: usize) -> HResult<Self> {
        match bits {
            1024 => Ok(Self::Rsa1024),
            2048 => Ok(Self::Rsa2048),
            3072 => Ok(Self::Rsa3072),
            4096 => Ok(Self::Rsa4096),
            x => Err(HError::Default(format!("invalid RSA key size: {x} bits"))),
        }
    }
}

/// Attributes of a generated RSA key pair.
///
/// Both keys carry the same label and id. The default pair is a session
/// pair that encrypts/verifies with the public key and decrypts/signs with a
/// sensitive, non extractable private key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RsaKeyPairSpec {
    pub label: Option<String>,
    pub id: Option<Vec<u8>>,
    pub size: RsaKeySize,
    pub token: bool,
    /// Use the Luna FIPS 186-3 prime generation mechanism
    pub fips_186_3: bool,
    pub private_extractable: bool,
    pub private_modifiable: bool,
    pub encrypt_decrypt: bool,
    pub sign_verify: bool,
    pub wrap_unwrap: bool,
    /// `CKA_UNWRAP_TEMPLATE` set on the private key
    pub unwrap_template: Option<Template>,
}

impl Default for RsaKeyPairSpec {
    fn default() -> Self {
        Self {
            label: None,
            id: None,
            size: RsaKeySize::default(),
            token: false,
            fips_186_3: false,
            private_extractable: false,
            private_modifiable: true,
            encrypt_decrypt: true,
            sign_verify: true,
            wrap_unwrap: false,
            unwrap_template: None,
        }
    }
}

impl RsaKeyPairSpec {
    #[must_use]
    pub const fn mechanism(&self) -> Mechanism<'static> {
        if self.fips_186_3 {
            Mechanism::RsaFips186PrimeKeyPairGen
        } else {
            Mechanism::RsaPkcsKeyPairGen
        }
    }

    #[must_use]
    pub fn public_template(&self) -> Template {
        let template = Template::new()
            .class(CKO_PUBLIC_KEY)
            .key_type(CKK_RSA)
            .token(self.token)
            .private(true)
            .modulus_bits(self.size.bits())
            .public_exponent(&RSA_PUBLIC_EXPONENT)
            .encrypt(self.encrypt_decrypt)
            .verify(self.sign_verify)
            .wrap(self.wrap_unwrap);
        self.identify(template)
    }

    #[must_use]
    pub fn private_template(&self) -> Template {
        let mut template = Template::new()
            .class(CKO_PRIVATE_KEY)
            .key_type(CKK_RSA)
            .token(self.token)
            .private(true)
            .sensitive(true)
            .extractable(self.private_extractable)
            .modifiable(self.private_modifiable)
            .decrypt(self.encrypt_decrypt)
            .sign(self.sign_verify)
            .unwrap(self.wrap_unwrap);
        if let Some(unwrap_template) = &self.unwrap_template {
            template = template.unwrap_template(unwrap_template.clone());
        }
        self.identify(template)
    }

    fn identify(&self, mut template: Template) -> Template {
        if let Some(label) = &self.label {
            template = template.label(label);
        }
        if let Some(id) = &self.id {
            template = template.id(id);
        }
        template
    }
}

impl Session {
    /// Generate an RSA key pair and return the public and private key handles
    /// in this order
    ///
    /// # Errors
    /// Fails if the token refuses the mechanism or the templates.
    pub fn generate_rsa_key_pair(
        &self,
        spec: &RsaKeyPairSpec,
    ) -> HResult<(CK_OBJECT_HANDLE, CK_OBJECT_HANDLE)> {
        let (public_key, private_key) = self.generate_key_pair(
            &spec.mechanism(),
            &spec.public_template(),
            &spec.private_template(),
        )?;
        debug!(
            "Generated RSA-{} key pair: public {public_key}, private {private_key}",
            spec.size.bits()
        );
        Ok((public_key, private_key))
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{
        CKA_EXTRACTABLE, CKA_ID, CKA_MODULUS_BITS, CKA_UNWRAP_TEMPLATE, CKM_RSA_PKCS_KEY_PAIR_GEN,
    };

    use super::{RsaKeyPairSpec, RsaKeySize};
    use crate::{
        hsm_capabilities::HsmCapabilities,
        luna::CKM_RSA_FIPS_186_3_PRIME_KEY_PAIR_GEN,
        session::{AttributeValue, Template},
    };

    #[test]
    fn rsa_pair_templates() {
        let spec = RsaKeyPairSpec {
            id: Some(vec![1, 2, 3]),
            unwrap_template: Some(Template::new().sensitive(true)),
            ..RsaKeyPairSpec::default()
        };
        let public = spec.public_template();
        let private = spec.private_template();
        assert_eq!(
            public.get(CKA_MODULUS_BITS),
            Some(&AttributeValue::Ulong(2048))
        );
        assert_eq!(public.get(CKA_ID), private.get(CKA_ID));
        assert_eq!(public.get(CKA_UNWRAP_TEMPLATE), None);
        assert!(matches!(
            private.get(CKA_UNWRAP_TEMPLATE),
            Some(AttributeValue::Template(t)) if t.len() == 1
        ));
        assert_eq!(private.get(CKA_EXTRACTABLE), Some(&AttributeValue::Bool(0)));
    }

    #[test]
    fn rsa_generation_mechanism() {
        let caps = HsmCapabilities::default();
        let spec = RsaKeyPairSpec::default();
        assert_eq!(
            spec.mechanism().mechanism_type(&caps),
            CKM_RSA_PKCS_KEY_PAIR_GEN
        );
        let spec = RsaKeyPairSpec {
            fips_186_3: true,
            size: RsaKeySize::from_bits(3072).unwrap(),
            ..RsaKeyPairSpec::default()
        };
        assert_eq!(
            spec.mechanism().mechanism_type(&caps),
            CKM_RSA_FIPS_186_3_PRIME_KEY_PAIR_GEN
        );
        RsaKeySize::from_bits(1000).unwrap_err();
    }
}
