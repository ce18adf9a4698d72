use std::{fmt, str::FromStr};

use cosmian_pkcs11_sys::{CK_OBJECT_HANDLE, CKA_EC_POINT, CKK_EC, CKO_PRIVATE_KEY, CKO_PUBLIC_KEY};

use crate::{
    HError, HResult,
    session::{Mechanism, Session, Template},
};

/// Named curves, identified in `CKA_EC_PARAMS` by their DER encoded OID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EcCurve {
    P256,
    #[default]
    P384,
    P521,
    Secp256k1,
}

impl EcCurve {
    #[must_use]
    pub const fn der_oid(self) -> &'static [u8] {
        match self {
            Self::P256 => &[0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07],
            Self::P384 => &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x22],
            Self::P521 => &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x23],
            Self::Secp256k1 => &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x0A],
        }
    }
}

impl FromStr for EcCurve {
    type Err = HError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p256" | "p-256" | "secp256r1" | "prime256v1" => Ok(Self::P256),
            "p384" | "p-384" | "secp384r1" => Ok(Self::P384),
            "p521" | "p-521" | "secp521r1" => Ok(Self::P521),
            "secp256k1" => Ok(Self::Secp256k1),
            _ => Err(HError::Default(format!("unknown curve: {s}"))),
        }
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::P256 => "secp256r1",
            Self::P384 => "secp384r1",
            Self::P521 => "secp521r1",
            Self::Secp256k1 => "secp256k1",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcKeyPairSpec {
    pub label: Option<String>,
    pub curve: EcCurve,
    pub token: bool,
    pub sign_verify: bool,
    pub derive: bool,
}

impl Default for EcKeyPairSpec {
    fn default() -> Self {
        Self {
            label: None,
            curve: EcCurve::default(),
            token: false,
            sign_verify: true,
            derive: false,
        }
    }
}

impl EcKeyPairSpec {
    #[must_use]
    pub fn public_template(&self) -> Template {
        let template = Template::new()
            .class(CKO_PUBLIC_KEY)
            .key_type(CKK_EC)
            .token(self.token)
            .private(true)
            .verify(self.sign_verify)
            .ec_params(self.curve.der_oid());
        match &self.label {
            Some(label) => template.label(label),
            None => template,
        }
    }

    #[must_use]
    pub fn private_template(&self) -> Template {
        let template = Template::new()
            .class(CKO_PRIVATE_KEY)
            .key_type(CKK_EC)
            .token(self.token)
            .private(true)
            .sensitive(true)
            .modifiable(false)
            .extractable(false)
            .sign(self.sign_verify)
            .derive(self.derive);
        match &self.label {
            Some(label) => template.label(label),
            None => template,
        }
    }
}

impl Session {
    /// Generate an EC key pair and return the public and private key handles
    /// in this order
    ///
    /// # Errors
    /// Fails if the token does not support the curve.
    pub fn generate_ec_key_pair(
        &self,
        spec: &EcKeyPairSpec,
    ) -> HResult<(CK_OBJECT_HANDLE, CK_OBJECT_HANDLE)> {
        self.generate_key_pair(
            &Mechanism::EcKeyPairGen,
            &spec.public_template(),
            &spec.private_template(),
        )
    }

    /// The `CKA_EC_POINT` of a public key, as returned by the token
    /// (a DER OCTET STRING wrapping the uncompressed point)
    ///
    /// # Errors
    /// Fails if the handle is invalid or the attribute cannot be read.
    pub fn get_ec_point(&self, public_key: CK_OBJECT_HANDLE) -> HResult<Vec<u8>> {
        self.get_bytes_attribute(public_key, CKA_EC_POINT)?
            .ok_or_else(|| HError::Default(format!("no EC point on object {public_key}")))
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{CKA_DERIVE, CKA_EC_PARAMS};

    use super::{EcCurve, EcKeyPairSpec};
    use crate::session::AttributeValue;

    #[test]
    fn curve_oids() {
        assert_eq!(
            EcCurve::P384.der_oid(),
            &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x22]
        );
        assert_eq!("P-256".parse::<EcCurve>().unwrap(), EcCurve::P256);
        assert_eq!("secp256k1".parse::<EcCurve>().unwrap(), EcCurve::Secp256k1);
        "curve25519".parse::<EcCurve>().unwrap_err();
        // length byte of the DER encoding
        for curve in [EcCurve::P256, EcCurve::P384, EcCurve::P521, EcCurve::Secp256k1] {
            let oid = curve.der_oid();
            assert_eq!(usize::from(oid[1]), oid.len() - 2);
        }
    }

    #[test]
    fn ec_pair_templates() {
        let spec = EcKeyPairSpec {
            derive: true,
            ..EcKeyPairSpec::default()
        };
        assert_eq!(
            spec.public_template().get(CKA_EC_PARAMS),
            Some(&AttributeValue::Bytes(EcCurve::P384.der_oid().to_vec()))
        );
        assert_eq!(
            spec.private_template().get(CKA_DERIVE),
            Some(&AttributeValue::Bool(1))
        );
    }
}
