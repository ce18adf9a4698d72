use cosmian_pkcs11_sys::{CK_OBJECT_HANDLE, CKK_DES3, CKO_SECRET_KEY};

use crate::{
    HResult,
    session::{Mechanism, Session, Template},
};

/// Template of a private, sensitive, non extractable and non modifiable DES3 key
#[must_use]
pub fn des3_key_template(label: Option<&str>, token: bool, wrap_unwrap: bool) -> Template {
    let template = Template::new()
        .class(CKO_SECRET_KEY)
        .key_type(CKK_DES3)
        .token(token)
        .private(true)
        .sensitive(true)
        .encrypt(true)
        .decrypt(true)
        .wrap(wrap_unwrap)
        .unwrap(wrap_unwrap)
        .modifiable(false)
        .extractable(false);
    match label {
        Some(label) => template.label(label),
        None => template,
    }
}

impl Session {
    /// Generate a triple DES key with `CKM_DES3_KEY_GEN`
    ///
    /// # Errors
    /// Fails if the token refuses the template, typically in FIPS mode.
    pub fn generate_des3_key(
        &self,
        label: Option<&str>,
        token: bool,
        wrap_unwrap: bool,
    ) -> HResult<CK_OBJECT_HANDLE> {
        self.generate_key(
            &Mechanism::Des3KeyGen,
            &des3_key_template(label, token, wrap_unwrap),
        )
    }
}
