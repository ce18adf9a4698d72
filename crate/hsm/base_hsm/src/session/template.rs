//! Owned attribute templates and their `CK_ATTRIBUTE` views.

use std::{ffi::c_void, marker::PhantomData, ptr};

use cosmian_pkcs11_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_PTR, CK_ATTRIBUTE_TYPE, CK_BBOOL, CK_FALSE, CK_KEY_TYPE,
    CK_OBJECT_CLASS, CK_TRUE, CK_ULONG, CKA_CLASS, CKA_DECRYPT, CKA_DERIVE, CKA_EC_PARAMS,
    CKA_ENCRYPT, CKA_EXTRACTABLE, CKA_ID, CKA_KEY_TYPE, CKA_LABEL, CKA_MODIFIABLE,
    CKA_MODULUS_BITS, CKA_PRIVATE, CKA_PUBLIC_EXPONENT, CKA_SENSITIVE, CKA_SIGN, CKA_TOKEN,
    CKA_UNWRAP, CKA_UNWRAP_TEMPLATE, CKA_VALUE, CKA_VALUE_LEN, CKA_VERIFY, CKA_WRAP,
};
use zeroize::Zeroizing;

use crate::{HResult, luna::CKA_USAGE_LIMIT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Bool(CK_BBOOL),
    Ulong(CK_ULONG),
    Bytes(Vec<u8>),
    Secret(Zeroizing<Vec<u8>>),
    Template(Template),
}

/// An ordered list of attributes owned on the Rust side.
///
/// Build it with the chained setters, then call [`Template::as_ck_attributes`]
/// right before the `PKCS#11` call that consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template(Vec<(CK_ATTRIBUTE_TYPE, AttributeValue)>);

impl Template {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Set an attribute, replacing a previous value of the same type
    #[must_use]
    pub fn set(mut self, attribute: CK_ATTRIBUTE_TYPE, value: AttributeValue) -> Self {
        if let Some(entry) = self.0.iter_mut().find(|(t, _)| *t == attribute) {
            entry.1 = value;
        } else {
            self.0.push((attribute, value));
        }
        self
    }

    #[must_use]
    pub fn bool(self, attribute: CK_ATTRIBUTE_TYPE, value: bool) -> Self {
        self.set(
            attribute,
            AttributeValue::Bool(if value { CK_TRUE } else { CK_FALSE }),
        )
    }

    #[must_use]
    pub fn ulong(self, attribute: CK_ATTRIBUTE_TYPE, value: CK_ULONG) -> Self {
        self.set(attribute, AttributeValue::Ulong(value))
    }

    #[must_use]
    pub fn bytes(self, attribute: CK_ATTRIBUTE_TYPE, value: impl Into<Vec<u8>>) -> Self {
        self.set(attribute, AttributeValue::Bytes(value.into()))
    }

    #[must_use]
    pub fn class(self, class: CK_OBJECT_CLASS) -> Self {
        self.ulong(CKA_CLASS, class)
    }

    #[must_use]
    pub fn key_type(self, key_type: CK_KEY_TYPE) -> Self {
        self.ulong(CKA_KEY_TYPE, key_type)
    }

    #[must_use]
    pub fn token(self, value: bool) -> Self {
        self.bool(CKA_TOKEN, value)
    }

    #[must_use]
    pub fn private(self, value: bool) -> Self {
        self.bool(CKA_PRIVATE, value)
    }

    #[must_use]
    pub fn sensitive(self, value: bool) -> Self {
        self.bool(CKA_SENSITIVE, value)
    }

    #[must_use]
    pub fn extractable(self, value: bool) -> Self {
        self.bool(CKA_EXTRACTABLE, value)
    }

    #[must_use]
    pub fn modifiable(self, value: bool) -> Self {
        self.bool(CKA_MODIFIABLE, value)
    }

    #[must_use]
    pub fn encrypt(self, value: bool) -> Self {
        self.bool(CKA_ENCRYPT, value)
    }

    #[must_use]
    pub fn decrypt(self, value: bool) -> Self {
        self.bool(CKA_DECRYPT, value)
    }

    #[must_use]
    pub fn wrap(self, value: bool) -> Self {
        self.bool(CKA_WRAP, value)
    }

    #[must_use]
    pub fn unwrap(self, value: bool) -> Self {
        self.bool(CKA_UNWRAP, value)
    }

    #[must_use]
    pub fn sign(self, value: bool) -> Self {
        self.bool(CKA_SIGN, value)
    }

    #[must_use]
    pub fn verify(self, value: bool) -> Self {
        self.bool(CKA_VERIFY, value)
    }

    #[must_use]
    pub fn derive(self, value: bool) -> Self {
        self.bool(CKA_DERIVE, value)
    }

    #[must_use]
    pub fn label(self, label: &str) -> Self {
        self.bytes(CKA_LABEL, label.as_bytes())
    }

    #[must_use]
    pub fn id(self, id: &[u8]) -> Self {
        self.bytes(CKA_ID, id)
    }

    #[must_use]
    pub fn value_len(self, len: CK_ULONG) -> Self {
        self.ulong(CKA_VALUE_LEN, len)
    }

    #[must_use]
    pub fn modulus_bits(self, bits: CK_ULONG) -> Self {
        self.ulong(CKA_MODULUS_BITS, bits)
    }

    #[must_use]
    pub fn public_exponent(self, exponent: &[u8]) -> Self {
        self.bytes(CKA_PUBLIC_EXPONENT, exponent)
    }

    #[must_use]
    pub fn ec_params(self, der_oid: &[u8]) -> Self {
        self.bytes(CKA_EC_PARAMS, der_oid)
    }

    /// Luna `CKA_USAGE_LIMIT`
    #[must_use]
    pub fn usage_limit(self, limit: CK_ULONG) -> Self {
        self.ulong(CKA_USAGE_LIMIT, limit)
    }

    /// Clear key material, zeroized when the template is dropped
    #[must_use]
    pub fn value(self, value: &[u8]) -> Self {
        self.set(CKA_VALUE, AttributeValue::Secret(Zeroizing::new(value.to_vec())))
    }

    /// `CKA_UNWRAP_TEMPLATE`: attributes imposed on keys unwrapped with this key
    #[must_use]
    pub fn unwrap_template(self, template: Self) -> Self {
        self.set(CKA_UNWRAP_TEMPLATE, AttributeValue::Template(template))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, attribute: CK_ATTRIBUTE_TYPE) -> Option<&AttributeValue> {
        self.0
            .iter()
            .find(|(t, _)| *t == attribute)
            .map(|(_, v)| v)
    }

    pub(crate) fn label_bytes(&self) -> Option<&[u8]> {
        match self.get(CKA_LABEL) {
            Some(AttributeValue::Bytes(label)) => Some(label),
            _ => None,
        }
    }

    /// `true` when `CKA_TOKEN` is explicitly set to true
    pub(crate) fn is_token(&self) -> bool {
        matches!(self.get(CKA_TOKEN), Some(AttributeValue::Bool(b)) if *b != CK_FALSE)
    }

    /// Borrow the template as a `CK_ATTRIBUTE` array.
    ///
    /// The pointers in the returned value point into `self` and into nested
    /// arrays owned by the returned value, so both must outlive the call.
    ///
    /// # Errors
    /// Fails if a length does not fit in a `CK_ULONG`.
    pub fn as_ck_attributes(&self) -> HResult<CkTemplate<'_>> {
        let mut attributes = Vec::with_capacity(self.0.len());
        let mut nested = Vec::new();
        for (attribute, value) in &self.0 {
            let (p_value, len): (*const c_void, usize) = match value {
                AttributeValue::Bool(b) => (ptr::from_ref(b).cast(), size_of::<CK_BBOOL>()),
                AttributeValue::Ulong(u) => (ptr::from_ref(u).cast(), size_of::<CK_ULONG>()),
                AttributeValue::Bytes(bytes) => (bytes.as_ptr().cast(), bytes.len()),
                AttributeValue::Secret(bytes) => (bytes.as_ptr().cast(), bytes.len()),
                AttributeValue::Template(template) => {
                    let inner = template.as_ck_attributes()?;
                    let view = (
                        inner.attributes.as_ptr().cast(),
                        inner.attributes.len() * size_of::<CK_ATTRIBUTE>(),
                    );
                    // the heap buffer of `inner` does not move with it
                    nested.push(inner);
                    view
                }
            };
            attributes.push(CK_ATTRIBUTE {
                type_: *attribute,
                pValue: p_value.cast_mut(),
                ulValueLen: CK_ULONG::try_from(len)?,
            });
        }
        Ok(CkTemplate {
            attributes,
            _nested: nested,
            _template: PhantomData,
        })
    }
}

/// `CK_ATTRIBUTE` view of a [`Template`]
pub struct CkTemplate<'a> {
    attributes: Vec<CK_ATTRIBUTE>,
    _nested: Vec<CkTemplate<'a>>,
    _template: PhantomData<&'a Template>,
}

impl CkTemplate<'_> {
    pub(crate) fn as_mut_ptr(&mut self) -> CK_ATTRIBUTE_PTR {
        if self.attributes.is_empty() {
            ptr::null_mut()
        } else {
            self.attributes.as_mut_ptr()
        }
    }

    pub(crate) fn ck_len(&self) -> HResult<CK_ULONG> {
        Ok(CK_ULONG::try_from(self.attributes.len())?)
    }

    #[cfg(test)]
    pub(crate) fn attributes(&self) -> &[CK_ATTRIBUTE] {
        &self.attributes
    }
}

/// Values read back with `C_GetAttributeValue`.
///
/// An attribute is `None` when the token refused to reveal it
/// (`CKR_ATTRIBUTE_SENSITIVE`) or does not know it (`CKR_ATTRIBUTE_TYPE_INVALID`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeValues(Vec<(CK_ATTRIBUTE_TYPE, Option<Vec<u8>>)>);

impl AttributeValues {
    pub(crate) fn push(&mut self, attribute: CK_ATTRIBUTE_TYPE, value: Option<Vec<u8>>) {
        self.0.push((attribute, value));
    }

    #[must_use]
    pub fn get(&self, attribute: CK_ATTRIBUTE_TYPE) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(t, _)| *t == attribute)
            .and_then(|(_, v)| v.as_deref())
    }

    #[must_use]
    pub fn get_bool(&self, attribute: CK_ATTRIBUTE_TYPE) -> Option<bool> {
        self.get(attribute)
            .and_then(|v| v.first())
            .map(|b| *b != CK_FALSE)
    }

    #[must_use]
    pub fn get_ulong(&self, attribute: CK_ATTRIBUTE_TYPE) -> Option<CK_ULONG> {
        self.get(attribute)
            .and_then(|v| <[u8; size_of::<CK_ULONG>()]>::try_from(v).ok())
            .map(CK_ULONG::from_ne_bytes)
    }

    #[must_use]
    pub fn get_string(&self, attribute: CK_ATTRIBUTE_TYPE) -> Option<String> {
        self.get(attribute)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CK_ATTRIBUTE_TYPE, Option<&[u8]>)> {
        self.0.iter().map(|(t, v)| (*t, v.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{
        CK_ATTRIBUTE, CK_BBOOL, CK_TRUE, CK_ULONG, CKA_CLASS, CKA_ENCRYPT, CKA_ID, CKA_LABEL,
        CKA_SENSITIVE, CKA_TOKEN, CKA_UNWRAP_TEMPLATE, CKA_VALUE_LEN, CKO_SECRET_KEY,
    };

    use super::{AttributeValue, AttributeValues, Template};

    #[test]
    fn setters_replace_existing_values() {
        let template = Template::new().token(true).label("a").token(false);
        assert_eq!(template.len(), 2);
        assert_eq!(template.get(CKA_TOKEN), Some(&AttributeValue::Bool(0)));
    }

    #[test]
    fn ck_view_points_at_owned_values() {
        let template = Template::new()
            .class(CKO_SECRET_KEY)
            .encrypt(true)
            .value_len(32)
            .label("MasterKey");
        let view = template.as_ck_attributes().unwrap();
        let attributes = view.attributes();
        assert_eq!(attributes.len(), 4);

        assert_eq!(attributes[0].type_, CKA_CLASS);
        // SAFETY: the pointer targets the class stored in `template`
        #[allow(unsafe_code)]
        let class = unsafe { *attributes[0].pValue.cast::<CK_ULONG>() };
        assert_eq!(class, CKO_SECRET_KEY);

        assert_eq!(attributes[1].type_, CKA_ENCRYPT);
        assert_eq!(attributes[1].ulValueLen as usize, size_of::<CK_BBOOL>());
        #[allow(unsafe_code)]
        let flag = unsafe { *attributes[1].pValue.cast::<CK_BBOOL>() };
        assert_eq!(flag, CK_TRUE);

        assert_eq!(attributes[2].type_, CKA_VALUE_LEN);
        assert_eq!(attributes[3].type_, CKA_LABEL);
        assert_eq!(attributes[3].ulValueLen, 9);
    }

    #[test]
    fn nested_unwrap_template() {
        let template = Template::new().unwrap(true).unwrap_template(
            Template::new()
                .sensitive(true)
                .id(&[1, 2, 3, 4, 5, 6, 7, 8]),
        );
        let view = template.as_ck_attributes().unwrap();
        let outer = &view.attributes()[1];
        assert_eq!(outer.type_, CKA_UNWRAP_TEMPLATE);
        assert_eq!(outer.ulValueLen as usize, 2 * size_of::<CK_ATTRIBUTE>());
        #[allow(unsafe_code)]
        let inner = unsafe { std::slice::from_raw_parts(outer.pValue.cast::<CK_ATTRIBUTE>(), 2) };
        assert_eq!(inner[0].type_, CKA_SENSITIVE);
        assert_eq!(inner[1].type_, CKA_ID);
        assert_eq!(inner[1].ulValueLen, 8);
    }

    #[test]
    fn attribute_values_decoding() {
        let mut values = AttributeValues::default();
        values.push(CKA_TOKEN, Some(vec![1]));
        values.push(CKA_VALUE_LEN, Some(32_u64.to_ne_bytes()[..size_of::<CK_ULONG>()].to_vec()));
        values.push(CKA_LABEL, Some(b"key".to_vec()));
        values.push(CKA_SENSITIVE, None);

        assert_eq!(values.get_bool(CKA_TOKEN), Some(true));
        assert_eq!(values.get_string(CKA_LABEL).as_deref(), Some("key"));
        assert_eq!(values.get_bool(CKA_SENSITIVE), None);
        assert_eq!(values.get(CKA_ID), None);
        if cfg!(target_endian = "little") {
            assert_eq!(values.get_ulong(CKA_VALUE_LEN), Some(32));
        }
    }
}
