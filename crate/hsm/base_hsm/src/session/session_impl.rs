//! PKCS#11 session implementation
//!
//! A [`Session`] wraps one session handle opened on a slot. It exposes the
//! primitive operations of the token, each taking a typed [`Mechanism`] and/or
//! an owned [`Template`]:
//!
//! - object search, creation, copy, destruction and attribute access
//! - encryption, decryption, signature, verification and digest
//! - key generation, derivation, wrapping and unwrapping
//! - random generation
//!
//! Variable length outputs use the usual two-call pattern: a first call with a
//! null buffer returns the required size, the second call fills the buffer.
//!
//! The session is closed (and logged out if it performed the login) when dropped.

use std::{ptr, sync::Arc};

use cosmian_pkcs11_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_TYPE, CK_OBJECT_HANDLE, CK_SESSION_HANDLE, CK_SESSION_INFO,
    CK_ULONG, CKA_LABEL, CKA_TOKEN, CKF_RW_SESSION, CKO_PRIVATE_KEY, CKO_PUBLIC_KEY,
    CKO_SECRET_KEY, CKR_ATTRIBUTE_SENSITIVE, CKR_ATTRIBUTE_TYPE_INVALID,
    CKR_OBJECT_HANDLE_INVALID, CKR_OK, CKR_SIGNATURE_INVALID,
};
use serde::Serialize;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use crate::{
    HError, HResult, ObjectHandlesCache, hsm_bail, hsm_call,
    hsm_capabilities::HsmCapabilities,
    hsm_lib::HsmLib,
    session::{AttributeValues, Mechanism, Template},
    token::UNAVAILABLE_INFORMATION,
};

/// Object classes searched by [`Session::list_objects`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFilter {
    Any,
    SecretKey,
    PrivateKey,
    PublicKey,
    /// Private keys stored on the token
    TokenPrivateKey,
}

impl ObjectFilter {
    fn template(self) -> Template {
        match self {
            Self::Any => Template::new(),
            Self::SecretKey => Template::new().class(CKO_SECRET_KEY),
            Self::PrivateKey => Template::new().class(CKO_PRIVATE_KEY),
            Self::PublicKey => Template::new().class(CKO_PUBLIC_KEY),
            Self::TokenPrivateKey => Template::new().token(true).class(CKO_PRIVATE_KEY),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub slot_id: u64,
    pub state: u64,
    pub read_write: bool,
    pub device_error: u64,
}

impl From<CK_SESSION_INFO> for SessionInfo {
    fn from(info: CK_SESSION_INFO) -> Self {
        Self {
            slot_id: u64::from(info.slotID),
            state: u64::from(info.state),
            read_write: info.flags & CKF_RW_SESSION != 0,
            device_error: u64::from(info.ulDeviceError),
        }
    }
}

/// A session with a `PKCS#11` token.
///
/// Sessions are created by a [`crate::SlotManager`] and share its object
/// handles cache. The cache maps labels of token objects to handles; it is
/// updated when this session creates, relabels or destroys a labelled token object.
pub struct Session {
    hsm: Arc<HsmLib>,
    handle: CK_SESSION_HANDLE,
    object_handles_cache: Arc<ObjectHandlesCache>,
    logging_in: bool,
    hsm_capabilities: HsmCapabilities,
}

impl Session {
    pub(crate) fn new(
        hsm: Arc<HsmLib>,
        session_handle: CK_SESSION_HANDLE,
        object_handles_cache: Arc<ObjectHandlesCache>,
        logging_in: bool,
        hsm_capabilities: HsmCapabilities,
    ) -> Self {
        debug!("Creating new session: {session_handle}. Logging in? {logging_in}");
        Self {
            hsm,
            handle: session_handle,
            object_handles_cache,
            logging_in,
            hsm_capabilities,
        }
    }

    /// Whether closing the session logs out
    pub(crate) const fn set_logging_in(&mut self, logging_in: bool) {
        self.logging_in = logging_in;
    }

    pub(crate) fn hsm(&self) -> Arc<HsmLib> {
        self.hsm.clone()
    }

    /// Get the PKCS#11 session handle
    #[must_use]
    pub const fn session_handle(&self) -> CK_SESSION_HANDLE {
        self.handle
    }

    pub(crate) fn object_handles_cache(&self) -> Arc<ObjectHandlesCache> {
        self.object_handles_cache.clone()
    }

    #[must_use]
    pub const fn capabilities(&self) -> &HsmCapabilities {
        &self.hsm_capabilities
    }

    /// Close the session and log out if necessary.
    ///
    /// The session is closed even when the logout fails.
    ///
    /// # Errors
    /// Fails if `C_Logout` or `C_CloseSession` fails.
    pub fn close(&self) -> HResult<()> {
        let logout = if self.logging_in {
            self.logout()
        } else {
            Ok(())
        };
        hsm_call!(
            self.hsm,
            "Failed closing a session",
            C_CloseSession,
            self.handle
        );
        logout
    }

    fn logout(&self) -> HResult<()> {
        hsm_call!(self.hsm, "Failed logging out", C_Logout, self.handle);
        debug!("Logged out of session {}", self.handle);
        Ok(())
    }

    /// # Errors
    /// Fails if `C_GetSessionInfo` fails, typically because the session was closed.
    pub fn get_session_info(&self) -> HResult<SessionInfo> {
        let mut info = CK_SESSION_INFO::default();
        hsm_call!(
            self.hsm,
            "Failed getting session info",
            C_GetSessionInfo,
            self.handle,
            &raw mut info
        );
        Ok(info.into())
    }

    /// Search for and retrieve object handles that match the provided attribute template.
    ///
    /// An empty template matches every object visible to the session.
    /// `C_FindObjectsFinal` is called even when the search itself fails.
    ///
    /// # Errors
    /// Fails if the HSM fails to initialize, execute or finalize the search.
    pub fn find_object_handles(&self, template: &Template) -> HResult<Vec<CK_OBJECT_HANDLE>> {
        let mut ck_template = template.as_ck_attributes()?;
        hsm_call!(
            self.hsm,
            "Failed to initialize object search",
            C_FindObjectsInit,
            self.handle,
            ck_template.as_mut_ptr(),
            ck_template.ck_len()?
        );
        let found = self.find_objects();
        let finalized = self.find_objects_final();
        let object_handles = found?;
        finalized?;
        Ok(object_handles)
    }

    fn find_objects(&self) -> HResult<Vec<CK_OBJECT_HANDLE>> {
        let mut object_handles: Vec<CK_OBJECT_HANDLE> = Vec::new();
        let max_object_count = usize::try_from(self.hsm_capabilities.find_max_object_count)?;
        let mut handles_buf = vec![CK_OBJECT_HANDLE::default(); max_object_count];
        let mut object_count: CK_ULONG = 0;
        loop {
            hsm_call!(
                self.hsm,
                "Failed to find objects",
                C_FindObjects,
                self.handle,
                handles_buf.as_mut_ptr(),
                self.hsm_capabilities.find_max_object_count,
                &raw mut object_count
            );
            if object_count == 0 {
                break;
            }
            trace!("Found {object_count} objects");
            object_handles.extend_from_slice(
                handles_buf
                    .get(..usize::try_from(object_count)?)
                    .ok_or_else(|| {
                        HError::Default("More objects returned than requested".to_owned())
                    })?,
            );
        }
        Ok(object_handles)
    }

    fn find_objects_final(&self) -> HResult<()> {
        hsm_call!(
            self.hsm,
            "Failed to finalize object search",
            C_FindObjectsFinal,
            self.handle
        );
        Ok(())
    }

    /// Find an object by its `CKA_LABEL`, using the slot cache first.
    ///
    /// A cached handle is used only while it still designates an object with
    /// this label; otherwise the entry is dropped and the token searched.
    /// Only token objects found by the search are cached: session objects
    /// die with the session that created them.
    ///
    /// When several objects share the label, the first one returned by the
    /// token is used.
    ///
    /// # Errors
    /// Fails if the search fails.
    pub fn find_object(&self, label: &str) -> HResult<Option<CK_OBJECT_HANDLE>> {
        if let Some(handle) = self.object_handles_cache.get(label.as_bytes())? {
            let cached_label = self.get_bytes_attribute(handle, CKA_LABEL)?;
            if cached_label.as_deref() == Some(label.as_bytes()) {
                return Ok(Some(handle));
            }
            debug!("Dropping the stale cached handle {handle} of '{label}'");
            self.object_handles_cache.remove(label.as_bytes())?;
        }
        let object_handles = self.find_object_handles(&Template::new().label(label))?;
        let Some(handle) = object_handles.first().copied() else {
            return Ok(None);
        };
        if object_handles.len() > 1 {
            warn!(
                "{} objects are labelled '{label}', using handle {handle}",
                object_handles.len()
            );
        }
        if self.get_bool_attribute(handle, CKA_TOKEN)? == Some(true) {
            self.object_handles_cache
                .insert(label.as_bytes().to_vec(), handle)?;
        }
        Ok(Some(handle))
    }

    /// Same as [`Session::find_object`] but a missing object is an error
    ///
    /// # Errors
    /// Fails if no object carries `label` or if the search fails.
    pub fn get_object_handle(&self, label: &str) -> HResult<CK_OBJECT_HANDLE> {
        self.find_object(label)?
            .ok_or_else(|| HError::Default(format!("object '{label}' not found")))
    }

    /// List objects matching the filter
    ///
    /// # Errors
    /// Fails if the search fails.
    pub fn list_objects(&self, object_filter: ObjectFilter) -> HResult<Vec<CK_OBJECT_HANDLE>> {
        self.find_object_handles(&object_filter.template())
    }

    /// Destroy an object and forget its cached handle
    ///
    /// # Errors
    /// Fails if `C_DestroyObject` fails.
    pub fn destroy_object(&self, object_handle: CK_OBJECT_HANDLE) -> HResult<()> {
        hsm_call!(
            self.hsm,
            "Failed to destroy object",
            C_DestroyObject,
            self.handle,
            object_handle
        );
        self.object_handles_cache.remove_handle(object_handle)?;
        Ok(())
    }

    /// # Errors
    /// Fails if `C_GenerateRandom` fails.
    pub fn generate_random(&self, len: usize) -> HResult<Vec<u8>> {
        let mut values = vec![0_u8; len];
        hsm_call!(
            self.hsm,
            "Failed generating random data",
            C_GenerateRandom,
            self.handle,
            values.as_mut_ptr(),
            CK_ULONG::try_from(len)?
        );
        Ok(values)
    }

    /// Mix additional seed material into the token RNG
    ///
    /// # Errors
    /// Fails if the library does not export `C_SeedRandom` or if the call fails.
    pub fn seed_random(&self, seed: &[u8]) -> HResult<()> {
        hsm_call!(
            self.hsm,
            "Failed seeding the random generator",
            C_SeedRandom,
            self.handle,
            seed.as_ptr().cast_mut(),
            CK_ULONG::try_from(seed.len())?
        );
        Ok(())
    }

    /// # Errors
    /// Fails if the token rejects the mechanism, the key or the data.
    pub fn encrypt(
        &self,
        mechanism: &Mechanism<'_>,
        key_handle: CK_OBJECT_HANDLE,
        data: &[u8],
    ) -> HResult<Vec<u8>> {
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed to initialize encryption",
                C_EncryptInit,
                self.handle,
                ck_mechanism,
                key_handle
            );
            let mut encrypted_data_len: CK_ULONG = 0;
            hsm_call!(
                self.hsm,
                format!(
                    "Failed to get the encrypted data length for {} bytes",
                    data.len()
                ),
                C_Encrypt,
                self.handle,
                data.as_ptr().cast_mut(),
                CK_ULONG::try_from(data.len())?,
                ptr::null_mut(),
                &raw mut encrypted_data_len
            );
            let mut encrypted_data = vec![0_u8; usize::try_from(encrypted_data_len)?];
            hsm_call!(
                self.hsm,
                "Failed to encrypt data",
                C_Encrypt,
                self.handle,
                data.as_ptr().cast_mut(),
                CK_ULONG::try_from(data.len())?,
                encrypted_data.as_mut_ptr(),
                &raw mut encrypted_data_len
            );
            encrypted_data.truncate(usize::try_from(encrypted_data_len)?);
            Ok(encrypted_data)
        })
    }

    /// # Errors
    /// Fails if the token rejects the mechanism, the key or the ciphertext.
    pub fn decrypt(
        &self,
        mechanism: &Mechanism<'_>,
        key_handle: CK_OBJECT_HANDLE,
        encrypted_data: &[u8],
    ) -> HResult<Zeroizing<Vec<u8>>> {
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed to initialize decryption",
                C_DecryptInit,
                self.handle,
                ck_mechanism,
                key_handle
            );
            let mut decrypted_data_len: CK_ULONG = 0;
            hsm_call!(
                self.hsm,
                "Failed to get decrypted data length",
                C_Decrypt,
                self.handle,
                encrypted_data.as_ptr().cast_mut(),
                CK_ULONG::try_from(encrypted_data.len())?,
                ptr::null_mut(),
                &raw mut decrypted_data_len
            );
            let mut decrypted_data =
                Zeroizing::new(vec![0_u8; usize::try_from(decrypted_data_len)?]);
            hsm_call!(
                self.hsm,
                "Failed to decrypt data",
                C_Decrypt,
                self.handle,
                encrypted_data.as_ptr().cast_mut(),
                CK_ULONG::try_from(encrypted_data.len())?,
                decrypted_data.as_mut_ptr(),
                &raw mut decrypted_data_len
            );
            decrypted_data.truncate(usize::try_from(decrypted_data_len)?);
            Ok(decrypted_data)
        })
    }

    /// # Errors
    /// Fails if the token rejects the mechanism, the key or the data.
    pub fn sign(
        &self,
        mechanism: &Mechanism<'_>,
        key_handle: CK_OBJECT_HANDLE,
        data: &[u8],
    ) -> HResult<Vec<u8>> {
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed to initialize signature",
                C_SignInit,
                self.handle,
                ck_mechanism,
                key_handle
            );
            let mut signature_len: CK_ULONG = 0;
            hsm_call!(
                self.hsm,
                "Failed to get the signature length",
                C_Sign,
                self.handle,
                data.as_ptr().cast_mut(),
                CK_ULONG::try_from(data.len())?,
                ptr::null_mut(),
                &raw mut signature_len
            );
            let mut signature = vec![0_u8; usize::try_from(signature_len)?];
            hsm_call!(
                self.hsm,
                "Failed to sign data",
                C_Sign,
                self.handle,
                data.as_ptr().cast_mut(),
                CK_ULONG::try_from(data.len())?,
                signature.as_mut_ptr(),
                &raw mut signature_len
            );
            signature.truncate(usize::try_from(signature_len)?);
            Ok(signature)
        })
    }

    /// Verify a signature.
    ///
    /// Returns `false` when the token answers `CKR_SIGNATURE_INVALID`.
    ///
    /// # Errors
    /// Fails on any other error of the token.
    pub fn verify(
        &self,
        mechanism: &Mechanism<'_>,
        key_handle: CK_OBJECT_HANDLE,
        data: &[u8],
        signature: &[u8],
    ) -> HResult<bool> {
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed to initialize verification",
                C_VerifyInit,
                self.handle,
                ck_mechanism,
                key_handle
            );
            let data_len = CK_ULONG::try_from(data.len())?;
            let signature_len = CK_ULONG::try_from(signature.len())?;
            let verify = self
                .hsm
                .C_Verify
                .ok_or_else(|| HError::Default("C_Verify not available on library".to_owned()))?;
            #[expect(unsafe_code)]
            let rv = unsafe {
                verify(
                    self.handle,
                    data.as_ptr().cast_mut(),
                    data_len,
                    signature.as_ptr().cast_mut(),
                    signature_len,
                )
            };
            match rv {
                CKR_OK => Ok(true),
                CKR_SIGNATURE_INVALID => Ok(false),
                rv => Err(HError::Pkcs11 {
                    context: "Failed to verify signature".to_owned(),
                    rv,
                }),
            }
        })
    }

    /// # Errors
    /// Fails if the token does not support the digest mechanism.
    pub fn digest(&self, mechanism: &Mechanism<'_>, data: &[u8]) -> HResult<Vec<u8>> {
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed to initialize digest",
                C_DigestInit,
                self.handle,
                ck_mechanism
            );
            let mut digest_len: CK_ULONG = 0;
            hsm_call!(
                self.hsm,
                "Failed to get the digest length",
                C_Digest,
                self.handle,
                data.as_ptr().cast_mut(),
                CK_ULONG::try_from(data.len())?,
                ptr::null_mut(),
                &raw mut digest_len
            );
            let mut digest = vec![0_u8; usize::try_from(digest_len)?];
            hsm_call!(
                self.hsm,
                "Failed to digest data",
                C_Digest,
                self.handle,
                data.as_ptr().cast_mut(),
                CK_ULONG::try_from(data.len())?,
                digest.as_mut_ptr(),
                &raw mut digest_len
            );
            digest.truncate(usize::try_from(digest_len)?);
            Ok(digest)
        })
    }

    /// # Errors
    /// Fails if the token rejects the mechanism or the template.
    pub fn generate_key(
        &self,
        mechanism: &Mechanism<'_>,
        template: &Template,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let mut ck_template = template.as_ck_attributes()?;
        let mut key_handle = CK_OBJECT_HANDLE::default();
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed generating key",
                C_GenerateKey,
                self.handle,
                ck_mechanism,
                ck_template.as_mut_ptr(),
                ck_template.ck_len()?,
                &raw mut key_handle
            );
            Ok(())
        })?;
        self.cache_labelled_object(template, key_handle)?;
        Ok(key_handle)
    }

    /// Generate a key pair and return the public and private key handles, in this order
    ///
    /// # Errors
    /// Fails if the token rejects the mechanism or one of the templates.
    pub fn generate_key_pair(
        &self,
        mechanism: &Mechanism<'_>,
        public_template: &Template,
        private_template: &Template,
    ) -> HResult<(CK_OBJECT_HANDLE, CK_OBJECT_HANDLE)> {
        let mut ck_public = public_template.as_ck_attributes()?;
        let mut ck_private = private_template.as_ck_attributes()?;
        let mut public_handle = CK_OBJECT_HANDLE::default();
        let mut private_handle = CK_OBJECT_HANDLE::default();
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed generating key pair",
                C_GenerateKeyPair,
                self.handle,
                ck_mechanism,
                ck_public.as_mut_ptr(),
                ck_public.ck_len()?,
                ck_private.as_mut_ptr(),
                ck_private.ck_len()?,
                &raw mut public_handle,
                &raw mut private_handle
            );
            Ok(())
        })?;
        // public and private keys usually share a label: only the private key is cached
        self.cache_labelled_object(private_template, private_handle)?;
        Ok((public_handle, private_handle))
    }

    /// # Errors
    /// Fails if the token rejects the mechanism, the base key or the template.
    pub fn derive_key(
        &self,
        mechanism: &Mechanism<'_>,
        base_key: CK_OBJECT_HANDLE,
        template: &Template,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let mut ck_template = template.as_ck_attributes()?;
        let mut key_handle = CK_OBJECT_HANDLE::default();
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed deriving key",
                C_DeriveKey,
                self.handle,
                ck_mechanism,
                base_key,
                ck_template.as_mut_ptr(),
                ck_template.ck_len()?,
                &raw mut key_handle
            );
            Ok(())
        })?;
        self.cache_labelled_object(template, key_handle)?;
        Ok(key_handle)
    }

    /// # Errors
    /// Fails if the token refuses to wrap the key.
    pub fn wrap_key(
        &self,
        mechanism: &Mechanism<'_>,
        wrapping_key: CK_OBJECT_HANDLE,
        key: CK_OBJECT_HANDLE,
    ) -> HResult<Vec<u8>> {
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            let mut wrapped_key_len: CK_ULONG = 0;
            hsm_call!(
                self.hsm,
                "Failed to get the wrapped key length",
                C_WrapKey,
                self.handle,
                ptr::from_mut(ck_mechanism),
                wrapping_key,
                key,
                ptr::null_mut(),
                &raw mut wrapped_key_len
            );
            let mut wrapped_key = vec![0_u8; usize::try_from(wrapped_key_len)?];
            hsm_call!(
                self.hsm,
                "Failed to wrap key",
                C_WrapKey,
                self.handle,
                ptr::from_mut(ck_mechanism),
                wrapping_key,
                key,
                wrapped_key.as_mut_ptr(),
                &raw mut wrapped_key_len
            );
            wrapped_key.truncate(usize::try_from(wrapped_key_len)?);
            Ok(wrapped_key)
        })
    }

    /// # Errors
    /// Fails if the token refuses to unwrap the key with this template.
    pub fn unwrap_key(
        &self,
        mechanism: &Mechanism<'_>,
        unwrapping_key: CK_OBJECT_HANDLE,
        wrapped_key: &[u8],
        template: &Template,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let mut ck_template = template.as_ck_attributes()?;
        let mut key_handle = CK_OBJECT_HANDLE::default();
        mechanism.with_ck_mechanism(&self.hsm_capabilities, |ck_mechanism| {
            hsm_call!(
                self.hsm,
                "Failed to unwrap key",
                C_UnwrapKey,
                self.handle,
                ck_mechanism,
                unwrapping_key,
                wrapped_key.as_ptr().cast_mut(),
                CK_ULONG::try_from(wrapped_key.len())?,
                ck_template.as_mut_ptr(),
                ck_template.ck_len()?,
                &raw mut key_handle
            );
            Ok(())
        })?;
        self.cache_labelled_object(template, key_handle)?;
        Ok(key_handle)
    }

    /// # Errors
    /// Fails if the token rejects the template.
    pub fn create_object(&self, template: &Template) -> HResult<CK_OBJECT_HANDLE> {
        let mut ck_template = template.as_ck_attributes()?;
        let mut object_handle = CK_OBJECT_HANDLE::default();
        hsm_call!(
            self.hsm,
            "Failed to create object",
            C_CreateObject,
            self.handle,
            ck_template.as_mut_ptr(),
            ck_template.ck_len()?,
            &raw mut object_handle
        );
        self.cache_labelled_object(template, object_handle)?;
        Ok(object_handle)
    }

    /// Copy an object, overriding the attributes of `template`
    ///
    /// # Errors
    /// Fails if the object cannot be copied with these attributes.
    pub fn copy_object(
        &self,
        object_handle: CK_OBJECT_HANDLE,
        template: &Template,
    ) -> HResult<CK_OBJECT_HANDLE> {
        let mut ck_template = template.as_ck_attributes()?;
        let mut new_handle = CK_OBJECT_HANDLE::default();
        hsm_call!(
            self.hsm,
            "Failed to copy object",
            C_CopyObject,
            self.handle,
            object_handle,
            ck_template.as_mut_ptr(),
            ck_template.ck_len()?,
            &raw mut new_handle
        );
        Ok(new_handle)
    }

    /// Read attributes of an object.
    ///
    /// Attributes the token refuses to reveal, or does not know, are present
    /// in the result with no value. Returns `None` if the handle is invalid.
    ///
    /// # Errors
    /// Fails on any other error of `C_GetAttributeValue`.
    pub fn get_attributes(
        &self,
        object_handle: CK_OBJECT_HANDLE,
        attributes: &[CK_ATTRIBUTE_TYPE],
    ) -> HResult<Option<AttributeValues>> {
        debug!("Retrieving attributes of object handle: {object_handle}");
        let mut template: Vec<CK_ATTRIBUTE> = attributes
            .iter()
            .map(|attribute| CK_ATTRIBUTE {
                type_: *attribute,
                pValue: ptr::null_mut(),
                ulValueLen: 0,
            })
            .collect();
        if self
            .call_get_attributes(object_handle, &mut template)?
            .is_none()
        {
            return Ok(None);
        }

        let mut buffers: Vec<Option<Vec<u8>>> = template
            .iter()
            .map(|attribute| -> HResult<Option<Vec<u8>>> {
                if attribute.ulValueLen == UNAVAILABLE_INFORMATION {
                    Ok(None)
                } else {
                    Ok(Some(vec![0_u8; usize::try_from(attribute.ulValueLen)?]))
                }
            })
            .collect::<HResult<_>>()?;
        let mut available: Vec<CK_ATTRIBUTE> = template
            .iter()
            .zip(buffers.iter_mut())
            .filter_map(|(attribute, buffer)| {
                buffer.as_mut().map(|buffer| CK_ATTRIBUTE {
                    type_: attribute.type_,
                    pValue: buffer.as_mut_ptr().cast::<std::ffi::c_void>(),
                    ulValueLen: attribute.ulValueLen,
                })
            })
            .collect();
        if !available.is_empty()
            && self
                .call_get_attributes(object_handle, &mut available)?
                .is_none()
        {
            return Ok(None);
        }

        let mut values = AttributeValues::default();
        let mut available = available.iter();
        for (attribute, buffer) in attributes.iter().zip(buffers) {
            let value = match buffer {
                Some(mut buffer) => {
                    let read = available
                        .next()
                        .ok_or_else(|| HError::Default("attribute list mismatch".to_owned()))?;
                    if read.ulValueLen == UNAVAILABLE_INFORMATION {
                        None
                    } else {
                        buffer.truncate(usize::try_from(read.ulValueLen)?);
                        Some(buffer)
                    }
                }
                None => None,
            };
            values.push(*attribute, value);
        }
        Ok(Some(values))
    }

    fn call_get_attributes(
        &self,
        object_handle: CK_OBJECT_HANDLE,
        template: &mut [CK_ATTRIBUTE],
    ) -> HResult<Option<()>> {
        let count = CK_ULONG::try_from(template.len())?;
        let Some(get_attribute_value) = self.hsm.C_GetAttributeValue else {
            hsm_bail!("C_GetAttributeValue not available on library");
        };
        #[expect(unsafe_code)]
        let rv = unsafe {
            get_attribute_value(self.handle, object_handle, template.as_mut_ptr(), count)
        };
        match rv {
            CKR_OK | CKR_ATTRIBUTE_SENSITIVE | CKR_ATTRIBUTE_TYPE_INVALID => Ok(Some(())),
            CKR_OBJECT_HANDLE_INVALID => Ok(None),
            rv => Err(HError::Pkcs11 {
                context: format!("Failed to get the attributes of object handle {object_handle}"),
                rv,
            }),
        }
    }

    /// # Errors
    /// Fails if the attributes cannot be read.
    pub fn get_bool_attribute(
        &self,
        object_handle: CK_OBJECT_HANDLE,
        attribute: CK_ATTRIBUTE_TYPE,
    ) -> HResult<Option<bool>> {
        Ok(self
            .get_attributes(object_handle, &[attribute])?
            .and_then(|values| values.get_bool(attribute)))
    }

    /// # Errors
    /// Fails if the attributes cannot be read.
    #[allow(clippy::useless_conversion)]
    pub fn get_ulong_attribute(
        &self,
        object_handle: CK_OBJECT_HANDLE,
        attribute: CK_ATTRIBUTE_TYPE,
    ) -> HResult<Option<u64>> {
        Ok(self
            .get_attributes(object_handle, &[attribute])?
            .and_then(|values| values.get_ulong(attribute))
            .map(u64::from))
    }

    /// # Errors
    /// Fails if the attributes cannot be read.
    pub fn get_bytes_attribute(
        &self,
        object_handle: CK_OBJECT_HANDLE,
        attribute: CK_ATTRIBUTE_TYPE,
    ) -> HResult<Option<Vec<u8>>> {
        Ok(self
            .get_attributes(object_handle, &[attribute])?
            .and_then(|values| values.get(attribute).map(<[u8]>::to_vec)))
    }

    /// # Errors
    /// Fails if the label is not valid UTF-8 or cannot be read.
    pub fn get_label(&self, object_handle: CK_OBJECT_HANDLE) -> HResult<Option<String>> {
        self.get_bytes_attribute(object_handle, CKA_LABEL)?
            .map(String::from_utf8)
            .transpose()
            .map_err(HError::from)
    }

    /// # Errors
    /// Fails if the object is not modifiable.
    pub fn set_label(&self, object_handle: CK_OBJECT_HANDLE, label: &str) -> HResult<()> {
        self.set_attributes(object_handle, &Template::new().label(label))
    }

    /// Modify attributes of an object (`C_SetAttributeValue`)
    ///
    /// # Errors
    /// Fails if the object or one of the attributes is not modifiable.
    pub fn set_attributes(
        &self,
        object_handle: CK_OBJECT_HANDLE,
        template: &Template,
    ) -> HResult<()> {
        let mut ck_template = template.as_ck_attributes()?;
        hsm_call!(
            self.hsm,
            "Failed to set attributes",
            C_SetAttributeValue,
            self.handle,
            object_handle,
            ck_template.as_mut_ptr(),
            ck_template.ck_len()?
        );
        if template.label_bytes().is_some() {
            self.object_handles_cache.remove_handle(object_handle)?;
        }
        Ok(())
    }

    fn cache_labelled_object(
        &self,
        template: &Template,
        object_handle: CK_OBJECT_HANDLE,
    ) -> HResult<()> {
        if let (true, Some(label)) = (template.is_token(), template.label_bytes()) {
            self.object_handles_cache
                .insert(label.to_vec(), object_handle)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Failed closing session {}: {e}", self.handle);
        }
    }
}
