//! Luna vendor definitions and SafeNet (`CA_*`) extension functions.
//!
//! These are not part of the OASIS headers. The `CA_*` functions are resolved
//! directly from the library symbols and are only present on Luna clients.
#![allow(non_camel_case_types)]

use std::{ffi::CStr, fmt, ptr};

use cosmian_pkcs11_sys::{
    CK_BBOOL, CK_BYTE, CK_BYTE_PTR, CK_CHAR_PTR, CK_FALSE, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE,
    CK_OBJECT_HANDLE_PTR, CK_RV, CK_SESSION_HANDLE, CK_SLOT_ID, CK_TRUE, CK_ULONG, CK_ULONG_PTR,
    CK_USER_TYPE, CKA_VENDOR_DEFINED, CKM_VENDOR_DEFINED, CKR_OK, CKR_VENDOR_DEFINED,
};
use libloading::Library;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    BaseHsm, HError, HResult, Session, hsm_call, hsm_capabilities::HsmProvider,
    session::ObjectFilter,
};

/// Maximum number of uses of a key (`CK_ULONG`)
pub const CKA_USAGE_LIMIT: CK_ULONG = CKA_VENDOR_DEFINED + 0x200;
/// Number of times a key has been used (`CK_ULONG`, read only)
pub const CKA_USAGE_COUNT: CK_ULONG = CKA_VENDOR_DEFINED + 0x201;

/// Returned once a key with a usage limit has been used up
pub const CKR_KEY_NOT_ACTIVE: CK_RV = CKR_VENDOR_DEFINED + 0x136;
/// Generic `PKCS#11` 3.0 code for the same condition
pub const CKR_KEY_EXHAUSTED: CK_RV = 0x0000_0203;

pub const CKU_CRYPTO_USER: CK_USER_TYPE = 0x8000_0001;

pub const CKM_PRF_KDF: CK_MECHANISM_TYPE = CKM_VENDOR_DEFINED + 0xA03;
pub const CKM_NIST_PRF_KDF: CK_MECHANISM_TYPE = CKM_VENDOR_DEFINED + 0xA02;
pub const CKM_AES_KW: CK_MECHANISM_TYPE = CKM_VENDOR_DEFINED + 0x170;
pub const CKM_AES_KWP: CK_MECHANISM_TYPE = CKM_VENDOR_DEFINED + 0x171;
pub const CKM_RSA_FIPS_186_3_PRIME_KEY_PAIR_GEN: CK_MECHANISM_TYPE = CKM_VENDOR_DEFINED + 0x143;

pub type CK_PRF_KDF_TYPE = CK_ULONG;
pub const CK_NIST_PRF_KDF_DES3_CMAC: CK_PRF_KDF_TYPE = 0x01;
pub const CK_NIST_PRF_KDF_AES_CMAC: CK_PRF_KDF_TYPE = 0x02;
pub const CK_PRF_KDF_ARIA_CMAC: CK_PRF_KDF_TYPE = 0x03;
pub const CK_PRF_KDF_SEED_CMAC: CK_PRF_KDF_TYPE = 0x04;
pub const CK_NIST_PRF_KDF_HMAC_SHA1: CK_PRF_KDF_TYPE = 0x05;
pub const CK_NIST_PRF_KDF_HMAC_SHA224: CK_PRF_KDF_TYPE = 0x06;
pub const CK_NIST_PRF_KDF_HMAC_SHA256: CK_PRF_KDF_TYPE = 0x07;
pub const CK_NIST_PRF_KDF_HMAC_SHA384: CK_PRF_KDF_TYPE = 0x08;
pub const CK_NIST_PRF_KDF_HMAC_SHA512: CK_PRF_KDF_TYPE = 0x09;

pub const LUNA_PRF_KDF_ENCODING_SCHEME_1: CK_ULONG = 0x0000_0000;
pub const LUNA_PRF_KDF_ENCODING_SCHEME_2: CK_ULONG = 0x0000_0001;

pub type CKA_SIM_AUTH_FORM = CK_ULONG;
pub const CKA_SIM_NO_AUTHORIZATION: CKA_SIM_AUTH_FORM = 0;
pub const CKA_SIM_PASSWORD: CKA_SIM_AUTH_FORM = 1;
pub const CKA_SIM_CHALLENGE: CKA_SIM_AUTH_FORM = 2;
pub const CKA_SIM_SECURE_PORT: CKA_SIM_AUTH_FORM = 3;
pub const CKA_SIM_PORTABLE_NO_AUTHORIZATION: CKA_SIM_AUTH_FORM = 4;

/// Parameters of `CKM_NIST_PRF_KDF` and `CKM_PRF_KDF`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)]
pub struct CK_PRF_KDF_PARAMS {
    pub prfType: CK_PRF_KDF_TYPE,
    pub pLabel: CK_BYTE_PTR,
    pub ulLabelLen: CK_ULONG,
    pub pContext: CK_BYTE_PTR,
    pub ulContextLen: CK_ULONG,
    pub ulCounter: CK_ULONG,
    pub ulEncodingScheme: CK_ULONG,
}

pub type CK_CA_SIMExtract = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        ulHandleCount: CK_ULONG,
        pHandleList: CK_OBJECT_HANDLE_PTR,
        ulAuthSecretCount: CK_ULONG,
        ulAuthSubsetCount: CK_ULONG,
        authForm: CKA_SIM_AUTH_FORM,
        pulAuthSecretSizes: CK_ULONG_PTR,
        ppbAuthSecretList: *mut CK_BYTE_PTR,
        deleteAfterExtract: CK_BBOOL,
        pulBlobSize: CK_ULONG_PTR,
        pBlob: CK_BYTE_PTR,
    ) -> CK_RV,
>;

pub type CK_CA_SIMInsert = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        ulAuthSecretCount: CK_ULONG,
        authForm: CKA_SIM_AUTH_FORM,
        pulAuthSecretSizes: CK_ULONG_PTR,
        ppbAuthSecretList: *mut CK_BYTE_PTR,
        ulBlobSize: CK_ULONG,
        pBlob: CK_BYTE_PTR,
        pulHandleCount: CK_ULONG_PTR,
        pHandleList: CK_OBJECT_HANDLE_PTR,
    ) -> CK_RV,
>;

/// Shared by `CA_GetTokenCapabilities` and `CA_GetTokenPolicies`
pub type CK_CA_GetTokenElements = Option<
    unsafe extern "C" fn(
        slotID: CK_SLOT_ID,
        pulIdArray: CK_ULONG_PTR,
        pulIdSize: CK_ULONG_PTR,
        pulValArray: CK_ULONG_PTR,
        pulValSize: CK_ULONG_PTR,
    ) -> CK_RV,
>;

pub type CK_CA_GetConfigurationElementDescription = Option<
    unsafe extern "C" fn(
        slotID: CK_SLOT_ID,
        ulIsContainerElement: CK_ULONG,
        ulIsCapabilityElement: CK_ULONG,
        ulElementId: CK_ULONG,
        pulElementBitLength: CK_ULONG_PTR,
        pulElementDestructive: CK_ULONG_PTR,
        pulElementWriteRestricted: CK_ULONG_PTR,
        pDescription: CK_CHAR_PTR,
        pulDescriptionLen: CK_ULONG_PTR,
    ) -> CK_RV,
>;

#[allow(non_snake_case)]
pub(crate) struct LunaFunctions {
    pub(crate) CA_SIMExtract: CK_CA_SIMExtract,
    pub(crate) CA_SIMInsert: CK_CA_SIMInsert,
    pub(crate) CA_GetTokenCapabilities: CK_CA_GetTokenElements,
    pub(crate) CA_GetTokenPolicies: CK_CA_GetTokenElements,
    pub(crate) CA_GetConfigurationElementDescription: CK_CA_GetConfigurationElementDescription,
}

impl LunaFunctions {
    /// Resolve whichever extension functions the library exports.
    ///
    /// # Safety
    /// The symbols, when present, must have the Luna signatures declared above.
    #[expect(unsafe_code)]
    pub(crate) unsafe fn load(library: &Library) -> Self {
        let functions = unsafe {
            Self {
                CA_SIMExtract: library.get(b"CA_SIMExtract").ok().map(|s| *s),
                CA_SIMInsert: library.get(b"CA_SIMInsert").ok().map(|s| *s),
                CA_GetTokenCapabilities: library.get(b"CA_GetTokenCapabilities").ok().map(|s| *s),
                CA_GetTokenPolicies: library.get(b"CA_GetTokenPolicies").ok().map(|s| *s),
                CA_GetConfigurationElementDescription: library
                    .get(b"CA_GetConfigurationElementDescription")
                    .ok()
                    .map(|s| *s),
            }
        };
        debug!(
            "SafeNet extensions available: {}",
            functions.CA_GetTokenCapabilities.is_some()
        );
        functions
    }
}

/// One capability or policy of a Luna partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationElement {
    pub id: u64,
    pub value: u64,
    pub description: String,
    pub bit_length: u64,
    pub destructive: bool,
    pub write_restricted: bool,
}

impl fmt::Display for ConfigurationElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{} ==> {}.", self.id, self.description, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Capability,
    Policy,
}

impl<P: HsmProvider> BaseHsm<P> {
    /// Capabilities of the partition in `slot_id` (`CA_GetTokenCapabilities`).
    ///
    /// # Errors
    /// Fails if the library is not a Luna library or if the HSM call fails.
    pub fn token_capabilities(&self, slot_id: usize) -> HResult<Vec<ConfigurationElement>> {
        self.configuration_elements(slot_id, ElementKind::Capability)
    }

    /// Policies of the partition in `slot_id` (`CA_GetTokenPolicies`).
    ///
    /// # Errors
    /// Fails if the library is not a Luna library or if the HSM call fails.
    pub fn token_policies(&self, slot_id: usize) -> HResult<Vec<ConfigurationElement>> {
        self.configuration_elements(slot_id, ElementKind::Policy)
    }

    fn configuration_elements(
        &self,
        slot_id: usize,
        kind: ElementKind,
    ) -> HResult<Vec<ConfigurationElement>> {
        let luna = &self.hsm_lib.luna;
        let get_elements = match kind {
            ElementKind::Capability => luna.CA_GetTokenCapabilities,
            ElementKind::Policy => luna.CA_GetTokenPolicies,
        };
        let slot = CK_SLOT_ID::try_from(slot_id)?;
        let mut id_count: CK_ULONG = 0;
        let mut value_count: CK_ULONG = 0;
        call_get_elements(
            get_elements,
            kind,
            slot,
            ptr::null_mut(),
            &raw mut id_count,
            ptr::null_mut(),
            &raw mut value_count,
        )?;
        let mut ids = vec![0 as CK_ULONG; usize::try_from(id_count)?];
        let mut values = vec![0 as CK_ULONG; usize::try_from(value_count)?];
        call_get_elements(
            get_elements,
            kind,
            slot,
            ids.as_mut_ptr(),
            &raw mut id_count,
            values.as_mut_ptr(),
            &raw mut value_count,
        )?;
        ids.truncate(usize::try_from(id_count)?);
        values.truncate(usize::try_from(value_count)?);

        let is_capability = CK_ULONG::from(kind == ElementKind::Capability);
        let mut result = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let mut bit_length: CK_ULONG = 0;
            let mut destructive: CK_ULONG = 0;
            let mut write_restricted: CK_ULONG = 0;
            let mut description_len: CK_ULONG = 0;
            hsm_call!(
                luna,
                "CA_GetConfigurationElementDescription",
                CA_GetConfigurationElementDescription,
                slot,
                1,
                is_capability,
                *id,
                &raw mut bit_length,
                &raw mut destructive,
                &raw mut write_restricted,
                ptr::null_mut(),
                &raw mut description_len
            );
            // one extra byte in case the library does not count the terminating nul
            let mut description = vec![0_u8; usize::try_from(description_len)? + 1];
            hsm_call!(
                luna,
                "CA_GetConfigurationElementDescription",
                CA_GetConfigurationElementDescription,
                slot,
                1,
                is_capability,
                *id,
                &raw mut bit_length,
                &raw mut destructive,
                &raw mut write_restricted,
                description.as_mut_ptr(),
                &raw mut description_len
            );
            let description = CStr::from_bytes_until_nul(&description)
                .map(|s| s.to_string_lossy().trim().to_owned())
                .unwrap_or_default();
            result.push(ConfigurationElement {
                id: u64::from(*id),
                value: values.get(i).copied().map(u64::from).unwrap_or_default(),
                description,
                bit_length: u64::from(bit_length),
                destructive: destructive != 0,
                write_restricted: write_restricted != 0,
            });
        }
        Ok(result)
    }
}

fn call_get_elements(
    get_elements: CK_CA_GetTokenElements,
    kind: ElementKind,
    slot: CK_SLOT_ID,
    ids: CK_ULONG_PTR,
    id_count: CK_ULONG_PTR,
    values: CK_ULONG_PTR,
    value_count: CK_ULONG_PTR,
) -> HResult<()> {
    let name = match kind {
        ElementKind::Capability => "CA_GetTokenCapabilities",
        ElementKind::Policy => "CA_GetTokenPolicies",
    };
    let func =
        get_elements.ok_or_else(|| HError::Default(format!("{name} not available on library")))?;
    #[expect(unsafe_code)]
    let rv = unsafe { func(slot, ids, id_count, values, value_count) };
    if rv != CKR_OK {
        return Err(HError::Pkcs11 {
            context: name.to_owned(),
            rv,
        });
    }
    Ok(())
}

impl Session {
    /// Extract private token keys as a SIM blob (`CA_SIMExtract`, no authorization).
    ///
    /// With `delete_after_extract`, the HSM destroys the extracted objects.
    ///
    /// # Errors
    /// Fails if the library is not a Luna library or if the HSM call fails.
    pub fn sim_extract(
        &self,
        handles: &[CK_OBJECT_HANDLE],
        delete_after_extract: bool,
    ) -> HResult<Vec<u8>> {
        let hsm = self.hsm();
        let luna = &hsm.luna;
        let mut handles = handles.to_vec();
        let handle_count = CK_ULONG::try_from(handles.len())?;
        let delete: CK_BBOOL = if delete_after_extract { CK_TRUE } else { CK_FALSE };
        let mut blob_size: CK_ULONG = 0;
        hsm_call!(
            luna,
            "CA_SIMExtract",
            CA_SIMExtract,
            self.session_handle(),
            handle_count,
            handles.as_mut_ptr(),
            0,
            0,
            CKA_SIM_NO_AUTHORIZATION,
            ptr::null_mut(),
            ptr::null_mut(),
            delete,
            &raw mut blob_size,
            ptr::null_mut()
        );
        let mut blob: Vec<CK_BYTE> = vec![0; usize::try_from(blob_size)?];
        hsm_call!(
            luna,
            "CA_SIMExtract",
            CA_SIMExtract,
            self.session_handle(),
            handle_count,
            handles.as_mut_ptr(),
            0,
            0,
            CKA_SIM_NO_AUTHORIZATION,
            ptr::null_mut(),
            ptr::null_mut(),
            delete,
            &raw mut blob_size,
            blob.as_mut_ptr()
        );
        blob.truncate(usize::try_from(blob_size)?);
        if delete_after_extract {
            self.object_handles_cache().clear()?;
        }
        info!("Extracted {} objects into a {} bytes blob", handles.len(), blob.len());
        Ok(blob)
    }

    /// Extract every private key stored on the token.
    ///
    /// Returns `None` when the token holds no private key.
    ///
    /// # Errors
    /// Fails if the search or the extraction fails.
    pub fn sim_extract_token_private_keys(
        &self,
        delete_after_extract: bool,
    ) -> HResult<Option<(usize, Vec<u8>)>> {
        let handles = self.list_objects(ObjectFilter::TokenPrivateKey)?;
        if handles.is_empty() {
            return Ok(None);
        }
        let blob = self.sim_extract(&handles, delete_after_extract)?;
        Ok(Some((handles.len(), blob)))
    }

    /// Insert a SIM blob (`CA_SIMInsert`, no authorization) and return the new handles.
    ///
    /// # Errors
    /// Fails if the library is not a Luna library or if the HSM call fails.
    pub fn sim_insert(&self, blob: &[u8], max_objects: usize) -> HResult<Vec<CK_OBJECT_HANDLE>> {
        let hsm = self.hsm();
        let luna = &hsm.luna;
        let mut blob = blob.to_vec();
        let mut handles = vec![CK_OBJECT_HANDLE::default(); max_objects];
        let mut handle_count = CK_ULONG::try_from(max_objects)?;
        hsm_call!(
            luna,
            "CA_SIMInsert",
            CA_SIMInsert,
            self.session_handle(),
            0,
            CKA_SIM_NO_AUTHORIZATION,
            ptr::null_mut(),
            ptr::null_mut(),
            CK_ULONG::try_from(blob.len())?,
            blob.as_mut_ptr(),
            &raw mut handle_count,
            handles.as_mut_ptr()
        );
        let count = usize::try_from(handle_count)?;
        if count > handles.len() {
            return Err(HError::Default(format!(
                "CA_SIMInsert reported {count} objects for a buffer of {max_objects}"
            )));
        }
        handles.truncate(count);
        Ok(handles)
    }

    /// Current value of `CKA_USAGE_COUNT`
    ///
    /// # Errors
    /// Fails if the attribute cannot be read.
    pub fn usage_count(&self, handle: CK_OBJECT_HANDLE) -> HResult<Option<u64>> {
        self.get_ulong_attribute(handle, CKA_USAGE_COUNT)
    }

    /// Current value of `CKA_USAGE_LIMIT`
    ///
    /// # Errors
    /// Fails if the attribute cannot be read.
    pub fn usage_limit(&self, handle: CK_OBJECT_HANDLE) -> HResult<Option<u64>> {
        self.get_ulong_attribute(handle, CKA_USAGE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CKA_USAGE_COUNT, CKA_USAGE_LIMIT, CKM_AES_KW, CKM_NIST_PRF_KDF, ConfigurationElement,
    };

    #[test]
    fn vendor_codes() {
        assert_eq!(u64::from(CKA_USAGE_LIMIT), 0x8000_0200);
        assert_eq!(u64::from(CKA_USAGE_COUNT), 0x8000_0201);
        assert_eq!(u64::from(CKM_AES_KW), 0x8000_0170);
        assert_eq!(u64::from(CKM_NIST_PRF_KDF), 0x8000_0A02);
    }

    #[test]
    fn configuration_element_display() {
        let element = ConfigurationElement {
            id: 22,
            value: 1,
            description: "Allow private key wrapping".to_owned(),
            bit_length: 1,
            destructive: true,
            write_restricted: false,
        };
        assert_eq!(element.to_string(), "22\tAllow private key wrapping ==> 1.");
    }
}
