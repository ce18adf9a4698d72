use std::ptr;

use cosmian_pkcs11_sys::*;
use libloading::Library;
use tracing::{debug, warn};

use crate::{HError, HResult, luna::LunaFunctions};

/// The `PKCS#11` function table of a vendor library loaded at run time.
///
/// Every field is a function pointer resolved from the shared library. Functions
/// that all the supported HSMs export are mandatory and loading fails when one of
/// them is missing. Optional functions (`C_SeedRandom`, the Luna `CA_*`
/// extensions) resolve to `None` and calling them yields an error instead.
///
/// The library is initialized with `CKF_OS_LOCKING_OK` when loaded and finalized
/// when the struct is dropped, so a single `HsmLib` must be shared (behind an `Arc`)
/// by every slot and session of the process.
pub struct HsmLib {
    pub(crate) C_Initialize: CK_C_Initialize,
    pub(crate) C_Finalize: CK_C_Finalize,
    pub(crate) C_GetInfo: CK_C_GetInfo,

    pub(crate) C_GetSlotList: CK_C_GetSlotList,
    pub(crate) C_GetSlotInfo: CK_C_GetSlotInfo,
    pub(crate) C_GetTokenInfo: CK_C_GetTokenInfo,
    pub(crate) C_GetMechanismList: CK_C_GetMechanismList,
    pub(crate) C_GetMechanismInfo: CK_C_GetMechanismInfo,

    pub(crate) C_OpenSession: CK_C_OpenSession,
    pub(crate) C_CloseSession: CK_C_CloseSession,
    pub(crate) C_GetSessionInfo: CK_C_GetSessionInfo,
    pub(crate) C_Login: CK_C_Login,
    pub(crate) C_Logout: CK_C_Logout,

    pub(crate) C_CreateObject: CK_C_CreateObject,
    pub(crate) C_CopyObject: CK_C_CopyObject,
    pub(crate) C_DestroyObject: CK_C_DestroyObject,
    pub(crate) C_GetAttributeValue: CK_C_GetAttributeValue,
    pub(crate) C_SetAttributeValue: CK_C_SetAttributeValue,
    pub(crate) C_FindObjectsInit: CK_C_FindObjectsInit,
    pub(crate) C_FindObjects: CK_C_FindObjects,
    pub(crate) C_FindObjectsFinal: CK_C_FindObjectsFinal,

    pub(crate) C_EncryptInit: CK_C_EncryptInit,
    pub(crate) C_Encrypt: CK_C_Encrypt,
    pub(crate) C_DecryptInit: CK_C_DecryptInit,
    pub(crate) C_Decrypt: CK_C_Decrypt,
    pub(crate) C_DigestInit: CK_C_DigestInit,
    pub(crate) C_Digest: CK_C_Digest,
    pub(crate) C_SignInit: CK_C_SignInit,
    pub(crate) C_Sign: CK_C_Sign,
    pub(crate) C_VerifyInit: CK_C_VerifyInit,
    pub(crate) C_Verify: CK_C_Verify,

    pub(crate) C_GenerateKey: CK_C_GenerateKey,
    pub(crate) C_GenerateKeyPair: CK_C_GenerateKeyPair,
    pub(crate) C_WrapKey: CK_C_WrapKey,
    pub(crate) C_UnwrapKey: CK_C_UnwrapKey,
    pub(crate) C_DeriveKey: CK_C_DeriveKey,

    pub(crate) C_SeedRandom: CK_C_SeedRandom,
    pub(crate) C_GenerateRandom: CK_C_GenerateRandom,

    pub(crate) luna: LunaFunctions,

    // must be dropped last
    _library: Library,
}

impl HsmLib {
    /// Load the library at `path`, resolve its functions and call `C_Initialize`.
    ///
    /// # Errors
    /// Fails if the library cannot be loaded, if a mandatory function is missing
    /// or if `C_Initialize` fails.
    pub(crate) fn instantiate<P>(path: P) -> HResult<Self>
    where
        P: AsRef<std::ffi::OsStr>,
    {
        debug!("Loading PKCS#11 library {:?}", path.as_ref());
        #[expect(unsafe_code)]
        let hsm_lib = unsafe {
            let library = Library::new(path)?;
            Self {
                C_Initialize: Some(*library.get(b"C_Initialize")?),
                C_Finalize: Some(*library.get(b"C_Finalize")?),
                C_GetInfo: Some(*library.get(b"C_GetInfo")?),
                C_GetSlotList: Some(*library.get(b"C_GetSlotList")?),
                C_GetSlotInfo: Some(*library.get(b"C_GetSlotInfo")?),
                C_GetTokenInfo: Some(*library.get(b"C_GetTokenInfo")?),
                C_GetMechanismList: Some(*library.get(b"C_GetMechanismList")?),
                C_GetMechanismInfo: Some(*library.get(b"C_GetMechanismInfo")?),
                C_OpenSession: Some(*library.get(b"C_OpenSession")?),
                C_CloseSession: Some(*library.get(b"C_CloseSession")?),
                C_GetSessionInfo: Some(*library.get(b"C_GetSessionInfo")?),
                C_Login: Some(*library.get(b"C_Login")?),
                C_Logout: Some(*library.get(b"C_Logout")?),
                C_CreateObject: Some(*library.get(b"C_CreateObject")?),
                C_CopyObject: Some(*library.get(b"C_CopyObject")?),
                C_DestroyObject: Some(*library.get(b"C_DestroyObject")?),
                C_GetAttributeValue: Some(*library.get(b"C_GetAttributeValue")?),
                C_SetAttributeValue: Some(*library.get(b"C_SetAttributeValue")?),
                C_FindObjectsInit: Some(*library.get(b"C_FindObjectsInit")?),
                C_FindObjects: Some(*library.get(b"C_FindObjects")?),
                C_FindObjectsFinal: Some(*library.get(b"C_FindObjectsFinal")?),
                C_EncryptInit: Some(*library.get(b"C_EncryptInit")?),
                C_Encrypt: Some(*library.get(b"C_Encrypt")?),
                C_DecryptInit: Some(*library.get(b"C_DecryptInit")?),
                C_Decrypt: Some(*library.get(b"C_Decrypt")?),
                C_DigestInit: Some(*library.get(b"C_DigestInit")?),
                C_Digest: Some(*library.get(b"C_Digest")?),
                C_SignInit: Some(*library.get(b"C_SignInit")?),
                C_Sign: Some(*library.get(b"C_Sign")?),
                C_VerifyInit: Some(*library.get(b"C_VerifyInit")?),
                C_Verify: Some(*library.get(b"C_Verify")?),
                C_GenerateKey: Some(*library.get(b"C_GenerateKey")?),
                C_GenerateKeyPair: Some(*library.get(b"C_GenerateKeyPair")?),
                C_WrapKey: Some(*library.get(b"C_WrapKey")?),
                C_UnwrapKey: Some(*library.get(b"C_UnwrapKey")?),
                C_DeriveKey: Some(*library.get(b"C_DeriveKey")?),
                C_SeedRandom: library.get(b"C_SeedRandom").ok().map(|symbol| *symbol),
                C_GenerateRandom: Some(*library.get(b"C_GenerateRandom")?),
                luna: LunaFunctions::load(&library),
                _library: library,
            }
        };
        hsm_lib.initialize()?;
        Ok(hsm_lib)
    }

    fn initialize(&self) -> HResult<()> {
        let mut init_args = CK_C_INITIALIZE_ARGS {
            CreateMutex: None,
            DestroyMutex: None,
            LockMutex: None,
            UnlockMutex: None,
            flags: CKF_OS_LOCKING_OK,
            pReserved: ptr::null_mut(),
        };
        #[expect(unsafe_code)]
        let rv = unsafe {
            self.C_Initialize.ok_or_else(|| {
                HError::Default("C_Initialize not available on library".to_owned())
            })?((&raw mut init_args).cast::<std::ffi::c_void>())
        };
        match rv {
            CKR_OK => Ok(()),
            CKR_CRYPTOKI_ALREADY_INITIALIZED => {
                warn!("the PKCS#11 library was already initialized by this process");
                Ok(())
            }
            rv => Err(HError::Pkcs11 {
                context: "Failed initializing the HSM".to_owned(),
                rv,
            }),
        }
    }

    fn finalize(&self) -> HResult<()> {
        crate::hsm_call!(
            self,
            "Failed to finalize the HSM",
            C_Finalize,
            ptr::null_mut()
        );
        Ok(())
    }
}

impl Drop for HsmLib {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            warn!("{e}");
        }
    }
}
