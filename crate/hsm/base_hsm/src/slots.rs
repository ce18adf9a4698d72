use std::{
    fmt,
    num::NonZeroUsize,
    ptr,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};

use cosmian_pkcs11_sys::{
    CK_FLAGS, CK_MECHANISM_INFO, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE, CK_SESSION_HANDLE,
    CK_RV, CK_SLOT_ID, CK_ULONG, CK_USER_TYPE, CKF_RW_SESSION, CKF_SERIAL_SESSION, CKR_OK,
    CKR_USER_ALREADY_LOGGED_IN, CKU_USER,
};
use lru::LruCache;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    HError, HResult, Session, hsm_call, hsm_capabilities::HsmCapabilities, hsm_lib::HsmLib,
    luna::CKU_CRYPTO_USER, mechanisms::MechanismInfo,
};

const CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(99);

/// How a slot is designated on the command line or in the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSelector {
    Id(usize),
    /// Label of the token present in the slot
    Label(String),
}

impl FromStr for SlotSelector {
    type Err = HError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HError::Default("empty slot selector".to_owned()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let id = s
                .parse::<usize>()
                .map_err(|e| HError::Default(format!("invalid slot id '{s}': {e}")))?;
            Ok(Self::Id(id))
        } else {
            Ok(Self::Label(s.to_owned()))
        }
    }
}

impl fmt::Display for SlotSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

/// The role a session logs in with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserType {
    /// The standard `CKU_USER` role, named Crypto Officer on Luna partitions
    #[default]
    CryptoOfficer,
    /// Luna `CKU_CRYPTO_USER`
    CryptoUser,
}

impl UserType {
    #[must_use]
    pub const fn ck_user_type(self) -> CK_USER_TYPE {
        match self {
            Self::CryptoOfficer => CKU_USER,
            Self::CryptoUser => CKU_CRYPTO_USER,
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CryptoOfficer => write!(f, "Crypto Officer"),
            Self::CryptoUser => write!(f, "Crypto User"),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub password: Zeroizing<String>,
    pub user: UserType,
}

impl Credentials {
    #[must_use]
    pub fn new(password: impl Into<String>, user: UserType) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
            user,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"****")
            .field("user", &self.user)
            .finish()
    }
}

/// An LRU cache of token object handles keyed by object label.
///
/// Shared by all the sessions of a slot: object handles are valid across
/// sessions of the same application.
pub struct ObjectHandlesCache(Mutex<LruCache<Vec<u8>, CK_OBJECT_HANDLE>>);

impl Default for ObjectHandlesCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectHandlesCache {
    #[must_use]
    pub fn new() -> Self {
        Self(Mutex::new(LruCache::new(CACHE_CAPACITY)))
    }

    fn lock(&self) -> HResult<MutexGuard<'_, LruCache<Vec<u8>, CK_OBJECT_HANDLE>>> {
        self.0
            .lock()
            .map_err(|e| HError::Default(format!("Failed to lock the handles cache: {e}")))
    }

    /// Get the object handle for the specified label
    pub fn get(&self, label: &[u8]) -> HResult<Option<CK_OBJECT_HANDLE>> {
        Ok(self.lock()?.get(label).copied())
    }

    pub fn insert(&self, label: Vec<u8>, handle: CK_OBJECT_HANDLE) -> HResult<()> {
        self.lock()?.put(label, handle);
        Ok(())
    }

    pub fn remove(&self, label: &[u8]) -> HResult<()> {
        self.lock()?.pop(label);
        Ok(())
    }

    /// Remove every label pointing to `handle`
    pub fn remove_handle(&self, handle: CK_OBJECT_HANDLE) -> HResult<()> {
        let mut cache = self.lock()?;
        let labels: Vec<Vec<u8>> = cache
            .iter()
            .filter(|(_, h)| **h == handle)
            .map(|(label, _)| label.clone())
            .collect();
        for label in labels {
            cache.pop(&label);
        }
        Ok(())
    }

    pub fn clear(&self) -> HResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> HResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> HResult<bool> {
        Ok(self.lock()?.is_empty())
    }
}

/// A manager for one slot of the HSM.
///
/// When credentials are given, a login session is opened when the manager is
/// created and kept for its lifetime. The login state is shared by all the
/// sessions the application opens on the slot, so sessions opened later with
/// [`SlotManager::open_session`] are authenticated too. Dropping the manager
/// logs out and closes the login session.
pub struct SlotManager {
    hsm_lib: Arc<HsmLib>,
    slot_id: usize,
    object_handles_cache: Arc<ObjectHandlesCache>,
    hsm_capabilities: HsmCapabilities,
    login_session: Option<Session>,
}

impl SlotManager {
    /// # Errors
    /// Fails if the login session cannot be opened or the login is refused.
    pub fn instantiate(
        hsm_lib: Arc<HsmLib>,
        slot_id: usize,
        credentials: Option<&Credentials>,
        hsm_capabilities: HsmCapabilities,
    ) -> HResult<Self> {
        let object_handles_cache = Arc::new(ObjectHandlesCache::new());
        let login_session = credentials
            .map(|credentials| {
                Self::open_session_(
                    &hsm_lib,
                    slot_id,
                    false,
                    object_handles_cache.clone(),
                    Some(credentials),
                    hsm_capabilities.clone(),
                )
            })
            .transpose()?;
        Ok(Self {
            hsm_lib,
            slot_id,
            object_handles_cache,
            hsm_capabilities,
            login_session,
        })
    }

    #[must_use]
    pub const fn slot_id(&self) -> usize {
        self.slot_id
    }

    /// `true` when this manager holds the login session of the slot
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.login_session.is_some()
    }

    #[must_use]
    pub fn object_handles_cache(&self) -> Arc<ObjectHandlesCache> {
        self.object_handles_cache.clone()
    }

    /// Open a new serial session, read-write if requested.
    ///
    /// The session is closed when dropped.
    ///
    /// # Errors
    /// Fails if `C_OpenSession` fails.
    pub fn open_session(&self, read_write: bool) -> HResult<Session> {
        Self::open_session_(
            &self.hsm_lib,
            self.slot_id,
            read_write,
            self.object_handles_cache.clone(),
            None,
            self.hsm_capabilities.clone(),
        )
    }

    fn open_session_(
        hsm_lib: &Arc<HsmLib>,
        slot_id: usize,
        read_write: bool,
        object_handles_cache: Arc<ObjectHandlesCache>,
        credentials: Option<&Credentials>,
        hsm_capabilities: HsmCapabilities,
    ) -> HResult<Session> {
        let slot_id = CK_SLOT_ID::try_from(slot_id)?;
        let flags: CK_FLAGS = if read_write {
            CKF_RW_SESSION | CKF_SERIAL_SESSION
        } else {
            CKF_SERIAL_SESSION
        };
        let mut session_handle: CK_SESSION_HANDLE = 0;
        hsm_call!(
            hsm_lib,
            format!("Failed opening a session on slot {slot_id}"),
            C_OpenSession,
            slot_id,
            flags,
            ptr::null_mut(),
            None,
            &raw mut session_handle
        );
        // from here on, dropping the session closes it
        let mut session = Session::new(
            hsm_lib.clone(),
            session_handle,
            object_handles_cache,
            false,
            hsm_capabilities,
        );
        if let Some(credentials) = credentials {
            if Self::login(hsm_lib, session_handle, credentials)? {
                session.set_logging_in(true);
            }
        }
        Ok(session)
    }

    /// Log in on `session_handle`; `true` when this call performed the login
    fn login(
        hsm_lib: &HsmLib,
        session_handle: CK_SESSION_HANDLE,
        credentials: &Credentials,
    ) -> HResult<bool> {
        let pin_len = CK_ULONG::try_from(credentials.password.len())?;
        let Some(c_login) = hsm_lib.C_Login else {
            return Err(HError::Default(
                "C_Login not available on library".to_owned(),
            ));
        };
        #[expect(unsafe_code)]
        let rv = unsafe {
            c_login(
                session_handle,
                credentials.user.ck_user_type(),
                credentials.password.as_ptr().cast_mut(),
                pin_len,
            )
        };
        login_outcome(rv, credentials.user)
    }

    /// Mechanisms supported by the token in this slot
    ///
    /// # Errors
    /// Fails if `C_GetMechanismList` fails.
    pub fn get_supported_mechanisms(&self) -> HResult<Vec<CK_MECHANISM_TYPE>> {
        let slot_id = CK_SLOT_ID::try_from(self.slot_id)?;
        let mut count: CK_ULONG = 0;
        hsm_call!(
            self.hsm_lib,
            "Failed to get the mechanism count",
            C_GetMechanismList,
            slot_id,
            ptr::null_mut(),
            &raw mut count
        );
        let mut mechanisms = vec![CK_MECHANISM_TYPE::default(); usize::try_from(count)?];
        hsm_call!(
            self.hsm_lib,
            "Failed to get the mechanism list",
            C_GetMechanismList,
            slot_id,
            mechanisms.as_mut_ptr(),
            &raw mut count
        );
        mechanisms.truncate(usize::try_from(count)?);
        debug!("Slot {} supports {} mechanisms", self.slot_id, mechanisms.len());
        Ok(mechanisms)
    }

    /// # Errors
    /// Fails if the token does not support the mechanism.
    pub fn get_mechanism_info(&self, mechanism: CK_MECHANISM_TYPE) -> HResult<MechanismInfo> {
        let slot_id = CK_SLOT_ID::try_from(self.slot_id)?;
        let mut info = CK_MECHANISM_INFO::default();
        hsm_call!(
            self.hsm_lib,
            format!("Failed to get the info of mechanism 0x{mechanism:08X}"),
            C_GetMechanismInfo,
            slot_id,
            mechanism,
            &raw mut info
        );
        Ok(MechanismInfo::new(mechanism, &info))
    }
}

/// Interpret the return value of `C_Login`.
///
/// An existing login of the application is reused and reported as `false`:
/// the session did not log in, so it must not log out.
fn login_outcome(rv: CK_RV, user: UserType) -> HResult<bool> {
    match rv {
        CKR_OK => {
            info!("Logged in as {user}");
            Ok(true)
        }
        CKR_USER_ALREADY_LOGGED_IN => {
            warn!("{user} already logged in, reusing the existing login");
            Ok(false)
        }
        rv => Err(HError::Pkcs11 {
            context: format!("Failed logging in as {user}"),
            rv,
        }),
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{CKR_OK, CKR_PIN_INCORRECT, CKR_USER_ALREADY_LOGGED_IN};

    use super::{ObjectHandlesCache, SlotSelector, UserType, login_outcome};
    use crate::luna::CKU_CRYPTO_USER;

    #[test]
    fn only_a_fresh_login_is_logged_out() {
        assert!(login_outcome(CKR_OK, UserType::CryptoOfficer).unwrap());
        assert!(!login_outcome(CKR_USER_ALREADY_LOGGED_IN, UserType::CryptoOfficer).unwrap());
        let err = login_outcome(CKR_PIN_INCORRECT, UserType::CryptoUser).unwrap_err();
        assert_eq!(err.rv(), Some(CKR_PIN_INCORRECT));
        assert!(err.to_string().starts_with("Failed logging in as Crypto User"));
    }

    #[test]
    fn slot_selector_parsing() {
        assert_eq!("3".parse::<SlotSelector>().unwrap(), SlotSelector::Id(3));
        assert_eq!(" 12 ".parse::<SlotSelector>().unwrap(), SlotSelector::Id(12));
        assert_eq!(
            "my-partition".parse::<SlotSelector>().unwrap(),
            SlotSelector::Label("my-partition".to_owned())
        );
        assert_eq!(
            "3a".parse::<SlotSelector>().unwrap(),
            SlotSelector::Label("3a".to_owned())
        );
        "".parse::<SlotSelector>().unwrap_err();
    }

    #[test]
    fn crypto_user_code() {
        assert_eq!(UserType::CryptoUser.ck_user_type(), CKU_CRYPTO_USER);
        assert_eq!(UserType::default(), UserType::CryptoOfficer);
    }

    #[test]
    fn cache_invalidation_by_handle() {
        let cache = ObjectHandlesCache::new();
        cache.insert(b"a".to_vec(), 1).unwrap();
        cache.insert(b"b".to_vec(), 2).unwrap();
        cache.insert(b"c".to_vec(), 1).unwrap();
        cache.remove_handle(1).unwrap();
        assert_eq!(cache.get(b"a").unwrap(), None);
        assert_eq!(cache.get(b"c").unwrap(), None);
        assert_eq!(cache.get(b"b").unwrap(), Some(2));
        cache.clear().unwrap();
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn cache_is_bounded() {
        let cache = ObjectHandlesCache::new();
        for i in 0..150_u64 {
            cache.insert(i.to_string().into_bytes(), i).unwrap();
        }
        assert_eq!(cache.len().unwrap(), 100);
        assert_eq!(cache.get(b"0").unwrap(), None);
        assert_eq!(cache.get(b"149").unwrap(), Some(149));
    }
}
