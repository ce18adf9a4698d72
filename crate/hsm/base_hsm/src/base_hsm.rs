use std::{
    collections::HashMap,
    ffi::OsStr,
    marker::PhantomData,
    ptr,
    sync::{Arc, Mutex, MutexGuard},
};

use cosmian_pkcs11_sys::{CK_FALSE, CK_INFO, CK_SLOT_ID, CK_SLOT_INFO, CK_TOKEN_INFO, CK_TRUE, CK_ULONG};
use tracing::{debug, info, warn};

use crate::{
    HError, HResult, SlotManager, hsm_bail, hsm_call, hsm_ensure,
    hsm_capabilities::{HsmCapabilities, HsmProvider},
    hsm_lib::HsmLib,
    pool::{PoolConfig, RetryConfig, SessionPool},
    slots::{Credentials, SlotSelector},
    token::{Info, SlotInfo, TokenInfo},
};

pub struct DefaultCapabilityProvider;
impl HsmProvider for DefaultCapabilityProvider {
    fn capabilities() -> HsmCapabilities {
        HsmCapabilities::default()
    }
}

struct SlotState {
    credentials: Option<Credentials>,
    slot: Option<Arc<SlotManager>>,
}

/// A loaded `PKCS#11` library and the slots the application works with.
///
/// Slots are opened lazily by [`BaseHsm::get_slot`] and logged in with the
/// credentials registered at instantiation, if any. The capability provider
/// `P` supplies the vendor specific behaviour of the library.
pub struct BaseHsm<P: HsmProvider = DefaultCapabilityProvider> {
    pub(crate) hsm_lib: Arc<HsmLib>,
    slots: Mutex<HashMap<usize, SlotState>>,
    _provider: PhantomData<P>,
}

impl<P: HsmProvider> BaseHsm<P> {
    /// Load and initialize the library at `path`.
    ///
    /// `credentials` maps the slots that should be logged in to the credentials
    /// to use. Slots mapped to `None`, or absent from the map, are opened
    /// without logging in.
    ///
    /// # Errors
    /// Fails if the library cannot be loaded or initialized.
    pub fn instantiate<Pth: AsRef<OsStr>>(
        path: Pth,
        credentials: HashMap<usize, Option<Credentials>>,
    ) -> HResult<Self> {
        debug!("Using PKCS#11 library with {:?}", P::capabilities());
        let hsm_lib = Arc::new(HsmLib::instantiate(path)?);
        let slots = credentials
            .into_iter()
            .map(|(slot_id, credentials)| {
                (
                    slot_id,
                    SlotState {
                        credentials,
                        slot: None,
                    },
                )
            })
            .collect();
        Ok(Self {
            hsm_lib,
            slots: Mutex::new(slots),
            _provider: PhantomData,
        })
    }

    fn lock_slots(&self) -> HResult<MutexGuard<'_, HashMap<usize, SlotState>>> {
        self.slots
            .lock()
            .map_err(|_| HError::Default("Failed to acquire lock on slots".to_owned()))
    }

    #[must_use]
    pub fn capabilities(&self) -> HsmCapabilities {
        P::capabilities()
    }

    /// Get a slot
    /// If a slot has already been opened, returns the opened slot.
    /// To close a slot before re-opening it with other credentials, call `close_slot()` first
    ///
    /// # Errors
    /// Fails if the login session cannot be opened or the login is refused.
    pub fn get_slot(&self, slot_id: usize) -> HResult<Arc<SlotManager>> {
        let mut slots = self.lock_slots()?;
        let slot_state = slots.entry(slot_id).or_insert_with(|| SlotState {
            credentials: None,
            slot: None,
        });
        if let Some(slot) = &slot_state.slot {
            return Ok(slot.clone());
        }
        let manager = Arc::new(SlotManager::instantiate(
            self.hsm_lib.clone(),
            slot_id,
            slot_state.credentials.as_ref(),
            P::capabilities(),
        )?);
        slot_state.slot = Some(manager.clone());
        Ok(manager)
    }

    /// Register (or replace) the credentials of a slot.
    ///
    /// An already opened slot keeps its login until it is closed.
    ///
    /// # Errors
    /// Fails if the slot table lock is poisoned.
    pub fn set_credentials(&self, slot_id: usize, credentials: Option<Credentials>) -> HResult<()> {
        let mut slots = self.lock_slots()?;
        slots
            .entry(slot_id)
            .and_modify(|state| state.credentials.clone_from(&credentials))
            .or_insert(SlotState {
                credentials,
                slot: None,
            });
        Ok(())
    }

    /// Forget the slot manager of `slot_id`; the login session is closed once
    /// the last session pool or caller holding it drops it
    ///
    /// # Errors
    /// Fails if the slot table lock is poisoned.
    pub fn close_slot(&self, slot_id: usize) -> HResult<()> {
        let mut slots = self.lock_slots()?;
        if let Some(state) = slots.get_mut(&slot_id) {
            state.slot = None;
        }
        Ok(())
    }

    /// # Errors
    /// Fails if `C_GetInfo` fails.
    pub fn get_info(&self) -> HResult<Info> {
        let mut info = CK_INFO::default();
        hsm_call!(
            self.hsm_lib,
            "Failed getting HSM info",
            C_GetInfo,
            &raw mut info
        );
        Ok(info.into())
    }

    /// Identifiers of the slots, restricted to the slots holding a token if requested
    ///
    /// # Errors
    /// Fails if `C_GetSlotList` fails.
    pub fn get_available_slot_list(&self, token_present: bool) -> HResult<Vec<usize>> {
        let token_present = if token_present { CK_TRUE } else { CK_FALSE };
        let mut count: CK_ULONG = 0;
        hsm_call!(
            self.hsm_lib,
            "Failed to get the slot count",
            C_GetSlotList,
            token_present,
            ptr::null_mut(),
            &raw mut count
        );
        let mut slot_ids = vec![CK_SLOT_ID::default(); usize::try_from(count)?];
        hsm_call!(
            self.hsm_lib,
            "Failed to get the slot list",
            C_GetSlotList,
            token_present,
            slot_ids.as_mut_ptr(),
            &raw mut count
        );
        slot_ids.truncate(usize::try_from(count)?);
        slot_ids
            .into_iter()
            .map(|id| usize::try_from(id).map_err(HError::from))
            .collect()
    }

    /// # Errors
    /// Fails if the slot does not exist.
    pub fn get_slot_info(&self, slot_id: usize) -> HResult<SlotInfo> {
        let mut info = CK_SLOT_INFO::default();
        hsm_call!(
            self.hsm_lib,
            format!("Failed to get the info of slot {slot_id}"),
            C_GetSlotInfo,
            CK_SLOT_ID::try_from(slot_id)?,
            &raw mut info
        );
        Ok(SlotInfo::new(slot_id, &info))
    }

    /// # Errors
    /// Fails if the slot does not exist or holds no token.
    pub fn get_token_info(&self, slot_id: usize) -> HResult<TokenInfo> {
        let mut info = CK_TOKEN_INFO::default();
        hsm_call!(
            self.hsm_lib,
            format!("Failed to get the token info of slot {slot_id}"),
            C_GetTokenInfo,
            CK_SLOT_ID::try_from(slot_id)?,
            &raw mut info
        );
        Ok(TokenInfo::new(slot_id, &info))
    }

    /// Resolve a slot selector to the id of a slot holding a token.
    ///
    /// A numeric selector must name a slot with a token present; a label
    /// selector is matched against the labels of the tokens present. Slots
    /// whose token information cannot be read are skipped.
    ///
    /// # Errors
    /// Fails if the slot holds no token or no present token carries the label.
    pub fn find_slot(&self, selector: &SlotSelector) -> HResult<usize> {
        let present = self.get_available_slot_list(true)?;
        match selector {
            SlotSelector::Id(slot_id) => present_slot(*slot_id, &present),
            SlotSelector::Label(label) => {
                let labels = present
                    .into_iter()
                    .map(|slot_id| (slot_id, self.get_token_info(slot_id).map(|t| t.label)));
                let Some(slot_id) = first_slot_labelled(label, labels) else {
                    hsm_bail!("slot '{label}' not found")
                };
                debug!("Token '{label}' found in slot {slot_id}");
                Ok(slot_id)
            }
        }
    }

    /// A pool of sessions on `slot_id`, logged in with the slot credentials
    ///
    /// # Errors
    /// Fails if the slot cannot be opened or the pool cannot create its first
    /// sessions.
    pub fn session_pool(
        &self,
        slot_id: usize,
        pool_config: &PoolConfig,
        retry_config: RetryConfig,
    ) -> HResult<SessionPool> {
        let slot = self.get_slot(slot_id)?;
        info!(
            "Creating a pool of at most {} sessions on slot {slot_id}",
            pool_config.max_sessions
        );
        SessionPool::new(slot, pool_config, retry_config)
    }
}

/// `slot_id` when it is one of the slots holding a token
fn present_slot(slot_id: usize, present: &[usize]) -> HResult<usize> {
    hsm_ensure!(
        present.contains(&slot_id),
        "slot {} not present: no token in it (slots with a token: {:?})",
        slot_id,
        present
    );
    Ok(slot_id)
}

/// The first slot whose token carries `label`; slots whose token label
/// cannot be read are skipped
fn first_slot_labelled(
    label: &str,
    labels: impl IntoIterator<Item = (usize, HResult<String>)>,
) -> Option<usize> {
    labels
        .into_iter()
        .find_map(|(slot_id, token_label)| match token_label {
            Ok(token_label) => (token_label == label).then_some(slot_id),
            Err(e) => {
                warn!("Skipping slot {slot_id}: {e}");
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::CKR_TOKEN_NOT_PRESENT;

    use super::{first_slot_labelled, present_slot};
    use crate::HError;

    #[test]
    fn unreadable_slots_do_not_stop_the_label_scan() {
        let labels = || {
            vec![
                (0, Ok("backup".to_owned())),
                (
                    1,
                    Err(HError::Pkcs11 {
                        context: "Failed to get the token info of slot 1".to_owned(),
                        rv: CKR_TOKEN_NOT_PRESENT,
                    }),
                ),
                (2, Ok("partition".to_owned())),
            ]
        };
        assert_eq!(first_slot_labelled("partition", labels()), Some(2));
        assert_eq!(first_slot_labelled("backup", labels()), Some(0));
        assert_eq!(first_slot_labelled("other", labels()), None);
    }

    #[test]
    fn slot_id_must_hold_a_token() {
        assert_eq!(present_slot(1, &[0, 1, 3]).unwrap(), 1);

        let err = present_slot(99, &[0, 1, 3]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "slot 99 not present: no token in it (slots with a token: [0, 1, 3])"
        );
        assert!(!crate::is_transient(&err));

        present_slot(0, &[]).unwrap_err();
    }
}
