use std::{collections::HashMap, path::PathBuf, sync::Arc};

use luna_pkcs11_loader::{LUNA_PKCS11_LIB, Luna};
use p11_base_hsm::{
    Credentials, PoolConfig, RetryConfig, Session, SessionPool, SlotManager, SlotSelector,
    UserType,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    actions::console::{OutputFormat, Stdout},
    config::P11Conf,
    error::{
        CliError,
        result::{CliResult, CliResultHelper},
    },
};

pub mod console;
pub mod derive;
pub mod encrypt;
pub mod info;
pub mod luna;
pub mod mechanisms;
pub mod multi_thread_sign;
pub mod objects;
pub mod random;
pub mod sign;
pub mod slots;
pub mod usage_limit;
pub mod wrap;

pub const PLAINTEXT: &str = "Earth is the third planet of our Solar System.";
pub const SIGN_MESSAGE: &str = "Hello World, I've been waiting for the chance to see your face.";
pub const AES_CBC_IV: [u8; 16] = *b"1234567812345678";

/// Global options shared by every command
pub struct GlobalOptions {
    pub library: Option<PathBuf>,
    pub slot: Option<SlotSelector>,
    pub password: Option<Zeroizing<String>>,
    pub user: Option<UserType>,
    pub format: OutputFormat,
}

/// The loaded library and the slot the commands work on
pub struct P11Context {
    hsm: Luna,
    slot_id: usize,
    user: UserType,
    logged_in: bool,
    format: OutputFormat,
    pool_config: PoolConfig,
    retry_config: RetryConfig,
}

impl P11Context {
    /// Load the library and resolve the slot.
    ///
    /// Command line values win over the configuration file, which wins over
    /// the defaults: the Luna client library and slot 0.
    ///
    /// # Errors
    /// Fails if the library cannot be loaded or the slot label is unknown.
    pub fn new(options: GlobalOptions, conf: &P11Conf) -> CliResult<Self> {
        let library = options
            .library
            .or_else(|| conf.library_path.clone())
            .unwrap_or_else(|| PathBuf::from(LUNA_PKCS11_LIB));
        debug!("Loading the PKCS#11 library {}", library.display());
        let hsm = Luna::instantiate(&library, HashMap::new()).with_context(|| {
            format!(
                "failed loading the PKCS#11 library {} (set P11_LIB or --lib)",
                library.display()
            )
        })?;

        let selector = match options.slot {
            Some(selector) => selector,
            None => conf
                .slot
                .as_deref()
                .map(str::parse::<SlotSelector>)
                .transpose()?
                .unwrap_or(SlotSelector::Id(0)),
        };
        let slot_id = hsm.find_slot(&selector)?;
        let user = options
            .user
            .or_else(|| conf.user.map(Into::into))
            .unwrap_or_default();
        let logged_in = options.password.is_some();
        if let Some(password) = options.password {
            hsm.set_credentials(slot_id, Some(Credentials::new(password.as_str(), user)))?;
        }
        debug!("Working on slot {slot_id} (selected by '{selector}'), logged in: {logged_in}");

        Ok(Self {
            hsm,
            slot_id,
            user,
            logged_in,
            format: options.format,
            pool_config: conf.pool_config()?,
            retry_config: conf.retry_config()?,
        })
    }

    #[must_use]
    pub const fn hsm(&self) -> &Luna {
        &self.hsm
    }

    #[must_use]
    pub const fn slot_id(&self) -> usize {
        self.slot_id
    }

    #[must_use]
    pub const fn user(&self) -> UserType {
        self.user
    }

    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// The slot manager, logged in if a password was given
    ///
    /// # Errors
    /// Fails if the login is refused.
    pub fn slot(&self) -> CliResult<Arc<SlotManager>> {
        Ok(self.hsm.get_slot(self.slot_id)?)
    }

    /// A read-write session on the slot
    ///
    /// # Errors
    /// Fails if the slot cannot be opened.
    pub fn session(&self) -> CliResult<Session> {
        Ok(self.slot()?.open_session(true)?)
    }

    /// # Errors
    /// Fails if the pool cannot open its first sessions.
    pub fn session_pool(&self) -> CliResult<SessionPool> {
        Ok(self.hsm.session_pool(
            self.slot_id,
            &self.pool_config,
            self.retry_config.clone(),
        )?)
    }

    /// # Errors
    /// Fails if the output cannot be rendered.
    pub fn write(&self, stdout: &Stdout) -> CliResult<()> {
        stdout.write(self.format)
    }
}

/// Fail unless the decrypted or unwrapped data matches the original
pub(crate) fn check_round_trip(what: &str, original: &[u8], recovered: &[u8]) -> CliResult<()> {
    if original == recovered {
        Ok(())
    } else {
        Err(CliError::Mismatch(what.to_owned()))
    }
}

/// Decode a hexadecimal command line value, spaces allowed
pub(crate) fn parse_hex(value: &str) -> CliResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{check_round_trip, parse_hex};

    #[test]
    fn hex_values() {
        assert_eq!(
            parse_hex("10 aa 32 56 a1 87 F1 63").unwrap(),
            vec![0x10, 0xAA, 0x32, 0x56, 0xA1, 0x87, 0xF1, 0x63]
        );
        parse_hex("0g").unwrap_err();
    }

    #[test]
    fn round_trip_mismatch() {
        check_round_trip("Decrypted data", b"abc", b"abc").unwrap();
        let err = check_round_trip("Decrypted data", b"abc", b"abd").unwrap_err();
        assert_eq!(err.to_string(), "Decrypted data did not match the original data");
    }
}
