//! A pool of `PKCS#11` sessions shared by worker threads.
//!
//! Sessions are opened on a [`SlotManager`], whose login session keeps every
//! session of the application authenticated. Operations run through
//! [`SessionPool::with_session`] are retried with exponential backoff when they
//! fail with an error the HSM may recover from.

use std::{sync::Arc, time::Duration};

use backoff::ExponentialBackoff;
use cosmian_pkcs11_sys::{
    CKR_DEVICE_ERROR, CKR_DEVICE_MEMORY, CKR_DEVICE_REMOVED, CKR_FUNCTION_FAILED,
    CKR_GENERAL_ERROR, CKR_HOST_MEMORY, CKR_SESSION_CLOSED, CKR_SESSION_HANDLE_INVALID,
    CKR_SLOT_ID_INVALID, CKR_TOKEN_NOT_PRESENT,
};
use serde::Serialize;
use tracing::{error, trace, warn};

use crate::{HError, HResult, Session, SlotManager};

/// Opens and validates the sessions of a [`SessionPool`]
pub struct SessionManager {
    slot: Arc<SlotManager>,
    read_write: bool,
}

impl r2d2::ManageConnection for SessionManager {
    type Connection = Session;
    type Error = HError;

    fn connect(&self) -> Result<Session, HError> {
        trace!("Opening a pooled session on slot {}", self.slot.slot_id());
        self.slot.open_session(self.read_write)
    }

    fn is_valid(&self, session: &mut Session) -> Result<(), HError> {
        session.get_session_info().map(|_| ())
    }

    fn has_broken(&self, _session: &mut Session) -> bool {
        false
    }
}

pub type PooledSession = r2d2::PooledConnection<SessionManager>;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_sessions: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub read_write: bool,
    /// Check sessions with `C_GetSessionInfo` when they leave the pool
    pub test_on_check_out: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: u32::try_from(num_cpus::get()).unwrap_or(u32::MAX),
            min_idle: 1,
            connection_timeout: Duration::from_secs(30),
            read_write: true,
            test_on_check_out: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            multiplier: 1.5,
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(self.max_elapsed_time),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolState {
    pub connections: u32,
    pub idle_connections: u32,
}

#[derive(Clone)]
pub struct SessionPool {
    pool: r2d2::Pool<SessionManager>,
    retry: RetryConfig,
}

impl SessionPool {
    /// # Errors
    /// Fails if the pool cannot open its initial sessions within the
    /// connection timeout.
    pub fn new(
        slot: Arc<SlotManager>,
        config: &PoolConfig,
        retry: RetryConfig,
    ) -> HResult<Self> {
        let manager = SessionManager {
            slot,
            read_write: config.read_write,
        };
        let pool = r2d2::Pool::builder()
            .max_size(config.max_sessions.max(1))
            .min_idle(Some(config.min_idle.min(config.max_sessions.max(1))))
            .connection_timeout(config.connection_timeout)
            .test_on_check_out(config.test_on_check_out)
            .build(manager)?;
        Ok(Self { pool, retry })
    }

    /// Borrow a session; it returns to the pool when dropped
    ///
    /// # Errors
    /// Fails if no session becomes available within the connection timeout.
    pub fn get(&self) -> HResult<PooledSession> {
        Ok(self.pool.get()?)
    }

    #[must_use]
    pub fn state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Run `operation` with a pooled session.
    ///
    /// Transient failures (see [`is_transient`]) are retried with a fresh
    /// session until the retry budget is exhausted; other errors are
    /// returned at once.
    ///
    /// # Errors
    /// The last error of `operation`, or a pool error.
    pub fn with_session<T, F>(&self, desc: &str, mut operation: F) -> HResult<T>
    where
        F: FnMut(&Session) -> HResult<T>,
    {
        let notify = |err: HError, next: Duration| {
            warn!(
                "{desc} failed, retrying in {} ms: {err}",
                next.as_millis()
            );
        };
        let op = || {
            let session = self.get().map_err(retry_on_transient_error)?;
            operation(&*session).map_err(retry_on_transient_error)
        };
        backoff::retry_notify(self.retry.backoff_policy(), op, notify).map_err(|err| {
            let err = match err {
                backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
            };
            error!("{desc} failed: {err}");
            err
        })
    }
}

fn retry_on_transient_error(err: HError) -> backoff::Error<HError> {
    if is_transient(&err) {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

/// `true` for failures that may succeed when retried shortly after: device
/// and memory errors, lost sessions and pool timeouts
#[must_use]
pub const fn is_transient(err: &HError) -> bool {
    match err {
        HError::Pkcs11 { rv, .. } => matches!(
            *rv,
            CKR_HOST_MEMORY
                | CKR_SLOT_ID_INVALID
                | CKR_GENERAL_ERROR
                | CKR_FUNCTION_FAILED
                | CKR_DEVICE_ERROR
                | CKR_DEVICE_MEMORY
                | CKR_DEVICE_REMOVED
                | CKR_SESSION_HANDLE_INVALID
                | CKR_SESSION_CLOSED
                | CKR_TOKEN_NOT_PRESENT
        ),
        HError::Pool(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cosmian_pkcs11_sys::{
        CK_RV, CKR_DEVICE_ERROR, CKR_PIN_INCORRECT, CKR_SESSION_HANDLE_INVALID,
    };

    use super::{PoolConfig, RetryConfig, is_transient, retry_on_transient_error};
    use crate::{HError, luna::CKR_KEY_NOT_ACTIVE};

    fn pkcs11(rv: CK_RV) -> HError {
        HError::Pkcs11 {
            context: "test".to_owned(),
            rv,
        }
    }

    #[test]
    fn transient_errors() {
        assert!(is_transient(&pkcs11(CKR_DEVICE_ERROR)));
        assert!(is_transient(&pkcs11(CKR_SESSION_HANDLE_INVALID)));
        assert!(!is_transient(&pkcs11(CKR_PIN_INCORRECT)));
        assert!(!is_transient(&pkcs11(CKR_KEY_NOT_ACTIVE)));
        assert!(!is_transient(&HError::Default("bad input".to_owned())));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        assert!(matches!(
            retry_on_transient_error(pkcs11(CKR_PIN_INCORRECT)),
            backoff::Error::Permanent(_)
        ));
        assert!(matches!(
            retry_on_transient_error(pkcs11(CKR_DEVICE_ERROR)),
            backoff::Error::Transient { .. }
        ));
    }

    #[test]
    fn default_configs() {
        let pool = PoolConfig::default();
        assert!(pool.max_sessions >= 1);
        assert_eq!(pool.min_idle, 1);
        assert_eq!(pool.connection_timeout, Duration::from_secs(30));
        assert!(pool.read_write);
        let retry = RetryConfig::default();
        assert_eq!(retry.initial_interval, Duration::from_secs(2));
        let policy = retry.backoff_policy();
        assert_eq!(policy.max_elapsed_time, Some(Duration::from_secs(30)));
        assert!((policy.multiplier - 1.5).abs() < f64::EPSILON);
    }
}
