//! `PKCS#11` session and key lifecycle layer.
//!
//! A vendor library is loaded at run time by [`BaseHsm`], slots are logged in
//! by a [`SlotManager`] and every cryptographic operation runs on a
//! [`Session`]. Luna specific mechanisms and `CA_*` extensions live in [`luna`].

#![allow(non_snake_case)]
#![allow(clippy::missing_safety_doc)]

mod error;

pub use base_hsm::{BaseHsm, DefaultCapabilityProvider};
pub use error::{HError, HResult, rv_name};
pub use hsm_capabilities::{HsmCapabilities, HsmProvider};
pub use pool::{PoolConfig, PoolState, PooledSession, RetryConfig, SessionPool, is_transient};
pub use session::{
    AES_BLOCK_SIZE, AesKeySize, AesKeySpec, AttributeValue, AttributeValues, CkTemplate,
    DES3_IV_SIZE, EcCurve, EcKdf, EcKeyPairSpec, HashAlgorithm, ImportedKey, Mechanism,
    ObjectFilter, RSA_PUBLIC_EXPONENT, RsaKeyPairSpec, RsaKeySize, Session, SessionInfo, Template,
    des3_key_template, unwrapped_secret_key_template,
};
pub use slots::{Credentials, ObjectHandlesCache, SlotManager, SlotSelector, UserType};
pub use token::{Info, SlotInfo, TokenInfo, Version};

mod base_hsm;
pub mod hsm_capabilities;
mod hsm_lib;
pub mod luna;
pub mod mechanisms;
mod pool;
mod session;
mod slots;
mod token;

pub mod test_helpers;
pub mod tests_shared;

pub mod reexport {
    pub use cosmian_pkcs11_sys;
}
