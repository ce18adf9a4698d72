mod aes;
mod derive;
mod des3;
mod ec;
mod mechanism;
mod rsa;
mod session_impl;
mod template;
mod wrap;

pub use aes::{AesKeySize, AesKeySpec};
pub use des3::des3_key_template;
pub use ec::{EcCurve, EcKeyPairSpec};
pub use mechanism::{AES_BLOCK_SIZE, DES3_IV_SIZE, EcKdf, HashAlgorithm, Mechanism};
pub use rsa::{RSA_PUBLIC_EXPONENT, RsaKeyPairSpec, RsaKeySize};
pub use session_impl::{ObjectFilter, Session, SessionInfo};
pub use template::{AttributeValue, AttributeValues, CkTemplate, Template};
pub use wrap::{ImportedKey, unwrapped_secret_key_template};
