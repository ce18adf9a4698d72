use p11_base_hsm::{BaseHsm, DefaultCapabilityProvider};

/// Path to the SoftHSM2 `PKCS#11` shared library
pub const SOFTHSM2_PKCS11_LIB: &str = "/usr/lib/softhsm/libsofthsm2.so";

/// The softhsm2 only uses standard mechanisms
pub type SofthsmCapabilityProvider = DefaultCapabilityProvider;

pub type Softhsm2 = BaseHsm<SofthsmCapabilityProvider>;

#[cfg(test)]
#[cfg(feature = "softhsm2")]
mod tests;
