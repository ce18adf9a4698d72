use p11_base_hsm::{
    BaseHsm,
    hsm_capabilities::{HsmCapabilities, HsmProvider},
    luna::{CKM_AES_KW, CKM_AES_KWP},
};

/// Path to the Luna client `PKCS#11` shared library
#[cfg(not(target_os = "windows"))]
pub const LUNA_PKCS11_LIB: &str = "/usr/safenet/lunaclient/lib/libCryptoki2_64.so";
#[cfg(target_os = "windows")]
pub const LUNA_PKCS11_LIB: &str = r"C:\Program Files\SafeNet\LunaClient\cryptoki.dll";

pub struct LunaCapabilityProvider;

impl HsmProvider for LunaCapabilityProvider {
    fn capabilities() -> HsmCapabilities {
        HsmCapabilities {
            aes_key_wrap: CKM_AES_KW,
            aes_key_wrap_pad: CKM_AES_KWP,
            pbkdf2_password_len_by_value: true,
            ..HsmCapabilities::default()
        }
    }
}

pub type Luna = BaseHsm<LunaCapabilityProvider>;

#[cfg(test)]
mod capability_tests {
    use p11_base_hsm::{Mechanism, luna::CKM_AES_KWP};

    use super::{HsmProvider, LunaCapabilityProvider};

    #[test]
    fn luna_key_wrap_codes() {
        let caps = LunaCapabilityProvider::capabilities();
        assert_eq!(Mechanism::AesKeyWrapPad.mechanism_type(&caps), CKM_AES_KWP);
        assert!(caps.pbkdf2_password_len_by_value);
        assert_eq!(caps.find_max_object_count, 100);
    }
}

#[cfg(test)]
#[cfg(feature = "luna")]
mod tests;
