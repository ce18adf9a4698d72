use cosmian_pkcs11_sys::{CK_MECHANISM_TYPE, CK_ULONG, CKM_AES_KEY_WRAP, CKM_AES_KEY_WRAP_PAD};

/// Vendor specific behaviour of a `PKCS#11` library
#[derive(Debug, Clone)]
pub struct HsmCapabilities {
    /// Size of the handle buffer passed to each `C_FindObjects` call
    pub find_max_object_count: CK_ULONG,
    /// Mechanism implementing RFC 3394 key wrap
    pub aes_key_wrap: CK_MECHANISM_TYPE,
    /// Mechanism implementing RFC 5649 key wrap with padding
    pub aes_key_wrap_pad: CK_MECHANISM_TYPE,
    /// Luna reads the `PKCS#5` PBKDF2 password length from the `ulPasswordLen`
    /// pointer field itself rather than dereferencing it
    pub pbkdf2_password_len_by_value: bool,
}

impl Default for HsmCapabilities {
    fn default() -> Self {
        Self {
            find_max_object_count: 100,
            aes_key_wrap: CKM_AES_KEY_WRAP,
            aes_key_wrap_pad: CKM_AES_KEY_WRAP_PAD,
            pbkdf2_password_len_by_value: false,
        }
    }
}

pub trait HsmProvider: Send + Sync + 'static {
    fn capabilities() -> HsmCapabilities;
}
