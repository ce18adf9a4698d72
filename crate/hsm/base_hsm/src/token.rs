//! Owned, printable views of `CK_INFO`, `CK_SLOT_INFO` and `CK_TOKEN_INFO`.

use std::{
    ffi::CStr,
    fmt,
    fmt::{Display, Formatter},
};

use cosmian_pkcs11_sys::{
    CK_FLAGS, CK_INFO, CK_SLOT_INFO, CK_TOKEN_INFO, CK_ULONG, CK_VERSION, CKF_HW_SLOT,
    CKF_LOGIN_REQUIRED, CKF_REMOVABLE_DEVICE, CKF_RNG, CKF_TOKEN_INITIALIZED, CKF_TOKEN_PRESENT,
    CKF_USER_PIN_INITIALIZED, CKF_WRITE_PROTECTED,
};
use serde::Serialize;

/// `CK_UNAVAILABLE_INFORMATION`
pub(crate) const UNAVAILABLE_INFORMATION: CK_ULONG = !0;

/// Decode a blank padded (and possibly nul terminated) `PKCS#11` character field
pub(crate) fn padded_to_string(field: &[u8]) -> String {
    let bytes = CStr::from_bytes_until_nul(field).map_or(field, CStr::to_bytes);
    String::from_utf8_lossy(bytes).trim_end().to_owned()
}

#[allow(clippy::useless_conversion)]
fn optional_ulong(value: CK_ULONG) -> Option<u64> {
    (value != UNAVAILABLE_INFORMATION).then(|| u64::from(value))
}

#[allow(clippy::useless_conversion)]
fn flags_to_u64(flags: CK_FLAGS) -> u64 {
    u64::from(flags)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl From<CK_VERSION> for Version {
    fn from(version: CK_VERSION) -> Self {
        Self {
            major: version.major,
            minor: version.minor,
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Info {
    pub cryptoki_version: Version,
    pub manufacturer_id: String,
    pub flags: u64,
    pub library_description: String,
    pub library_version: Version,
}

impl From<CK_INFO> for Info {
    fn from(info: CK_INFO) -> Self {
        Self {
            cryptoki_version: info.cryptokiVersion.into(),
            manufacturer_id: padded_to_string(&info.manufacturerID),
            flags: flags_to_u64(info.flags),
            library_description: padded_to_string(&info.libraryDescription),
            library_version: info.libraryVersion.into(),
        }
    }
}

impl Display for Info {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cryptoki Version: {}\nManufacturer ID: {}\nFlags: {}\nLibrary Description: \
             {}\nLibrary Version: {}",
            self.cryptoki_version,
            self.manufacturer_id,
            self.flags,
            self.library_description,
            self.library_version
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotInfo {
    pub slot_id: usize,
    pub description: String,
    pub manufacturer_id: String,
    pub token_present: bool,
    pub removable_device: bool,
    pub hardware_slot: bool,
    pub hardware_version: Version,
    pub firmware_version: Version,
}

impl SlotInfo {
    pub(crate) fn new(slot_id: usize, info: &CK_SLOT_INFO) -> Self {
        Self {
            slot_id,
            description: padded_to_string(&info.slotDescription),
            manufacturer_id: padded_to_string(&info.manufacturerID),
            token_present: info.flags & CKF_TOKEN_PRESENT != 0,
            removable_device: info.flags & CKF_REMOVABLE_DEVICE != 0,
            hardware_slot: info.flags & CKF_HW_SLOT != 0,
            hardware_version: info.hardwareVersion.into(),
            firmware_version: info.firmwareVersion.into(),
        }
    }
}

impl Display for SlotInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Slot #{} : {} ({}), token present: {}",
            self.slot_id, self.description, self.manufacturer_id, self.token_present
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub slot_id: usize,
    pub label: String,
    pub manufacturer_id: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: Version,
    pub hardware_version: Version,
    pub total_public_memory: Option<u64>,
    pub free_public_memory: Option<u64>,
    pub total_private_memory: Option<u64>,
    pub free_private_memory: Option<u64>,
    pub token_initialized: bool,
    pub login_required: bool,
    pub user_pin_initialized: bool,
    pub rng: bool,
    pub write_protected: bool,
}

impl TokenInfo {
    pub(crate) fn new(slot_id: usize, info: &CK_TOKEN_INFO) -> Self {
        Self {
            slot_id,
            label: padded_to_string(&info.label),
            manufacturer_id: padded_to_string(&info.manufacturerID),
            model: padded_to_string(&info.model),
            serial_number: padded_to_string(&info.serialNumber),
            firmware_version: info.firmwareVersion.into(),
            hardware_version: info.hardwareVersion.into(),
            total_public_memory: optional_ulong(info.ulTotalPublicMemory),
            free_public_memory: optional_ulong(info.ulFreePublicMemory),
            total_private_memory: optional_ulong(info.ulTotalPrivateMemory),
            free_private_memory: optional_ulong(info.ulFreePrivateMemory),
            token_initialized: info.flags & CKF_TOKEN_INITIALIZED != 0,
            login_required: info.flags & CKF_LOGIN_REQUIRED != 0,
            user_pin_initialized: info.flags & CKF_USER_PIN_INITIALIZED != 0,
            rng: info.flags & CKF_RNG != 0,
            write_protected: info.flags & CKF_WRITE_PROTECTED != 0,
        }
    }
}

fn memory(value: Option<u64>) -> String {
    value.map_or_else(|| "unavailable".to_owned(), |v| v.to_string())
}

impl Display for TokenInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "[ SLOT : {} ]", self.slot_id)?;
        writeln!(f, "  - Label        : {}", self.label)?;
        writeln!(f, "  - Manufacturer : {}", self.manufacturer_id)?;
        writeln!(f, "  - Model        : {}", self.model)?;
        writeln!(f, "  - Serial       : {}", self.serial_number)?;
        writeln!(f, "  - Firmware     : {}", self.firmware_version)?;
        writeln!(f, "  - Total Memory : {}", memory(self.total_public_memory))?;
        write!(f, "  - Free Memory  : {}", memory(self.free_public_memory))
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{CK_TOKEN_INFO, CKF_RNG, CKF_TOKEN_INITIALIZED};

    use super::{TokenInfo, UNAVAILABLE_INFORMATION, padded_to_string};

    fn padded<const N: usize>(s: &str) -> [u8; N] {
        let mut field = [b' '; N];
        field[..s.len()].copy_from_slice(s.as_bytes());
        field
    }

    #[test]
    fn blank_padded_fields_are_trimmed() {
        assert_eq!(padded_to_string(&padded::<32>("partition-1")), "partition-1");
        assert_eq!(padded_to_string(b"abc\0   garbage"), "abc");
        assert_eq!(padded_to_string(&[b' '; 16]), "");
    }

    #[test]
    fn token_info_conversion() {
        let mut raw = CK_TOKEN_INFO::default();
        raw.label = padded::<32>("my token");
        raw.model = padded::<16>("Luna K7");
        raw.serialNumber = padded::<16>("1234567");
        raw.flags = CKF_RNG | CKF_TOKEN_INITIALIZED;
        raw.ulTotalPublicMemory = 1024;
        raw.ulFreePublicMemory = UNAVAILABLE_INFORMATION;
        raw.firmwareVersion.major = 7;
        raw.firmwareVersion.minor = 8;

        let info = TokenInfo::new(3, &raw);
        assert_eq!(info.label, "my token");
        assert_eq!(info.model, "Luna K7");
        assert!(info.rng);
        assert!(info.token_initialized);
        assert!(!info.write_protected);
        assert_eq!(info.total_public_memory, Some(1024));
        assert_eq!(info.free_public_memory, None);

        let text = info.to_string();
        assert!(text.contains("  - Firmware     : 7.8"));
        assert!(text.contains("  - Free Memory  : unavailable"));
    }
}
