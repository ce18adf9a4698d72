//! Mechanism names, codes and capability flags.
//!
//! The table covers the standard mechanisms a Luna partition reports plus the
//! Luna vendor codes. Codes that are not in the table are still usable, they
//! just render as hexadecimal.

use std::{
    fmt,
    fmt::{Display, Formatter},
};

use cosmian_pkcs11_sys::{
    CK_MECHANISM_INFO, CK_MECHANISM_TYPE, CKF_DECRYPT, CKF_DERIVE, CKF_DIGEST, CKF_ENCRYPT,
    CKF_GENERATE, CKF_GENERATE_KEY_PAIR, CKF_HW, CKF_SIGN, CKF_SIGN_RECOVER, CKF_UNWRAP,
    CKF_VERIFY, CKF_VERIFY_RECOVER, CKF_WRAP,
};
use serde::Serialize;

use crate::{HResult, hsm_bail};

const MECHANISMS: &[(CK_MECHANISM_TYPE, &str)] = &[
    (0x0000_0000, "CKM_RSA_PKCS_KEY_PAIR_GEN"),
    (0x0000_000a, "CKM_RSA_X9_31_KEY_PAIR_GEN"),
    (0x0000_0001, "CKM_RSA_PKCS"),
    (0x0000_0003, "CKM_RSA_X_509"),
    (0x0000_0006, "CKM_SHA1_RSA_PKCS"),
    (0x0000_0009, "CKM_RSA_PKCS_OAEP"),
    (0x8000_0142, "CKM_RSA_FIPS_186_3_AUX_PRIME_KEY_PAIR_GEN"),
    (0x8000_0143, "CKM_RSA_FIPS_186_3_PRIME_KEY_PAIR_GEN"),
    (0x0000_000b, "CKM_RSA_X9_31"),
    (0x0000_000c, "CKM_SHA1_RSA_X9_31"),
    (0x8000_0135, "CKM_SHA224_RSA_X9_31"),
    (0x8000_0136, "CKM_SHA256_RSA_X9_31"),
    (0x8000_0137, "CKM_SHA384_RSA_X9_31"),
    (0x8000_0138, "CKM_SHA512_RSA_X9_31"),
    (0x0000_000d, "CKM_RSA_PKCS_PSS"),
    (0x0000_000e, "CKM_SHA1_RSA_PKCS_PSS"),
    (0x0000_0010, "CKM_DSA_KEY_PAIR_GEN"),
    (0x0000_0011, "CKM_DSA"),
    (0x0000_0012, "CKM_DSA_SHA1"),
    (0x0000_0013, "CKM_DSA_SHA224"),
    (0x0000_0014, "CKM_DSA_SHA256"),
    (0x0000_0018, "CKM_DSA_SHA3_224"),
    (0x0000_0019, "CKM_DSA_SHA3_256"),
    (0x0000_001a, "CKM_DSA_SHA3_384"),
    (0x0000_001b, "CKM_DSA_SHA3_512"),
    (0x0000_0030, "CKM_X9_42_DH_KEY_PAIR_GEN"),
    (0x0000_0031, "CKM_X9_42_DH_DERIVE"),
    (0x0000_0032, "CKM_X9_42_DH_HYBRID_DERIVE"),
    (0x0000_0046, "CKM_SHA224_RSA_PKCS"),
    (0x0000_0047, "CKM_SHA224_RSA_PKCS_PSS"),
    (0x0000_0040, "CKM_SHA256_RSA_PKCS"),
    (0x0000_0043, "CKM_SHA256_RSA_PKCS_PSS"),
    (0x0000_0041, "CKM_SHA384_RSA_PKCS"),
    (0x0000_0044, "CKM_SHA384_RSA_PKCS_PSS"),
    (0x0000_0042, "CKM_SHA512_RSA_PKCS"),
    (0x0000_0045, "CKM_SHA512_RSA_PKCS_PSS"),
    (0x0000_0066, "CKM_SHA3_224_RSA_PKCS"),
    (0x0000_0067, "CKM_SHA3_224_RSA_PKCS_PSS"),
    (0x0000_0060, "CKM_SHA3_256_RSA_PKCS"),
    (0x0000_0063, "CKM_SHA3_256_RSA_PKCS_PSS"),
    (0x0000_0061, "CKM_SHA3_384_RSA_PKCS"),
    (0x0000_0064, "CKM_SHA3_384_RSA_PKCS_PSS"),
    (0x0000_0062, "CKM_SHA3_512_RSA_PKCS"),
    (0x0000_0065, "CKM_SHA3_512_RSA_PKCS_PSS"),
    (0x0000_0131, "CKM_DES3_KEY_GEN"),
    (0x0000_0132, "CKM_DES3_ECB"),
    (0x0000_0133, "CKM_DES3_CBC"),
    (0x0000_0136, "CKM_DES3_CBC_PAD"),
    (0x0000_0138, "CKM_DES3_CMAC"),
    (0x0000_0220, "CKM_SHA_1"),
    (0x0000_0221, "CKM_SHA_1_HMAC"),
    (0x0000_0222, "CKM_SHA_1_HMAC_GENERAL"),
    (0x0000_0255, "CKM_SHA224"),
    (0x0000_0256, "CKM_SHA224_HMAC"),
    (0x0000_0257, "CKM_SHA224_HMAC_GENERAL"),
    (0x0000_0250, "CKM_SHA256"),
    (0x0000_0251, "CKM_SHA256_HMAC"),
    (0x0000_0252, "CKM_SHA256_HMAC_GENERAL"),
    (0x0000_0260, "CKM_SHA384"),
    (0x0000_0261, "CKM_SHA384_HMAC"),
    (0x0000_0262, "CKM_SHA384_HMAC_GENERAL"),
    (0x0000_0270, "CKM_SHA512"),
    (0x0000_0271, "CKM_SHA512_HMAC"),
    (0x0000_0272, "CKM_SHA512_HMAC_GENERAL"),
    (0x0000_02b5, "CKM_SHA3_224"),
    (0x0000_02b6, "CKM_SHA3_224_HMAC"),
    (0x0000_02b7, "CKM_SHA3_224_HMAC_GENERAL"),
    (0x0000_02b0, "CKM_SHA3_256"),
    (0x0000_02b1, "CKM_SHA3_256_HMAC"),
    (0x0000_02b2, "CKM_SHA3_256_HMAC_GENERAL"),
    (0x0000_02c0, "CKM_SHA3_384"),
    (0x0000_02c1, "CKM_SHA3_384_HMAC"),
    (0x0000_02c2, "CKM_SHA3_384_HMAC_GENERAL"),
    (0x0000_02d0, "CKM_SHA3_512"),
    (0x0000_02d1, "CKM_SHA3_512_HMAC"),
    (0x0000_02d2, "CKM_SHA3_512_HMAC_GENERAL"),
    (0x0000_0350, "CKM_GENERIC_SECRET_KEY_GEN"),
    (0x0000_03b0, "CKM_PKCS5_PBKD2"),
    (0x8000_0f00, "CKM_SHAKE_128"),
    (0x8000_0f01, "CKM_SHAKE_256"),
    (0x0000_1040, "CKM_EC_KEY_PAIR_GEN"),
    (0x8000_0160, "CKM_EC_KEY_PAIR_GEN_W_EXTRA_BITS"),
    (0x0000_1041, "CKM_ECDSA"),
    (0x0000_1042, "CKM_ECDSA_SHA1"),
    (0x0000_1043, "CKM_ECDSA_SHA224"),
    (0x0000_1044, "CKM_ECDSA_SHA256"),
    (0x0000_1045, "CKM_ECDSA_SHA384"),
    (0x0000_1046, "CKM_ECDSA_SHA512"),
    (0x0000_1047, "CKM_ECDSA_SHA3_224"),
    (0x0000_1048, "CKM_ECDSA_SHA3_256"),
    (0x0000_1049, "CKM_ECDSA_SHA3_384"),
    (0x0000_104a, "CKM_ECDSA_SHA3_512"),
    (0x0000_1050, "CKM_ECDH1_DERIVE"),
    (0x0000_1051, "CKM_ECDH1_COFACTOR_DERIVE"),
    (0x0000_1056, "CKM_EC_MONTGOMERY_KEY_PAIR_GEN"),
    (0x0000_1071, "CKM_AES_XTS"),
    (0x0000_1080, "CKM_AES_KEY_GEN"),
    (0x0000_1081, "CKM_AES_ECB"),
    (0x0000_1082, "CKM_AES_CBC"),
    (0x0000_1085, "CKM_AES_CBC_PAD"),
    (0x0000_1086, "CKM_AES_CTR"),
    (0x0000_1087, "CKM_AES_GCM"),
    (0x0000_108a, "CKM_AES_CMAC"),
    (0x0000_108b, "CKM_AES_CMAC_GENERAL"),
    (0x0000_108e, "CKM_AES_GMAC"),
    (0x0000_1104, "CKM_AES_ECB_ENCRYPT_DATA"),
    (0x0000_1105, "CKM_AES_CBC_ENCRYPT_DATA"),
    (0x0000_2000, "CKM_DSA_PARAMETER_GEN"),
    (0x0000_2104, "CKM_AES_OFB"),
    (0x0000_2106, "CKM_AES_CFB8"),
    (0x0000_2107, "CKM_AES_CFB128"),
    (0x0000_2109, "CKM_AES_KEY_WRAP"),
    (0x0000_210a, "CKM_AES_KEY_WRAP_PAD"),
    (0x8000_0170, "CKM_AES_KW"),
    (0x8000_0171, "CKM_AES_KWP"),
    (0x8000_0a00, "CKM_ECIES"),
    (0x8000_0a02, "CKM_NIST_PRF_KDF"),
    (0x8000_0a03, "CKM_PRF_KDF"),
];

/// Name of a mechanism code, `None` when the code is not in the table.
#[must_use]
pub fn mechanism_name(mechanism: CK_MECHANISM_TYPE) -> Option<&'static str> {
    MECHANISMS
        .iter()
        .find(|(code, _)| *code == mechanism)
        .map(|(_, name)| *name)
}

/// Name of a mechanism code or its hexadecimal representation
#[must_use]
pub fn mechanism_display(mechanism: CK_MECHANISM_TYPE) -> String {
    mechanism_name(mechanism).map_or_else(|| format!("0x{mechanism:08X}"), ToOwned::to_owned)
}

/// Resolve a mechanism name, case-insensitively and with or without the `CKM_` prefix.
///
/// A hexadecimal code (`0x80000170`) is accepted as well.
///
/// # Errors
/// Fails if the name is not a known mechanism.
pub fn mechanism_from_name(name: &str) -> HResult<CK_MECHANISM_TYPE> {
    let name = name.trim();
    if let Some(hex) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
        if let Ok(code) = CK_MECHANISM_TYPE::from_str_radix(hex, 16) {
            return Ok(code);
        }
    }
    let upper = name.to_ascii_uppercase();
    let full = if upper.starts_with("CKM_") {
        upper
    } else {
        format!("CKM_{upper}")
    };
    match MECHANISMS.iter().find(|(_, n)| *n == full) {
        Some((code, _)) => Ok(*code),
        None => hsm_bail!("unknown mechanism: {}", name),
    }
}

/// Iterate over the known mechanisms
pub fn known_mechanisms() -> impl Iterator<Item = (CK_MECHANISM_TYPE, &'static str)> {
    MECHANISMS.iter().copied()
}

/// Key size range and capabilities of a mechanism on a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MechanismInfo {
    pub mechanism: String,
    pub min_key_size: u64,
    pub max_key_size: u64,
    pub hardware: bool,
    pub encrypt: bool,
    pub decrypt: bool,
    pub digest: bool,
    pub sign: bool,
    pub sign_recover: bool,
    pub verify: bool,
    pub verify_recover: bool,
    pub generate: bool,
    pub generate_key_pair: bool,
    pub wrap: bool,
    pub unwrap: bool,
    pub derive: bool,
}

impl MechanismInfo {
    pub(crate) fn new(mechanism: CK_MECHANISM_TYPE, info: &CK_MECHANISM_INFO) -> Self {
        let has = |flag| info.flags & flag != 0;
        Self {
            mechanism: mechanism_display(mechanism),
            min_key_size: u64::from(info.ulMinKeySize),
            max_key_size: u64::from(info.ulMaxKeySize),
            hardware: has(CKF_HW),
            encrypt: has(CKF_ENCRYPT),
            decrypt: has(CKF_DECRYPT),
            digest: has(CKF_DIGEST),
            sign: has(CKF_SIGN),
            sign_recover: has(CKF_SIGN_RECOVER),
            verify: has(CKF_VERIFY),
            verify_recover: has(CKF_VERIFY_RECOVER),
            generate: has(CKF_GENERATE),
            generate_key_pair: has(CKF_GENERATE_KEY_PAIR),
            wrap: has(CKF_WRAP),
            unwrap: has(CKF_UNWRAP),
            derive: has(CKF_DERIVE),
        }
    }
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { " NO" }
}

impl Display for MechanismInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mininum Keysize : {}", self.min_key_size)?;
        writeln!(f, "Maximum Keysize : {}", self.max_key_size)?;
        writeln!(
            f,
            "HARDWARE        : {}",
            if self.hardware { "YES" } else { "NO" }
        )?;
        writeln!(f, "---------------------------")?;
        let rows = [
            ("CAN ENCRYPT     ", self.encrypt),
            ("CAN DECRYPT     ", self.decrypt),
            ("CAN DIGEST      ", self.digest),
            ("CAN SIGN        ", self.sign),
            ("SIGN_RECOVER    ", self.sign_recover),
            ("CAN VERIFY      ", self.verify),
            ("VERIFY_RECOVER  ", self.verify_recover),
            ("GENERATE KEY    ", self.generate),
            ("GENERATE KEYPAIR", self.generate_key_pair),
            ("CAN WRAP        ", self.wrap),
            ("CAN UNWRAP      ", self.unwrap),
            ("CAN DERIVE      ", self.derive),
        ];
        for (label, flag) in rows {
            writeln!(f, "|  {label} | {} |", yes_no(flag))?;
        }
        write!(f, "---------------------------")
    }
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{
        CK_MECHANISM_INFO, CKF_DECRYPT, CKF_ENCRYPT, CKF_HW, CKF_WRAP, CKM_AES_GCM,
        CKM_ECDH1_DERIVE, CKM_RSA_PKCS_KEY_PAIR_GEN,
    };

    use super::{MechanismInfo, mechanism_display, mechanism_from_name, mechanism_name};
    use crate::luna::{CKM_AES_KW, CKM_AES_KWP, CKM_NIST_PRF_KDF};

    #[test]
    fn names_resolve_to_codes() {
        assert_eq!(mechanism_from_name("CKM_AES_GCM").unwrap(), CKM_AES_GCM);
        assert_eq!(mechanism_from_name("aes_gcm").unwrap(), CKM_AES_GCM);
        assert_eq!(mechanism_from_name("ckm_ecdh1_derive").unwrap(), CKM_ECDH1_DERIVE);
        assert_eq!(mechanism_from_name("CKM_AES_KW").unwrap(), CKM_AES_KW);
        assert_eq!(mechanism_from_name("0x80000171").unwrap(), CKM_AES_KWP);
        assert_eq!(
            mechanism_from_name("RSA_PKCS_KEY_PAIR_GEN").unwrap(),
            CKM_RSA_PKCS_KEY_PAIR_GEN
        );
        let err = mechanism_from_name("CKM_ROT13").unwrap_err();
        assert_eq!(err.to_string(), "unknown mechanism: CKM_ROT13");
    }

    #[test]
    fn codes_resolve_to_names() {
        assert_eq!(mechanism_name(CKM_NIST_PRF_KDF), Some("CKM_NIST_PRF_KDF"));
        assert_eq!(mechanism_name(0x7FFF_0000), None);
        assert_eq!(mechanism_display(0x7FFF_0000), "0x7FFF0000");
    }

    #[test]
    fn every_name_is_unique() {
        let mut names: Vec<_> = super::known_mechanisms().map(|(_, n)| n).collect();
        let len = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), len);
    }

    #[test]
    fn mechanism_info_table() {
        let raw = CK_MECHANISM_INFO {
            ulMinKeySize: 16,
            ulMaxKeySize: 32,
            flags: CKF_HW | CKF_ENCRYPT | CKF_DECRYPT | CKF_WRAP,
        };
        let info = MechanismInfo::new(CKM_AES_GCM, &raw);
        assert!(info.hardware && info.encrypt && info.wrap);
        assert!(!info.sign && !info.derive);
        let text = info.to_string();
        assert!(text.starts_with("Mininum Keysize : 16\nMaximum Keysize : 32\nHARDWARE        : YES"));
        assert!(text.contains("|  CAN ENCRYPT      | YES |"));
        assert!(text.contains("|  CAN SIGN         |  NO |"));
        assert!(text.contains("|  GENERATE KEYPAIR |  NO |"));
        assert_eq!(text.lines().count(), 17);
    }
}
