//! Typed mechanisms and their C parameter structures.

use std::{ffi::c_void, ptr};

use cosmian_pkcs11_sys::{
    CK_AES_CTR_PARAMS, CK_AES_GCM_PARAMS, CK_EC_KDF_TYPE, CK_ECDH1_DERIVE_PARAMS, CK_MECHANISM,
    CK_MECHANISM_TYPE, CK_PKCS5_PBKD2_PSEUDO_RANDOM_FUNCTION_TYPE, CK_PKCS5_PBKD2_PARAMS,
    CK_RSA_PKCS_MGF_TYPE, CK_RSA_PKCS_OAEP_PARAMS, CK_RSA_PKCS_PSS_PARAMS, CK_ULONG,
    CKD_NULL, CKD_SHA1_KDF, CKG_MGF1_SHA1, CKG_MGF1_SHA224, CKG_MGF1_SHA256, CKG_MGF1_SHA384,
    CKG_MGF1_SHA512, CKM_AES_CBC, CKM_AES_CBC_PAD, CKM_AES_CMAC, CKM_AES_CTR, CKM_AES_ECB,
    CKM_AES_GCM, CKM_AES_KEY_GEN, CKM_DES3_CBC_PAD, CKM_DES3_KEY_GEN, CKM_EC_KEY_PAIR_GEN,
    CKM_ECDH1_DERIVE, CKM_ECDSA, CKM_ECDSA_SHA256, CKM_PKCS5_PBKD2, CKM_RSA_PKCS,
    CKM_RSA_PKCS_KEY_PAIR_GEN, CKM_RSA_PKCS_OAEP, CKM_RSA_X9_31, CKM_SHA_1, CKM_SHA224,
    CKM_SHA256, CKM_SHA256_RSA_PKCS, CKM_SHA256_RSA_PKCS_PSS, CKM_SHA384, CKM_SHA512,
    CKP_PKCS5_PBKD2_HMAC_SHA1, CKZ_DATA_SPECIFIED, CKZ_SALT_SPECIFIED,
};

use crate::{
    HResult,
    hsm_capabilities::HsmCapabilities,
    luna::{
        CK_NIST_PRF_KDF_AES_CMAC, CK_PRF_KDF_PARAMS, CK_PRF_KDF_TYPE, CKM_AES_KW, CKM_AES_KWP,
        CKM_NIST_PRF_KDF, CKM_RSA_FIPS_186_3_PRIME_KEY_PAIR_GEN, LUNA_PRF_KDF_ENCODING_SCHEME_1,
    },
};

/// AES block and CBC IV size
pub const AES_BLOCK_SIZE: usize = 16;
/// DES3 CBC IV size
pub const DES3_IV_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    #[must_use]
    pub const fn mechanism(self) -> CK_MECHANISM_TYPE {
        match self {
            Self::Sha1 => CKM_SHA_1,
            Self::Sha224 => CKM_SHA224,
            Self::Sha256 => CKM_SHA256,
            Self::Sha384 => CKM_SHA384,
            Self::Sha512 => CKM_SHA512,
        }
    }

    #[must_use]
    pub const fn mgf(self) -> CK_RSA_PKCS_MGF_TYPE {
        match self {
            Self::Sha1 => CKG_MGF1_SHA1,
            Self::Sha224 => CKG_MGF1_SHA224,
            Self::Sha256 => CKG_MGF1_SHA256,
            Self::Sha384 => CKG_MGF1_SHA384,
            Self::Sha512 => CKG_MGF1_SHA512,
        }
    }

    /// ANSI X9.31 trailer appended to the hash before a `CKM_RSA_X9_31` signature
    #[must_use]
    pub const fn x931_trailer(self) -> [u8; 2] {
        let id = match self {
            Self::Sha1 => 0x33,
            Self::Sha224 => 0x38,
            Self::Sha256 => 0x34,
            Self::Sha384 => 0x36,
            Self::Sha512 => 0x35,
        };
        [id, 0xCC]
    }

    /// Digest length in bytes
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Key derivation function applied to the ECDH shared secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcKdf {
    Null,
    Sha1,
}

impl EcKdf {
    const fn ck_kdf(self) -> CK_EC_KDF_TYPE {
        match self {
            Self::Null => CKD_NULL,
            Self::Sha1 => CKD_SHA1_KDF,
        }
    }
}

/// A mechanism with its parameters.
///
/// Byte parameters are borrowed, the C structure pointing at them is only built
/// for the duration of one call by [`Mechanism::with_ck_mechanism`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism<'a> {
    AesKeyGen,
    Des3KeyGen,
    RsaPkcsKeyPairGen,
    /// Luna FIPS 186-3 prime RSA key pair generation
    RsaFips186PrimeKeyPairGen,
    EcKeyPairGen,
    AesEcb,
    AesCbc {
        iv: [u8; AES_BLOCK_SIZE],
    },
    AesCbcPad {
        iv: [u8; AES_BLOCK_SIZE],
    },
    AesCtr {
        counter_block: [u8; AES_BLOCK_SIZE],
        counter_bits: CK_ULONG,
    },
    AesGcm {
        iv: &'a [u8],
        aad: &'a [u8],
        tag_bits: CK_ULONG,
    },
    AesCmac,
    Des3CbcPad {
        iv: [u8; DES3_IV_SIZE],
    },
    /// RFC 3394, the provider decides between the standard and the Luna code
    AesKeyWrap,
    /// RFC 5649, the provider decides between the standard and the Luna code
    AesKeyWrapPad,
    /// Luna `CKM_AES_KW` with an explicit IV
    AesKw {
        iv: [u8; 8],
    },
    /// Luna `CKM_AES_KWP` with an explicit IV
    AesKwp {
        iv: [u8; 4],
    },
    RsaPkcs,
    Sha256RsaPkcs,
    RsaOaep {
        hash: HashAlgorithm,
        source: &'a [u8],
    },
    Sha256RsaPkcsPss {
        salt_len: CK_ULONG,
    },
    RsaX931,
    Ecdsa,
    EcdsaSha256,
    Digest(HashAlgorithm),
    Ecdh1Derive {
        kdf: EcKdf,
        shared_data: &'a [u8],
        public_data: &'a [u8],
    },
    Pkcs5Pbkd2 {
        password: &'a [u8],
        salt: &'a [u8],
        iterations: CK_ULONG,
        prf: CK_PKCS5_PBKD2_PSEUDO_RANDOM_FUNCTION_TYPE,
    },
    NistPrfKdf {
        prf_type: CK_PRF_KDF_TYPE,
        label: &'a [u8],
        context: &'a [u8],
        counter: CK_ULONG,
        encoding_scheme: CK_ULONG,
    },
    /// Any mechanism without parameters
    Other(CK_MECHANISM_TYPE),
}

impl<'a> Mechanism<'a> {
    /// `CKM_AES_GCM` with a 128-bit tag
    #[must_use]
    pub const fn aes_gcm(iv: &'a [u8], aad: &'a [u8]) -> Self {
        Self::AesGcm {
            iv,
            aad,
            tag_bits: 128,
        }
    }

    /// `CKM_AES_CTR` incrementing the whole block
    #[must_use]
    pub const fn aes_ctr(counter_block: [u8; AES_BLOCK_SIZE]) -> Self {
        Self::AesCtr {
            counter_block,
            counter_bits: 128,
        }
    }

    /// `CKM_PKCS5_PBKD2` with HMAC-SHA1
    #[must_use]
    pub const fn pbkdf2(password: &'a [u8], salt: &'a [u8], iterations: CK_ULONG) -> Self {
        Self::Pkcs5Pbkd2 {
            password,
            salt,
            iterations,
            prf: CKP_PKCS5_PBKD2_HMAC_SHA1,
        }
    }

    /// Luna `CKM_NIST_PRF_KDF` in counter mode with an AES-CMAC PRF
    #[must_use]
    pub const fn nist_prf_kdf_aes_cmac(label: &'a [u8], context: &'a [u8]) -> Self {
        Self::NistPrfKdf {
            prf_type: CK_NIST_PRF_KDF_AES_CMAC,
            label,
            context,
            counter: 1,
            encoding_scheme: LUNA_PRF_KDF_ENCODING_SCHEME_1,
        }
    }

    /// The mechanism code sent to the library
    #[must_use]
    pub const fn mechanism_type(&self, capabilities: &HsmCapabilities) -> CK_MECHANISM_TYPE {
        match self {
            Self::AesKeyGen => CKM_AES_KEY_GEN,
            Self::Des3KeyGen => CKM_DES3_KEY_GEN,
            Self::RsaPkcsKeyPairGen => CKM_RSA_PKCS_KEY_PAIR_GEN,
            Self::RsaFips186PrimeKeyPairGen => CKM_RSA_FIPS_186_3_PRIME_KEY_PAIR_GEN,
            Self::EcKeyPairGen => CKM_EC_KEY_PAIR_GEN,
            Self::AesEcb => CKM_AES_ECB,
            Self::AesCbc { .. } => CKM_AES_CBC,
            Self::AesCbcPad { .. } => CKM_AES_CBC_PAD,
            Self::AesCtr { .. } => CKM_AES_CTR,
            Self::AesGcm { .. } => CKM_AES_GCM,
            Self::AesCmac => CKM_AES_CMAC,
            Self::Des3CbcPad { .. } => CKM_DES3_CBC_PAD,
            Self::AesKeyWrap => capabilities.aes_key_wrap,
            Self::AesKeyWrapPad => capabilities.aes_key_wrap_pad,
            Self::AesKw { .. } => CKM_AES_KW,
            Self::AesKwp { .. } => CKM_AES_KWP,
            Self::RsaPkcs => CKM_RSA_PKCS,
            Self::Sha256RsaPkcs => CKM_SHA256_RSA_PKCS,
            Self::RsaOaep { .. } => CKM_RSA_PKCS_OAEP,
            Self::Sha256RsaPkcsPss { .. } => CKM_SHA256_RSA_PKCS_PSS,
            Self::RsaX931 => CKM_RSA_X9_31,
            Self::Ecdsa => CKM_ECDSA,
            Self::EcdsaSha256 => CKM_ECDSA_SHA256,
            Self::Digest(hash) => hash.mechanism(),
            Self::Ecdh1Derive { .. } => CKM_ECDH1_DERIVE,
            Self::Pkcs5Pbkd2 { .. } => CKM_PKCS5_PBKD2,
            Self::NistPrfKdf { .. } => CKM_NIST_PRF_KDF,
            Self::Other(mechanism) => *mechanism,
        }
    }

    /// Build the `CK_MECHANISM` and its parameters on the stack and pass it to `f`.
    ///
    /// The library only reads the parameters, the mutable pointers are an
    /// artifact of the C prototypes.
    ///
    /// # Errors
    /// Fails if a length does not fit in a `CK_ULONG`, or with the error of `f`.
    pub fn with_ck_mechanism<T>(
        &self,
        capabilities: &HsmCapabilities,
        f: impl FnOnce(&mut CK_MECHANISM) -> HResult<T>,
    ) -> HResult<T> {
        let mechanism = self.mechanism_type(capabilities);
        match self {
            Self::AesCbc { iv } | Self::AesCbcPad { iv } => {
                let mut iv = *iv;
                call_with_bytes(mechanism, &mut iv, f)
            }
            Self::Des3CbcPad { iv } | Self::AesKw { iv } => {
                let mut iv = *iv;
                call_with_bytes(mechanism, &mut iv, f)
            }
            Self::AesKwp { iv } => {
                let mut iv = *iv;
                call_with_bytes(mechanism, &mut iv, f)
            }
            Self::AesCtr {
                counter_block,
                counter_bits,
            } => {
                let mut params = CK_AES_CTR_PARAMS {
                    ulCounterBits: *counter_bits,
                    cb: *counter_block,
                };
                call_with_params(mechanism, &mut params, f)
            }
            Self::AesGcm { iv, aad, tag_bits } => {
                let mut params = CK_AES_GCM_PARAMS {
                    pIv: iv.as_ptr().cast_mut(),
                    ulIvLen: CK_ULONG::try_from(iv.len())?,
                    ulIvBits: CK_ULONG::try_from(iv.len() * 8)?,
                    pAAD: byte_ptr(aad),
                    ulAADLen: CK_ULONG::try_from(aad.len())?,
                    ulTagBits: *tag_bits,
                };
                call_with_params(mechanism, &mut params, f)
            }
            Self::RsaOaep { hash, source } => {
                let mut params = CK_RSA_PKCS_OAEP_PARAMS {
                    hashAlg: hash.mechanism(),
                    mgf: hash.mgf(),
                    source: CKZ_DATA_SPECIFIED,
                    pSourceData: byte_ptr(source).cast::<c_void>(),
                    ulSourceDataLen: CK_ULONG::try_from(source.len())?,
                };
                call_with_params(mechanism, &mut params, f)
            }
            Self::Sha256RsaPkcsPss { salt_len } => {
                let mut params = CK_RSA_PKCS_PSS_PARAMS {
                    hashAlg: CKM_SHA256,
                    mgf: CKG_MGF1_SHA256,
                    sLen: *salt_len,
                };
                call_with_params(mechanism, &mut params, f)
            }
            Self::Ecdh1Derive {
                kdf,
                shared_data,
                public_data,
            } => {
                let mut params = CK_ECDH1_DERIVE_PARAMS {
                    kdf: kdf.ck_kdf(),
                    ulSharedDataLen: CK_ULONG::try_from(shared_data.len())?,
                    pSharedData: byte_ptr(shared_data),
                    ulPublicDataLen: CK_ULONG::try_from(public_data.len())?,
                    pPublicData: byte_ptr(public_data),
                };
                call_with_params(mechanism, &mut params, f)
            }
            Self::Pkcs5Pbkd2 {
                password,
                salt,
                iterations,
                prf,
            } => {
                let mut password_len = CK_ULONG::try_from(password.len())?;
                let p_password_len = if capabilities.pbkdf2_password_len_by_value {
                    ptr::without_provenance_mut(usize::try_from(password_len)?)
                } else {
                    &raw mut password_len
                };
                let mut params = CK_PKCS5_PBKD2_PARAMS {
                    saltSource: CKZ_SALT_SPECIFIED,
                    pSaltSourceData: byte_ptr(salt).cast::<c_void>(),
                    ulSaltSourceDataLen: CK_ULONG::try_from(salt.len())?,
                    iterations: *iterations,
                    prf: *prf,
                    pPrfData: ptr::null_mut(),
                    ulPrfDataLen: 0,
                    pPassword: byte_ptr(password),
                    ulPasswordLen: p_password_len,
                };
                call_with_params(mechanism, &mut params, f)
            }
            Self::NistPrfKdf {
                prf_type,
                label,
                context,
                counter,
                encoding_scheme,
            } => {
                let mut params = CK_PRF_KDF_PARAMS {
                    prfType: *prf_type,
                    pLabel: byte_ptr(label),
                    ulLabelLen: CK_ULONG::try_from(label.len())?,
                    pContext: byte_ptr(context),
                    ulContextLen: CK_ULONG::try_from(context.len())?,
                    ulCounter: *counter,
                    ulEncodingScheme: *encoding_scheme,
                };
                call_with_params(mechanism, &mut params, f)
            }
            Self::AesKeyGen
            | Self::Des3KeyGen
            | Self::RsaPkcsKeyPairGen
            | Self::RsaFips186PrimeKeyPairGen
            | Self::EcKeyPairGen
            | Self::AesEcb
            | Self::AesCmac
            | Self::AesKeyWrap
            | Self::AesKeyWrapPad
            | Self::RsaPkcs
            | Self::Sha256RsaPkcs
            | Self::RsaX931
            | Self::Ecdsa
            | Self::EcdsaSha256
            | Self::Digest(_)
            | Self::Other(_) => {
                let mut ck_mechanism = CK_MECHANISM {
                    mechanism,
                    pParameter: ptr::null_mut(),
                    ulParameterLen: 0,
                };
                f(&mut ck_mechanism)
            }
        }
    }
}

fn byte_ptr(bytes: &[u8]) -> *mut u8 {
    if bytes.is_empty() {
        ptr::null_mut()
    } else {
        bytes.as_ptr().cast_mut()
    }
}

fn call_with_bytes<T>(
    mechanism: CK_MECHANISM_TYPE,
    bytes: &mut [u8],
    f: impl FnOnce(&mut CK_MECHANISM) -> HResult<T>,
) -> HResult<T> {
    let mut ck_mechanism = CK_MECHANISM {
        mechanism,
        pParameter: bytes.as_mut_ptr().cast::<c_void>(),
        ulParameterLen: CK_ULONG::try_from(bytes.len())?,
    };
    f(&mut ck_mechanism)
}

fn call_with_params<P, T>(
    mechanism: CK_MECHANISM_TYPE,
    params: &mut P,
    f: impl FnOnce(&mut CK_MECHANISM) -> HResult<T>,
) -> HResult<T> {
    let mut ck_mechanism = CK_MECHANISM {
        mechanism,
        pParameter: ptr::from_mut(params).cast::<c_void>(),
        ulParameterLen: CK_ULONG::try_from(size_of::<P>())?,
    };
    f(&mut ck_mechanism)
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{
        CK_AES_GCM_PARAMS, CK_PKCS5_PBKD2_PARAMS, CK_ULONG, CKM_AES_CBC_PAD, CKM_AES_GCM,
        CKM_AES_KEY_WRAP, CKM_SHA256,
    };

    use super::{HashAlgorithm, Mechanism};
    use crate::{hsm_capabilities::HsmCapabilities, luna::CKM_AES_KW};

    #[test]
    fn x931_trailers() {
        assert_eq!(HashAlgorithm::Sha256.x931_trailer(), [0x34, 0xCC]);
        assert_eq!(HashAlgorithm::Sha1.x931_trailer(), [0x33, 0xCC]);
        assert_eq!(HashAlgorithm::Sha512.x931_trailer(), [0x35, 0xCC]);
        assert_eq!(HashAlgorithm::Sha256.mechanism(), CKM_SHA256);
    }

    #[test]
    fn key_wrap_code_follows_the_provider() {
        let default = HsmCapabilities::default();
        assert_eq!(Mechanism::AesKeyWrap.mechanism_type(&default), CKM_AES_KEY_WRAP);
        let luna = HsmCapabilities {
            aes_key_wrap: CKM_AES_KW,
            ..HsmCapabilities::default()
        };
        assert_eq!(Mechanism::AesKeyWrap.mechanism_type(&luna), CKM_AES_KW);
    }

    #[test]
    fn cbc_iv_is_the_parameter() {
        let iv = *b"1234567812345678";
        Mechanism::AesCbcPad { iv }
            .with_ck_mechanism(&HsmCapabilities::default(), |m| {
                assert_eq!(m.mechanism, CKM_AES_CBC_PAD);
                assert_eq!(m.ulParameterLen, 16);
                #[allow(unsafe_code)]
                let bytes =
                    unsafe { std::slice::from_raw_parts(m.pParameter.cast::<u8>(), 16) };
                assert_eq!(bytes, b"1234567812345678");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn gcm_parameters() {
        let mechanism = Mechanism::aes_gcm(b"123456781234", b"127.0.0.1");
        mechanism
            .with_ck_mechanism(&HsmCapabilities::default(), |m| {
                assert_eq!(m.mechanism, CKM_AES_GCM);
                assert_eq!(m.ulParameterLen as usize, size_of::<CK_AES_GCM_PARAMS>());
                #[allow(unsafe_code)]
                let params = unsafe { &*m.pParameter.cast::<CK_AES_GCM_PARAMS>() };
                assert_eq!(params.ulIvLen, 12);
                assert_eq!(params.ulIvBits, 96);
                assert_eq!(params.ulAADLen, 9);
                assert_eq!(params.ulTagBits, 128);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn pbkdf2_password_length_passing() {
        let mechanism = Mechanism::pbkdf2(b"Th3W0rld", b"salt", 1000);
        mechanism
            .with_ck_mechanism(&HsmCapabilities::default(), |m| {
                #[allow(unsafe_code)]
                let params = unsafe { &*m.pParameter.cast::<CK_PKCS5_PBKD2_PARAMS>() };
                #[allow(unsafe_code)]
                let len = unsafe { *params.ulPasswordLen };
                assert_eq!(len, 8);
                Ok(())
            })
            .unwrap();

        let by_value = HsmCapabilities {
            pbkdf2_password_len_by_value: true,
            ..HsmCapabilities::default()
        };
        mechanism
            .with_ck_mechanism(&by_value, |m| {
                #[allow(unsafe_code)]
                let params = unsafe { &*m.pParameter.cast::<CK_PKCS5_PBKD2_PARAMS>() };
                assert_eq!(params.ulPasswordLen as usize, 8);
                assert_eq!(params.iterations, 1000 as CK_ULONG);
                Ok(())
            })
            .unwrap();
    }
}
