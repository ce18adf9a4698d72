use cosmian_pkcs11_sys::{
    CK_RV, CKR_ARGUMENTS_BAD, CKR_ATTRIBUTE_READ_ONLY, CKR_ATTRIBUTE_SENSITIVE,
    CKR_ATTRIBUTE_TYPE_INVALID, CKR_ATTRIBUTE_VALUE_INVALID, CKR_BUFFER_TOO_SMALL,
    CKR_CRYPTOKI_ALREADY_INITIALIZED, CKR_CRYPTOKI_NOT_INITIALIZED, CKR_DATA_LEN_RANGE,
    CKR_DEVICE_ERROR, CKR_DEVICE_MEMORY, CKR_DEVICE_REMOVED, CKR_ENCRYPTED_DATA_INVALID,
    CKR_FUNCTION_FAILED, CKR_FUNCTION_NOT_SUPPORTED, CKR_GENERAL_ERROR, CKR_HOST_MEMORY,
    CKR_KEY_FUNCTION_NOT_PERMITTED, CKR_KEY_HANDLE_INVALID, CKR_KEY_SIZE_RANGE,
    CKR_KEY_TYPE_INCONSISTENT, CKR_KEY_UNEXTRACTABLE, CKR_MECHANISM_INVALID,
    CKR_MECHANISM_PARAM_INVALID, CKR_OBJECT_HANDLE_INVALID, CKR_OK, CKR_OPERATION_ACTIVE,
    CKR_OPERATION_NOT_INITIALIZED, CKR_PIN_INCORRECT, CKR_PIN_LOCKED, CKR_SESSION_CLOSED,
    CKR_SESSION_HANDLE_INVALID, CKR_SESSION_READ_ONLY, CKR_SIGNATURE_INVALID,
    CKR_SIGNATURE_LEN_RANGE, CKR_SLOT_ID_INVALID, CKR_TEMPLATE_INCOMPLETE,
    CKR_TEMPLATE_INCONSISTENT, CKR_TOKEN_NOT_PRESENT, CKR_USER_ALREADY_LOGGED_IN,
    CKR_USER_NOT_LOGGED_IN, CKR_USER_TYPE_INVALID, CKR_WRAPPED_KEY_INVALID,
    CKR_WRAPPING_KEY_HANDLE_INVALID,
};
use thiserror::Error;

use crate::luna::{CKR_KEY_EXHAUSTED, CKR_KEY_NOT_ACTIVE};

#[derive(Error, Debug)]
pub enum HError {
    #[error("{0}")]
    Default(String),

    #[error("{}: {} (0x{:08X})", .context, rv_name(*.rv), .rv)]
    Pkcs11 { context: String, rv: CK_RV },

    #[error(transparent)]
    LibLoading(#[from] libloading::Error),

    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    #[error(transparent)]
    FromUtf8(#[from] std::string::FromUtf8Error),

    #[error("session pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HError {
    /// The PKCS#11 return value carried by this error, if any.
    #[must_use]
    pub const fn rv(&self) -> Option<CK_RV> {
        match self {
            Self::Pkcs11 { rv, .. } => Some(*rv),
            _ => None,
        }
    }

    /// `true` when the key refused the operation because its usage limit is reached
    #[must_use]
    pub const fn is_key_exhausted(&self) -> bool {
        matches!(self.rv(), Some(CKR_KEY_NOT_ACTIVE | CKR_KEY_EXHAUSTED))
    }
}

pub type HResult<T> = Result<T, HError>;

/// Symbolic name of a PKCS#11 return value.
///
/// Only the codes the samples are expected to hit are named; anything else
/// renders as `CKR_UNKNOWN`, the hexadecimal value is always printed next to it.
#[must_use]
pub const fn rv_name(rv: CK_RV) -> &'static str {
    match rv {
        CKR_OK => "CKR_OK",
        CKR_HOST_MEMORY => "CKR_HOST_MEMORY",
        CKR_SLOT_ID_INVALID => "CKR_SLOT_ID_INVALID",
        CKR_GENERAL_ERROR => "CKR_GENERAL_ERROR",
        CKR_FUNCTION_FAILED => "CKR_FUNCTION_FAILED",
        CKR_ARGUMENTS_BAD => "CKR_ARGUMENTS_BAD",
        CKR_ATTRIBUTE_READ_ONLY => "CKR_ATTRIBUTE_READ_ONLY",
        CKR_ATTRIBUTE_SENSITIVE => "CKR_ATTRIBUTE_SENSITIVE",
        CKR_ATTRIBUTE_TYPE_INVALID => "CKR_ATTRIBUTE_TYPE_INVALID",
        CKR_ATTRIBUTE_VALUE_INVALID => "CKR_ATTRIBUTE_VALUE_INVALID",
        CKR_DATA_LEN_RANGE => "CKR_DATA_LEN_RANGE",
        CKR_DEVICE_ERROR => "CKR_DEVICE_ERROR",
        CKR_DEVICE_MEMORY => "CKR_DEVICE_MEMORY",
        CKR_DEVICE_REMOVED => "CKR_DEVICE_REMOVED",
        CKR_ENCRYPTED_DATA_INVALID => "CKR_ENCRYPTED_DATA_INVALID",
        CKR_FUNCTION_NOT_SUPPORTED => "CKR_FUNCTION_NOT_SUPPORTED",
        CKR_KEY_HANDLE_INVALID => "CKR_KEY_HANDLE_INVALID",
        CKR_KEY_SIZE_RANGE => "CKR_KEY_SIZE_RANGE",
        CKR_KEY_TYPE_INCONSISTENT => "CKR_KEY_TYPE_INCONSISTENT",
        CKR_KEY_FUNCTION_NOT_PERMITTED => "CKR_KEY_FUNCTION_NOT_PERMITTED",
        CKR_KEY_UNEXTRACTABLE => "CKR_KEY_UNEXTRACTABLE",
        CKR_MECHANISM_INVALID => "CKR_MECHANISM_INVALID",
        CKR_MECHANISM_PARAM_INVALID => "CKR_MECHANISM_PARAM_INVALID",
        CKR_OBJECT_HANDLE_INVALID => "CKR_OBJECT_HANDLE_INVALID",
        CKR_OPERATION_ACTIVE => "CKR_OPERATION_ACTIVE",
        CKR_OPERATION_NOT_INITIALIZED => "CKR_OPERATION_NOT_INITIALIZED",
        CKR_PIN_INCORRECT => "CKR_PIN_INCORRECT",
        CKR_PIN_LOCKED => "CKR_PIN_LOCKED",
        CKR_SESSION_CLOSED => "CKR_SESSION_CLOSED",
        CKR_SESSION_HANDLE_INVALID => "CKR_SESSION_HANDLE_INVALID",
        CKR_SESSION_READ_ONLY => "CKR_SESSION_READ_ONLY",
        CKR_SIGNATURE_INVALID => "CKR_SIGNATURE_INVALID",
        CKR_SIGNATURE_LEN_RANGE => "CKR_SIGNATURE_LEN_RANGE",
        CKR_TEMPLATE_INCOMPLETE => "CKR_TEMPLATE_INCOMPLETE",
        CKR_TEMPLATE_INCONSISTENT => "CKR_TEMPLATE_INCONSISTENT",
        CKR_TOKEN_NOT_PRESENT => "CKR_TOKEN_NOT_PRESENT",
        CKR_USER_ALREADY_LOGGED_IN => "CKR_USER_ALREADY_LOGGED_IN",
        CKR_USER_NOT_LOGGED_IN => "CKR_USER_NOT_LOGGED_IN",
        CKR_USER_TYPE_INVALID => "CKR_USER_TYPE_INVALID",
        CKR_WRAPPED_KEY_INVALID => "CKR_WRAPPED_KEY_INVALID",
        CKR_WRAPPING_KEY_HANDLE_INVALID => "CKR_WRAPPING_KEY_HANDLE_INVALID",
        CKR_BUFFER_TOO_SMALL => "CKR_BUFFER_TOO_SMALL",
        CKR_CRYPTOKI_NOT_INITIALIZED => "CKR_CRYPTOKI_NOT_INITIALIZED",
        CKR_CRYPTOKI_ALREADY_INITIALIZED => "CKR_CRYPTOKI_ALREADY_INITIALIZED",
        CKR_KEY_NOT_ACTIVE => "CKR_KEY_NOT_ACTIVE",
        CKR_KEY_EXHAUSTED => "CKR_KEY_EXHAUSTED",
        _ => "CKR_UNKNOWN",
    }
}

/// Call a `PKCS#11` function of an `HsmLib`, failing with `HError::Pkcs11`
/// when the library does not export it or when it does not return `CKR_OK`.
///
/// The macro returns early from the enclosing function, which must return an `HResult`.
#[macro_export]
macro_rules! hsm_call {
    ($hsm:expr, $context:expr, $func:ident $(, $arg:expr)* $(,)?) => {{
        #[allow(unsafe_code)]
        let rv = unsafe {
            $hsm.$func.ok_or_else(|| {
                $crate::HError::Default(
                    concat!(stringify!($func), " not available on library").to_owned(),
                )
            })?($($arg),*)
        };
        if rv != $crate::reexport::cosmian_pkcs11_sys::CKR_OK {
            return Err($crate::HError::Pkcs11 {
                context: ($context).to_string(),
                rv,
            });
        }
    }};
}

/// Construct an `HError::Default` from a literal, an expression or a format string.
#[macro_export]
macro_rules! hsm_error {
    ($msg:literal) => {
        $crate::HError::Default(::core::format_args!($msg).to_string())
    };
    ($err:expr $(,)?) => ({
        $crate::HError::Default($err.to_string())
    });
    ($fmt:expr, $($arg:tt)*) => {
        $crate::HError::Default(::core::format_args!($fmt, $($arg)*).to_string())
    };
}

/// Return early with an `HError::Default`.
#[macro_export]
macro_rules! hsm_bail {
    ($msg:literal) => {
        return ::core::result::Result::Err($crate::hsm_error!($msg))
    };
    ($err:expr $(,)?) => {
        return ::core::result::Result::Err($crate::hsm_error!($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return ::core::result::Result::Err($crate::hsm_error!($fmt, $($arg)*))
    };
}

/// Return early with an `HError::Default` if a condition is not satisfied.
#[macro_export]
macro_rules! hsm_ensure {
    ($cond:expr, $msg:literal $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($crate::hsm_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            return ::core::result::Result::Err($crate::hsm_error!($fmt, $($arg)*));
        }
    };
}

#[cfg(test)]
mod tests {
    use cosmian_pkcs11_sys::{CKR_DEVICE_ERROR, CKR_PIN_INCORRECT};

    use super::{HError, HResult, rv_name};
    use crate::luna::CKR_KEY_NOT_ACTIVE;

    fn ensure_positive(v: i32) -> HResult<i32> {
        hsm_ensure!(v > 0, "value {} is not positive", v);
        Ok(v)
    }

    #[test]
    fn pkcs11_error_display() {
        let err = HError::Pkcs11 {
            context: "C_Login".to_owned(),
            rv: CKR_PIN_INCORRECT,
        };
        assert_eq!(err.to_string(), "C_Login: CKR_PIN_INCORRECT (0x000000A0)");
        assert_eq!(err.rv(), Some(CKR_PIN_INCORRECT));
        assert!(!err.is_key_exhausted());
    }

    #[test]
    fn vendor_codes_are_named() {
        assert_eq!(rv_name(CKR_KEY_NOT_ACTIVE), "CKR_KEY_NOT_ACTIVE");
        assert_eq!(rv_name(CKR_DEVICE_ERROR), "CKR_DEVICE_ERROR");
        assert_eq!(rv_name(0x7FFF_FFFF), "CKR_UNKNOWN");
        let err = HError::Pkcs11 {
            context: "C_Encrypt".to_owned(),
            rv: CKR_KEY_NOT_ACTIVE,
        };
        assert!(err.is_key_exhausted());
    }

    #[test]
    fn ensure_macro() {
        assert_eq!(ensure_positive(3).ok(), Some(3));
        let err = ensure_positive(-1).unwrap_err();
        assert_eq!(err.to_string(), "value -1 is not positive");
        assert_eq!(err.rv(), None);
    }
}
