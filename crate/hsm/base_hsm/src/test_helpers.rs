use crate::{HError, HResult};

/// The password of the test partition, from `HSM_USER_PASSWORD` at build time
pub fn get_hsm_password() -> HResult<String> {
    let user_password = option_env!("HSM_USER_PASSWORD")
        .ok_or_else(|| {
            HError::Default(
                "The user password for the HSM is not set. Please set the HSM_USER_PASSWORD \
                 environment variable"
                    .to_owned(),
            )
        })?
        .to_owned();
    Ok(user_password)
}

/// The slot of the test partition, from `HSM_SLOT_ID` at run time
pub fn get_hsm_slot_id() -> HResult<usize> {
    let slot_id = std::env::var("HSM_SLOT_ID")
        .map_err(|_| HError::Default("HSM_SLOT_ID is not set".to_owned()))?;
    slot_id
        .parse()
        .map_err(|e| HError::Default(format!("invalid HSM_SLOT_ID '{slot_id}': {e}")))
}
