//! These tests require a connection to a Luna partition and are gated behind the `luna` feature.
//! To run a test, cd into this crate directory and run (replace `XXX` with the actual password):
//!
//! ```bash
//! HSM_USER_PASSWORD=XXX HSM_SLOT_ID=0 cargo test --features luna -- tests::test_hsm_luna_all --ignored
//! ```
//! The tests create and destroy session and token objects in the partition.

use std::collections::HashMap;

use p11_base_hsm::{
    Credentials, HResult, Mechanism, UserType,
    test_helpers::{get_hsm_password, get_hsm_slot_id},
    tests_shared as shared,
};

use crate::{LUNA_PKCS11_LIB, LunaCapabilityProvider};

const SLOT_ID: usize = 0; // first Luna partition

fn cfg() -> HResult<shared::HsmTestConfig> {
    let user_password = get_hsm_password()?;
    let slot = get_hsm_slot_id().unwrap_or(SLOT_ID);
    Ok(shared::HsmTestConfig {
        lib_path: shared::lib_path("LUNA_PKCS11_LIB", LUNA_PKCS11_LIB),
        credentials: HashMap::from([(
            slot,
            Some(Credentials::new(user_password, UserType::CryptoOfficer)),
        )]),
        slot_id_for_tests: slot,
        threads: 4,
    })
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_all() -> HResult<()> {
    test_hsm_luna_get_info()?;
    test_hsm_luna_list_slots()?;
    test_hsm_luna_second_login()?;
    test_hsm_luna_get_mechanisms()?;
    test_hsm_luna_random()?;
    test_hsm_luna_generate_aes_key()?;
    test_hsm_luna_label_cache()?;
    test_hsm_luna_aes_encrypt()?;
    test_hsm_luna_rsa_oaep_encrypt()?;
    test_hsm_luna_rsa_sign()?;
    test_hsm_luna_ecdsa_sign()?;
    test_hsm_luna_aes_cmac_sign()?;
    test_hsm_luna_aes_key_wrap()?;
    test_hsm_luna_aes_wrap_aes_key()?;
    test_hsm_luna_copy_object()?;
    test_hsm_luna_rsa_unwrap_template()?;
    test_hsm_luna_list_objects()?;
    test_hsm_luna_multi_threaded_sign()?;
    test_hsm_luna_import_known_key()?;
    test_hsm_luna_usage_limit()?;
    test_hsm_luna_derive_keys()?;
    test_hsm_luna_partition_configuration()?;
    Ok(())
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_get_info() -> HResult<()> {
    shared::get_info::<LunaCapabilityProvider>(&cfg()?)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_list_slots() -> HResult<()> {
    shared::list_slots_and_find_by_label::<LunaCapabilityProvider>(&cfg()?)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_get_mechanisms() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::get_mechanisms(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_random() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::random(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_generate_aes_key() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::generate_aes_key_and_relabel(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_aes_encrypt() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::aes_encrypt(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_rsa_oaep_encrypt() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::rsa_oaep_encrypt(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_rsa_sign() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::rsa_sign(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_ecdsa_sign() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::ecdsa_sign(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_aes_cmac_sign() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::aes_cmac_sign(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_aes_key_wrap() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::aes_key_wrap_rsa_private_key(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_copy_object() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::copy_object(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_rsa_unwrap_template() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::rsa_unwrap_template(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_list_objects() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::list_objects(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_multi_threaded_sign() -> HResult<()> {
    let cfg = cfg()?;
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg)?;
    shared::multi_threaded_sign(&slot, cfg.threads)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_import_known_key() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::import_known_aes_key(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_usage_limit() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::usage_limit(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_derive_keys() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::derive_keys(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_partition_configuration() -> HResult<()> {
    let cfg = cfg()?;
    let hsm = shared::instantiate::<LunaCapabilityProvider>(&cfg)?;
    shared::partition_configuration(&hsm, cfg.slot_id_for_tests)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_second_login() -> HResult<()> {
    shared::second_login_keeps_the_first::<LunaCapabilityProvider>(&cfg()?)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_label_cache() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::label_cache_holds_live_token_objects(&slot)
}

#[test]
#[ignore = "Requires a Luna client library and partition"]
fn test_hsm_luna_aes_wrap_aes_key() -> HResult<()> {
    let slot = shared::instantiate_and_get_slot::<LunaCapabilityProvider>(&cfg()?)?;
    shared::aes_wrap_aes_key(
        &slot,
        &Mechanism::AesKw {
            iv: [1, 2, 3, 4, 5, 6, 7, 8],
        },
    )
}
