//! Shared HSM test suite used by the loader crates to avoid duplication.
//! Each loader crate provides a small config and delegates to these helpers.
#![allow(clippy::panic_in_result_fn)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

use std::{collections::HashMap, sync::Arc, thread};

use cosmian_pkcs11_sys::{
    CK_OBJECT_HANDLE, CKA_DECRYPT, CKA_EXTRACTABLE, CKA_LABEL, CKA_MODIFIABLE, CKA_SENSITIVE,
    CKA_UNWRAP, CKK_AES, CKK_RSA, CKM_AES_GCM, CKO_PRIVATE_KEY, CKO_SECRET_KEY,
};
use p11_logger::{debug, info, log_init};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    AesKeySize, AesKeySpec, BaseHsm, Credentials, EcCurve, EcKeyPairSpec, HError, HResult,
    HashAlgorithm, Mechanism, ObjectFilter, PoolConfig, RetryConfig, RsaKeyPairSpec, Session,
    SessionPool, SlotManager, SlotSelector, Template, hsm_capabilities::HsmProvider,
    mechanisms::mechanism_display, unwrapped_secret_key_template,
};

const PLAINTEXT: &[u8] = b"Earth is the third planet of our Solar System.";
const MESSAGE: &[u8] = b"Hello World, I've been waiting for the chance to see your face.";

/// Per-HSM configuration for shared tests
#[derive(Debug)]
pub struct HsmTestConfig {
    pub lib_path: String,
    pub credentials: HashMap<usize, Option<Credentials>>, // for BaseHsm::instantiate
    pub slot_id_for_tests: usize,                         // slot to use
    pub threads: usize,                                   // number of threads for MT test
}

/// The library path from `env_var`, or `default` when it is not set
#[must_use]
pub fn lib_path(env_var: &str, default: &str) -> String {
    std::env::var(env_var).unwrap_or_else(|_| default.to_owned())
}

pub fn instantiate<P: HsmProvider>(cfg: &HsmTestConfig) -> HResult<BaseHsm<P>> {
    info!("instantiating hsm");
    BaseHsm::<P>::instantiate(&cfg.lib_path, cfg.credentials.clone())
}

pub fn get_slot<P: HsmProvider>(hsm: &BaseHsm<P>, cfg: &HsmTestConfig) -> HResult<Arc<SlotManager>> {
    debug!("Getting available slot list");
    let slots = hsm.get_available_slot_list(true)?;
    info!("Available slots: {:?}", slots);
    if !slots.contains(&cfg.slot_id_for_tests) {
        return Err(HError::Default(format!(
            "Configured slot {} is not available in {:?}",
            cfg.slot_id_for_tests, slots
        )));
    }
    debug!("HSM Test configuration: {cfg:#?}");
    hsm.get_slot(cfg.slot_id_for_tests)
}

/// Instantiate the HSM and return a slot manager for the configured slot id.
pub fn instantiate_and_get_slot<P: HsmProvider>(cfg: &HsmTestConfig) -> HResult<Arc<SlotManager>> {
    let hsm: BaseHsm<P> = instantiate(cfg)?;
    get_slot(&hsm, cfg)
}

pub fn get_info<P: HsmProvider>(cfg: &HsmTestConfig) -> HResult<()> {
    log_init(None);
    let hsm = BaseHsm::<P>::instantiate(&cfg.lib_path, HashMap::new())?;
    let info = hsm.get_info()?;
    info!("Connected to the HSM: {info}");
    assert!(!info.manufacturer_id.is_empty());
    Ok(())
}

pub fn list_slots_and_find_by_label<P: HsmProvider>(cfg: &HsmTestConfig) -> HResult<()> {
    log_init(None);
    let hsm = BaseHsm::<P>::instantiate(&cfg.lib_path, HashMap::new())?;
    let slots = hsm.get_available_slot_list(true)?;
    assert!(slots.contains(&cfg.slot_id_for_tests));
    for slot_id in &slots {
        let slot_info = hsm.get_slot_info(*slot_id)?;
        assert!(slot_info.token_present);
        info!("{}", hsm.get_token_info(*slot_id)?);
    }
    let label = hsm.get_token_info(cfg.slot_id_for_tests)?.label;
    let found = hsm.find_slot(&SlotSelector::Label(label.clone()))?;
    assert_eq!(hsm.get_token_info(found)?.label, label);
    let missing = format!("no-such-token-{}", Uuid::new_v4());
    let err = hsm
        .find_slot(&SlotSelector::Label(missing.clone()))
        .unwrap_err();
    assert_eq!(err.to_string(), format!("slot '{missing}' not found"));

    assert_eq!(
        hsm.find_slot(&SlotSelector::Id(cfg.slot_id_for_tests))?,
        cfg.slot_id_for_tests
    );
    let absent = slots.iter().max().copied().unwrap_or_default() + 1000;
    let err = hsm.find_slot(&SlotSelector::Id(absent)).unwrap_err();
    assert!(err.to_string().starts_with(&format!("slot {absent} not present")));
    Ok(())
}

pub fn second_login_keeps_the_first<P: HsmProvider>(cfg: &HsmTestConfig) -> HResult<()> {
    log_init(None);
    let hsm = instantiate::<P>(cfg)?;
    let slot = get_slot(&hsm, cfg)?;
    let credentials = cfg
        .credentials
        .get(&cfg.slot_id_for_tests)
        .cloned()
        .flatten()
        .ok_or_else(|| HError::Default("no credentials for the test slot".to_owned()))?;
    // the application is already logged in: this login is reused
    let second = SlotManager::instantiate(
        hsm.hsm_lib.clone(),
        cfg.slot_id_for_tests,
        Some(&credentials),
        P::capabilities(),
    )?;
    assert!(second.is_logged_in());
    drop(second);

    // private objects still need the first login
    let session = slot.open_session(true)?;
    let key = session.generate_aes_key(&AesKeySpec::default())?;
    session.destroy_object(key)?;
    Ok(())
}

pub fn get_mechanisms(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let mut mechanisms = slot.get_supported_mechanisms()?;
    mechanisms.sort_unstable();
    assert!(mechanisms.contains(&CKM_AES_GCM));
    for mechanism in mechanisms.iter().take(5) {
        debug!("{}", mechanism_display(*mechanism));
    }
    let gcm = slot.get_mechanism_info(CKM_AES_GCM)?;
    info!("CKM_AES_GCM info: {gcm}");
    assert!(gcm.encrypt && gcm.decrypt);
    Ok(())
}

pub fn random(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(false)?;
    session.seed_random(b"some additional seed material")?;
    let first = session.generate_random(32)?;
    let second = session.generate_random(32)?;
    assert_eq!(first.len(), 32);
    assert_ne!(first, second);
    Ok(())
}

pub fn destroy_all(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let objects = session.list_objects(ObjectFilter::Any)?;
    for object in &objects {
        session.destroy_object(*object)?;
    }
    let objects = session.list_objects(ObjectFilter::Any)?;
    assert_eq!(objects.len(), 0);
    info!("Destroyed all objects");
    Ok(())
}

pub fn generate_aes_key_and_relabel(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let label = Uuid::new_v4().to_string();
    let key = session.generate_aes_key(&AesKeySpec {
        label: Some(label.clone()),
        token: true,
        ..AesKeySpec::default()
    })?;
    // served by the cache, then by a search
    assert_eq!(session.get_object_handle(&label)?, key);
    session.object_handles_cache().clear()?;
    assert_eq!(session.get_object_handle(&label)?, key);
    assert_eq!(session.get_label(key)?, Some(label.clone()));
    let attributes = session
        .get_attributes(key, &[CKA_SENSITIVE, CKA_EXTRACTABLE, CKA_MODIFIABLE, CKA_LABEL])?
        .ok_or_else(|| HError::Default("key not found".to_owned()))?;
    assert_eq!(attributes.get_bool(CKA_SENSITIVE), Some(true));
    assert_eq!(attributes.get_bool(CKA_EXTRACTABLE), Some(false));
    assert_eq!(attributes.get_string(CKA_LABEL), Some(label.clone()));

    let new_label = Uuid::new_v4().to_string();
    session.set_label(key, &new_label)?;
    assert_eq!(session.find_object(&label)?, None);
    assert_eq!(session.get_object_handle(&new_label)?, key);
    session.destroy_object(key)?;
    assert_eq!(session.find_object(&new_label)?, None);
    Ok(())
}

pub fn label_cache_holds_live_token_objects(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let cache = slot.object_handles_cache();
    let session_label = Uuid::new_v4().to_string();
    {
        let creator = slot.open_session(true)?;
        let key = creator.generate_aes_key(&AesKeySpec {
            label: Some(session_label.clone()),
            ..AesKeySpec::default()
        })?;
        assert_eq!(creator.find_object(&session_label)?, Some(key));
        assert_eq!(cache.get(session_label.as_bytes())?, None);
    }
    // the session key is gone with its session
    let session = slot.open_session(true)?;
    assert_eq!(session.find_object(&session_label)?, None);

    let token_label = Uuid::new_v4().to_string();
    let key = session.generate_aes_key(&AesKeySpec {
        label: Some(token_label.clone()),
        token: true,
        ..AesKeySpec::default()
    })?;
    cache.clear()?;
    assert_eq!(session.find_object(&token_label)?, Some(key));
    assert_eq!(cache.get(token_label.as_bytes())?, Some(key));

    // an entry left behind by a destroyed object is dropped on lookup
    session.destroy_object(key)?;
    cache.insert(token_label.as_bytes().to_vec(), key)?;
    assert_eq!(session.find_object(&token_label)?, None);
    assert_eq!(cache.get(token_label.as_bytes())?, None);
    Ok(())
}

pub fn aes_encrypt(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let key = session.generate_aes_key(&AesKeySpec::default())?;
    let block_aligned = [0x5A_u8; 32];
    let iv = *b"1234567812345678";
    let mechanisms = [
        (Mechanism::AesEcb, &block_aligned[..]),
        (Mechanism::AesCbcPad { iv }, PLAINTEXT),
        (Mechanism::aes_ctr([0x31; 16]), PLAINTEXT),
        (Mechanism::aes_gcm(b"123456781234", b"127.0.0.1"), PLAINTEXT),
    ];
    for (mechanism, data) in &mechanisms {
        let ciphertext = session.encrypt(mechanism, key, data)?;
        assert_ne!(ciphertext.as_slice(), *data);
        let plaintext = session.decrypt(mechanism, key, &ciphertext)?;
        assert_eq!(plaintext.as_slice(), *data, "{mechanism:?}");
    }
    info!("Successfully encrypted/decrypted with AES ECB, CBC-PAD, CTR and GCM");
    Ok(())
}

pub fn rsa_oaep_encrypt(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec::default())?;
    let mechanism = Mechanism::RsaOaep {
        hash: HashAlgorithm::Sha256,
        source: &[],
    };
    let ciphertext = session.encrypt(&mechanism, public_key, PLAINTEXT)?;
    assert_eq!(ciphertext.len(), 2048 / 8);
    let plaintext = session.decrypt(&mechanism, private_key, &ciphertext)?;
    assert_eq!(plaintext.as_slice(), PLAINTEXT);
    Ok(())
}

fn sign_and_verify(
    session: &Session,
    mechanism: &Mechanism<'_>,
    signing_key: CK_OBJECT_HANDLE,
    verifying_key: CK_OBJECT_HANDLE,
    data: &[u8],
) -> HResult<()> {
    let signature = session.sign(mechanism, signing_key, data)?;
    assert!(session.verify(mechanism, verifying_key, data, &signature)?);
    let mut tampered = signature;
    if let Some(byte) = tampered.first_mut() {
        *byte ^= 0x01;
    }
    assert!(!session.verify(mechanism, verifying_key, data, &tampered)?);
    Ok(())
}

pub fn rsa_sign(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec::default())?;
    for mechanism in [
        Mechanism::Sha256RsaPkcs,
        Mechanism::Sha256RsaPkcsPss { salt_len: 32 },
    ] {
        sign_and_verify(&session, &mechanism, private_key, public_key, MESSAGE)?;
    }
    Ok(())
}

pub fn ecdsa_sign(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let (public_key, private_key) = session.generate_ec_key_pair(&EcKeyPairSpec {
        curve: EcCurve::P256,
        ..EcKeyPairSpec::default()
    })?;
    let digest = session.digest(&Mechanism::Digest(HashAlgorithm::Sha256), MESSAGE)?;
    assert_eq!(digest.len(), HashAlgorithm::Sha256.output_len());
    sign_and_verify(&session, &Mechanism::Ecdsa, private_key, public_key, &digest)
}

pub fn aes_cmac_sign(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let key = session.generate_aes_key(&AesKeySpec {
        encrypt: false,
        decrypt: false,
        sign_verify: true,
        ..AesKeySpec::default()
    })?;
    sign_and_verify(&session, &Mechanism::AesCmac, key, key, MESSAGE)
}

pub fn aes_key_wrap_rsa_private_key(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let wrapping_key = session.generate_aes_key(&AesKeySpec {
        wrap: true,
        unwrap: true,
        ..AesKeySpec::default()
    })?;
    let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
        private_extractable: true,
        ..RsaKeyPairSpec::default()
    })?;
    let wrapped = session.wrap_key(&Mechanism::AesKeyWrapPad, wrapping_key, private_key)?;
    info!("Wrapped RSA private key: {} bytes", wrapped.len());
    let unwrapped = session.unwrap_key(
        &Mechanism::AesKeyWrapPad,
        wrapping_key,
        &wrapped,
        &Template::new()
            .class(CKO_PRIVATE_KEY)
            .key_type(CKK_RSA)
            .token(false)
            .private(true)
            .sensitive(true)
            .sign(true)
            .decrypt(true),
    )?;
    sign_and_verify(
        &session,
        &Mechanism::Sha256RsaPkcs,
        unwrapped,
        public_key,
        MESSAGE,
    )
}

/// Wrap an AES-256 key with an AES-256 key, unwrap it and decrypt with the
/// unwrapped key what the original key encrypted
pub fn aes_wrap_aes_key(slot: &Arc<SlotManager>, mechanism: &Mechanism<'_>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let wrapping_key = session.generate_aes_key(&AesKeySpec {
        encrypt: false,
        decrypt: false,
        wrap: true,
        unwrap: true,
        ..AesKeySpec::default()
    })?;
    let key = session.generate_aes_key(&AesKeySpec {
        extractable: true,
        ..AesKeySpec::default()
    })?;
    let wrapped = session.wrap_key(mechanism, wrapping_key, key)?;
    // RFC 3394 adds one 64-bit block
    assert_eq!(wrapped.len(), 32 + 8);
    let unwrapped = session.unwrap_key(
        mechanism,
        wrapping_key,
        &wrapped,
        &unwrapped_secret_key_template(CKK_AES, AesKeySize::Aes256.byte_len()),
    )?;
    assert_ne!(unwrapped, key);
    let cbc = Mechanism::AesCbcPad {
        iv: *b"1234567812345678",
    };
    let ciphertext = session.encrypt(&cbc, key, PLAINTEXT)?;
    assert_eq!(session.decrypt(&cbc, unwrapped, &ciphertext)?.as_slice(), PLAINTEXT);
    Ok(())
}

pub fn copy_object(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let key = session.generate_aes_key(&AesKeySpec {
        extractable: true,
        wrap: true,
        unwrap: true,
        ..AesKeySpec::default()
    })?;
    let copy = session.copy_object(
        key,
        &Template::new()
            .decrypt(false)
            .unwrap(false)
            .extractable(false)
            .modifiable(false),
    )?;
    assert_ne!(copy, key);
    assert_eq!(session.get_bool_attribute(key, CKA_DECRYPT)?, Some(true));
    assert_eq!(session.get_bool_attribute(copy, CKA_DECRYPT)?, Some(false));
    assert_eq!(session.get_bool_attribute(copy, CKA_UNWRAP)?, Some(false));
    assert_eq!(session.get_bool_attribute(copy, CKA_EXTRACTABLE)?, Some(false));
    Ok(())
}

pub fn rsa_unwrap_template(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let unwrap_template = Template::new().token(true).encrypt(true).decrypt(true);
    let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
        wrap_unwrap: true,
        unwrap_template: Some(unwrap_template),
        ..RsaKeyPairSpec::default()
    })?;
    let aes_key = session.generate_aes_key(&AesKeySpec {
        extractable: true,
        ..AesKeySpec::default()
    })?;
    let oaep = Mechanism::RsaOaep {
        hash: HashAlgorithm::Sha256,
        source: &[],
    };
    let wrapped = session.wrap_key(&oaep, public_key, aes_key)?;
    let label = Uuid::new_v4().to_string();
    let unwrapped = session.unwrap_key(
        &oaep,
        private_key,
        &wrapped,
        &Template::new()
            .class(CKO_SECRET_KEY)
            .key_type(CKK_AES)
            .token(true)
            .encrypt(true)
            .decrypt(true)
            .value_len(AesKeySize::Aes256.byte_len())
            .label(&label),
    )?;
    assert_eq!(session.get_object_handle(&label)?, unwrapped);
    let ciphertext = session.encrypt(&Mechanism::AesEcb, aes_key, &[0x42; 16])?;
    assert_eq!(
        session
            .decrypt(&Mechanism::AesEcb, unwrapped, &ciphertext)?
            .as_slice(),
        &[0x42; 16]
    );
    session.destroy_object(unwrapped)?;
    Ok(())
}

pub fn list_objects(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let label = Uuid::new_v4().to_string();
    let key = session.generate_aes_key(&AesKeySpec {
        label: Some(label),
        token: true,
        ..AesKeySpec::default()
    })?;
    let secret_keys = session.list_objects(ObjectFilter::SecretKey)?;
    assert!(secret_keys.contains(&key));
    let private_keys = session.list_objects(ObjectFilter::PrivateKey)?;
    assert!(!private_keys.contains(&key));
    session.destroy_object(key)?;
    assert!(!session.list_objects(ObjectFilter::SecretKey)?.contains(&key));
    Ok(())
}

pub fn multi_threaded_sign(slot: &Arc<SlotManager>, threads: usize) -> HResult<()> {
    log_init(None);
    let pool = SessionPool::new(
        slot.clone(),
        &PoolConfig {
            max_sessions: u32::try_from(threads)?,
            ..PoolConfig::default()
        },
        RetryConfig::default(),
    )?;
    let label = Uuid::new_v4().to_string();
    let (public_key, private_key) = pool.with_session("generate key pair", |session| {
        session.generate_rsa_key_pair(&RsaKeyPairSpec {
            label: Some(label.clone()),
            token: true,
            ..RsaKeyPairSpec::default()
        })
    })?;

    let mut handles = vec![];
    for i in 0..threads {
        let pool = pool.clone();
        let handle = thread::spawn(move || {
            for j in 0..4 {
                let message = format!("message {j} of thread {i}");
                pool.with_session("sign", |session| {
                    let signature =
                        session.sign(&Mechanism::Sha256RsaPkcs, private_key, message.as_bytes())?;
                    assert!(session.verify(
                        &Mechanism::Sha256RsaPkcs,
                        public_key,
                        message.as_bytes(),
                        &signature
                    )?);
                    Ok(())
                })?;
            }
            Ok::<(), HError>(())
        });
        handles.push(handle);
    }

    for handle in handles {
        handle
            .join()
            .map_err(|e| HError::Default(format!("Thread panicked: {e:?}")))??;
    }
    let state = pool.state();
    assert!(state.connections <= u32::try_from(threads)?);
    pool.with_session("destroy key pair", |session| {
        session.destroy_object(public_key)?;
        session.destroy_object(private_key)
    })?;
    info!("Successfully signed from {threads} threads through the session pool");
    Ok(())
}

// Luna only

pub fn import_known_aes_key(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let clear_key = Zeroizing::new(vec![
        0x10, 0xaa, 0x32, 0x56, 0xa1, 0x87, 0xF1, 0x63, 0x82, 0xd3, 0x4d, 0x95, 0xac, 0x76, 0x01,
        0x63,
    ]);
    let imported = session.import_known_aes_key(&clear_key)?;
    let ciphertext = session.encrypt(&Mechanism::AesEcb, imported.key, &[0_u8; 16])?;
    let plaintext = session.decrypt(&Mechanism::AesEcb, imported.key, &ciphertext)?;
    assert_eq!(plaintext.as_slice(), &[0_u8; 16]);
    Ok(())
}

pub fn usage_limit(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let key = session.generate_aes_key(&AesKeySpec {
        usage_limit: Some(3),
        ..AesKeySpec::default()
    })?;
    let mechanism = Mechanism::AesCbcPad {
        iv: *b"1234567812345678",
    };
    let mut uses = 0;
    loop {
        match session.encrypt(&mechanism, key, PLAINTEXT) {
            Ok(_) => uses += 1,
            Err(e) if e.is_key_exhausted() => break,
            Err(e) => return Err(e),
        }
        assert_eq!(session.usage_count(key)?, Some(uses));
    }
    assert_eq!(uses, 3);
    Ok(())
}

pub fn derive_keys(slot: &Arc<SlotManager>) -> HResult<()> {
    log_init(None);
    let session = slot.open_session(true)?;
    let iv = *b"1234abcd1234abcd";
    let spec = EcKeyPairSpec {
        derive: true,
        ..EcKeyPairSpec::default()
    };
    let (alice_public, alice_private) = session.generate_ec_key_pair(&spec)?;
    let (bob_public, bob_private) = session.generate_ec_key_pair(&spec)?;
    let shared_data = b"0011235813213455";
    let alice_key = session.ecdh1_derive_aes_key(
        alice_private,
        &session.get_ec_point(bob_public)?,
        shared_data,
        AesKeySize::Aes256,
    )?;
    let bob_key = session.ecdh1_derive_aes_key(
        bob_private,
        &session.get_ec_point(alice_public)?,
        shared_data,
        AesKeySize::Aes256,
    )?;
    let ciphertext = session.encrypt(&Mechanism::AesCbcPad { iv }, alice_key, PLAINTEXT)?;
    let plaintext = session.decrypt(&Mechanism::AesCbcPad { iv }, bob_key, &ciphertext)?;
    assert_eq!(plaintext.as_slice(), PLAINTEXT);

    let pbkdf2_key = session.pbkdf2_generate_aes_key(
        b"Th3W0rld$M0$+$3cur3P@$$w0rd",
        b"HelloHolaNamasteySalamKonichiwaNihao",
        1000,
        AesKeySize::Aes256,
    )?;
    session.encrypt(&Mechanism::AesCbcPad { iv }, pbkdf2_key, PLAINTEXT)?;

    let base_key = session.generate_aes_key(&AesKeySpec {
        derive: true,
        ..AesKeySpec::default()
    })?;
    let derived = session.nist_prf_kdf_derive(base_key, b"12345678", b"12345678", AesKeySize::Aes256)?;
    session.encrypt(&Mechanism::AesCbcPad { iv }, derived, PLAINTEXT)?;
    Ok(())
}

pub fn partition_configuration<P: HsmProvider>(hsm: &BaseHsm<P>, slot_id: usize) -> HResult<()> {
    log_init(None);
    let capabilities = hsm.token_capabilities(slot_id)?;
    assert!(!capabilities.is_empty());
    let policies = hsm.token_policies(slot_id)?;
    for policy in &policies {
        debug!("policy {} = {}: {}", policy.id, policy.value, policy.description);
    }
    Ok(())
}
