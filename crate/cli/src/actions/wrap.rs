use clap::{Parser, Subcommand};
use p11_base_hsm::{
    AesKeySize, AesKeySpec, HashAlgorithm, Mechanism, RsaKeyPairSpec, Session, Template,
    reexport::cosmian_pkcs11_sys::{CK_OBJECT_HANDLE, CKK_AES, CKK_RSA, CKO_PRIVATE_KEY},
    unwrapped_secret_key_template,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    actions::{
        AES_CBC_IV, P11Context, PLAINTEXT, check_round_trip, console::Stdout, encrypt::DES3_IV,
        parse_hex,
    },
    cli_ensure,
    error::result::CliResult,
};

pub const AES_KW_IV: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
pub const AES_KWP_IV: [u8; 4] = [1, 2, 3, 3];
pub const KNOWN_KEY: &str = "10 aa 32 56 a1 87 F1 63 82 d3 4d 95 ac 76 01 63";

/// Wrap a key, unwrap it and check the unwrapped key works like the original
#[derive(Subcommand)]
pub enum WrapCommands {
    /// Wrap an AES-256 key with an AES-256 key (`CKM_AES_KW`, RFC 3394) and
    /// decrypt with the unwrapped key what the original key encrypted
    AesKw(AesKwAction),
    /// Wrap an RSA-2048 private key with an AES-256 key (`CKM_AES_KWP`, RFC 5649)
    AesKwp(AesKwpAction),
    /// Wrap an AES-256 key with a DES3 key (`CKM_DES3_CBC_PAD`)
    Des3CbcPad(Des3WrapAction),
    /// Unwrap an AES key with an RSA private key carrying `CKA_UNWRAP_TEMPLATE`
    UnwrapTemplate(UnwrapTemplateAction),
    /// Import a known clear AES key
    CreateKnownKey(CreateKnownKeyAction),
}

impl WrapCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::AesKw(action) => action.run(ctx),
            Self::AesKwp(action) => action.run(ctx),
            Self::Des3CbcPad(action) => action.run(ctx),
            Self::UnwrapTemplate(action) => action.run(ctx),
            Self::CreateKnownKey(action) => action.run(ctx),
        }
    }
}

/// AES-256 session key that wraps and unwraps, and nothing else
fn generate_aes_wrapping_key(session: &Session, label: &str) -> CliResult<CK_OBJECT_HANDLE> {
    Ok(session.generate_aes_key(&AesKeySpec {
        label: Some(label.to_owned()),
        extractable: true,
        modifiable: false,
        encrypt: false,
        decrypt: false,
        wrap: true,
        unwrap: true,
        ..AesKeySpec::new(AesKeySize::Aes256)
    })?)
}

/// Extractable AES-256 session key that encrypts and decrypts
fn generate_extractable_aes_key(session: &Session) -> CliResult<CK_OBJECT_HANDLE> {
    Ok(session.generate_aes_key(&AesKeySpec {
        extractable: true,
        modifiable: false,
        ..AesKeySpec::new(AesKeySize::Aes256)
    })?)
}

/// Encrypt with the original key, decrypt with the unwrapped one
fn check_unwrapped_aes_key(
    session: &Session,
    original: CK_OBJECT_HANDLE,
    unwrapped: CK_OBJECT_HANDLE,
) -> CliResult<()> {
    let mechanism = Mechanism::AesCbcPad { iv: AES_CBC_IV };
    let ciphertext = session.encrypt(&mechanism, original, PLAINTEXT.as_bytes())?;
    let decrypted = session.decrypt(&mechanism, unwrapped, &ciphertext)?;
    check_round_trip("Data decrypted with the unwrapped key", PLAINTEXT.as_bytes(), &decrypted)
}

#[derive(Parser, Debug, Default)]
pub struct AesKwAction {}

impl AesKwAction {
    /// # Errors
    /// Fails if a key cannot be generated, wrapped or unwrapped.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let wrapping_key = generate_aes_wrapping_key(&session, "WRAPPING_KEY")?;
        let key = generate_extractable_aes_key(&session)?;
        let mechanism = Mechanism::AesKw { iv: AES_KW_IV };
        let wrapped = session.wrap_key(&mechanism, wrapping_key, key)?;
        let unwrapped = session.unwrap_key(
            &mechanism,
            wrapping_key,
            &wrapped,
            &unwrapped_secret_key_template(CKK_AES, AesKeySize::Aes256.byte_len()),
        )?;
        debug!("AES key {key} unwrapped as {unwrapped}");
        check_unwrapped_aes_key(&session, key, unwrapped)?;

        let mut stdout = Stdout::new("AES-256 key wrapped and unwrapped with CKM_AES_KW.");
        stdout.add_value("Wrapping key handle", wrapping_key);
        stdout.add_value("Wrapped key handle", key);
        stdout.add_value("Wrapped key", hex::encode(&wrapped));
        stdout.set_handle(unwrapped);
        stdout.add_value("Verification", "Data encrypted with the original key decrypted.");
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct AesKwpAction {}

impl AesKwpAction {
    /// # Errors
    /// Fails if a key cannot be generated, wrapped or unwrapped, or if the
    /// unwrapped private key signs differently.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let wrapping_key = generate_aes_wrapping_key(&session, "WRAPPING_KEY")?;
        let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
            private_extractable: true,
            encrypt_decrypt: false,
            ..RsaKeyPairSpec::default()
        })?;
        let mechanism = Mechanism::AesKwp { iv: AES_KWP_IV };
        let wrapped = session.wrap_key(&mechanism, wrapping_key, private_key)?;
        let unwrapped = session.unwrap_key(
            &mechanism,
            wrapping_key,
            &wrapped,
            &Template::new()
                .class(CKO_PRIVATE_KEY)
                .key_type(CKK_RSA)
                .token(false)
                .private(true)
                .sensitive(true)
                .extractable(false)
                .sign(true),
        )?;

        let signing = Mechanism::Sha256RsaPkcs;
        let signature = session.sign(&signing, unwrapped, PLAINTEXT.as_bytes())?;
        let verified = session.verify(&signing, public_key, PLAINTEXT.as_bytes(), &signature)?;
        cli_ensure!(
            verified,
            "The unwrapped private key does not match the original public key"
        );

        let mut stdout =
            Stdout::new("RSA-2048 private key wrapped and unwrapped with CKM_AES_KWP.");
        stdout.add_value("Wrapping key handle", wrapping_key);
        stdout.add_value("Wrapped key handle", private_key);
        stdout.add_value("Wrapped key length", wrapped.len());
        stdout.set_handle(unwrapped);
        stdout.add_value("Verification", "Signature of the unwrapped key verified.");
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct Des3WrapAction {}

impl Des3WrapAction {
    /// # Errors
    /// Fails if a key cannot be generated, wrapped or unwrapped.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let wrapping_key = session.generate_des3_key(None, false, true)?;
        let key = generate_extractable_aes_key(&session)?;
        let mechanism = Mechanism::Des3CbcPad { iv: DES3_IV };
        let wrapped = session.wrap_key(&mechanism, wrapping_key, key)?;
        let unwrapped = session.unwrap_key(
            &mechanism,
            wrapping_key,
            &wrapped,
            &unwrapped_secret_key_template(CKK_AES, AesKeySize::Aes256.byte_len()),
        )?;
        check_unwrapped_aes_key(&session, key, unwrapped)?;

        let mut stdout = Stdout::new("AES-256 key wrapped and unwrapped with CKM_DES3_CBC_PAD.");
        stdout.add_value("Wrapping key handle", wrapping_key);
        stdout.add_value("Wrapped key", hex::encode(&wrapped));
        stdout.set_handle(unwrapped);
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct UnwrapTemplateAction {}

impl UnwrapTemplateAction {
    /// # Errors
    /// Fails if the token does not enforce the unwrap template or a key
    /// operation fails.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let key = generate_extractable_aes_key(&session)?;
        let unwrap_template =
            unwrapped_secret_key_template(CKK_AES, AesKeySize::Aes256.byte_len());
        let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
            private_modifiable: false,
            encrypt_decrypt: false,
            wrap_unwrap: true,
            unwrap_template: Some(unwrap_template.clone()),
            ..RsaKeyPairSpec::default()
        })?;
        let mechanism = Mechanism::RsaOaep {
            hash: HashAlgorithm::Sha256,
            source: &[],
        };
        let wrapped = session.wrap_key(&mechanism, public_key, key)?;
        let unwrapped = session.unwrap_key(&mechanism, private_key, &wrapped, &unwrap_template)?;
        check_unwrapped_aes_key(&session, key, unwrapped)?;

        let mut stdout = Stdout::new(
            "AES-256 key wrapped with CKM_RSA_PKCS_OAEP and unwrapped with the unwrap template.",
        );
        stdout.set_key_pair_handles(public_key, private_key);
        stdout.add_value("Wrapped key length", wrapped.len());
        stdout.add_value("Unwrapped key handle", unwrapped);
        ctx.write(&stdout)
    }
}

/// Import a clear AES key: it is encrypted with a generated import key, then
/// unwrapped into a session key
#[derive(Parser, Debug, Default)]
pub struct CreateKnownKeyAction {
    /// The clear key, hex encoded; 16, 24 or 32 bytes
    #[clap(long, short = 'k', default_value = KNOWN_KEY)]
    pub key: String,
}

impl CreateKnownKeyAction {
    /// # Errors
    /// Fails if the key is not valid hex of an AES key length or the import
    /// fails.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let clear_key = Zeroizing::new(parse_hex(&self.key)?);
        let session = ctx.session()?;
        let imported = session.import_known_aes_key(&clear_key)?;
        let ciphertext = session.encrypt(
            &Mechanism::AesCbcPad { iv: AES_CBC_IV },
            imported.key,
            PLAINTEXT.as_bytes(),
        )?;

        let mut stdout = Stdout::new("Known AES key imported.");
        stdout.add_value("Import key handle", imported.wrapping_key);
        stdout.set_handle(imported.key);
        stdout.add_value("Encrypted with the imported key", hex::encode(&ciphertext));
        ctx.write(&stdout)
    }
}
