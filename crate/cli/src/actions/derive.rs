use clap::{Parser, Subcommand};
use p11_base_hsm::{AesKeySize, AesKeySpec, EcCurve, EcKeyPairSpec, Mechanism};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    actions::{P11Context, PLAINTEXT, check_round_trip, console::Stdout},
    error::result::CliResult,
};

pub const ECDH_SHARED_DATA: &[u8] = b"0011235813213455";
pub const ECDH_CHECK_IV: [u8; 16] = *b"1234abcd1234abcd";
pub const PBKDF2_SALT: &[u8] = b"HelloHolaNamasteySalamKonichiwaNihao";
pub const PBKDF2_PASSWORD: &str = "Th3W0rld$M0$+$3cur3P@$$w0rd";
pub const PBKDF2_ITERATIONS: u32 = 1000;
pub const KDF_BASE_KEY_LABEL: &str = "MasterKey_DELETE_ME";
pub const KDF_LABEL: &[u8] = b"12345678";
pub const KDF_CONTEXT: &[u8] = b"12345678";

/// Derive AES-256 keys
#[derive(Subcommand)]
pub enum DeriveCommands {
    /// Two P-384 key pairs derive the same AES-256 key with `CKM_ECDH1_DERIVE`
    Ecdh(EcdhAction),
    /// Generate an AES-256 key from a password with `CKM_PKCS5_PBKD2`
    Pbkdf2(Pbkdf2Action),
    /// Derive an AES-256 key from a base key with the Luna `CKM_NIST_PRF_KDF`
    NistPrfKdf(NistPrfKdfAction),
}

impl DeriveCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::Ecdh(action) => action.run(ctx),
            Self::Pbkdf2(action) => action.run(ctx),
            Self::NistPrfKdf(action) => action.run(ctx),
        }
    }
}

/// Generate two P-384 key pairs, derive an AES-256 key on each side from the
/// other side's public point, then encrypt with one key and decrypt with the
/// other (`CKM_AES_CBC_PAD`)
#[derive(Parser, Debug, Default)]
pub struct EcdhAction {}

impl EcdhAction {
    /// # Errors
    /// Fails if a key cannot be generated or derived, or if the two derived
    /// keys differ.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let spec = EcKeyPairSpec {
            curve: EcCurve::P384,
            sign_verify: false,
            derive: true,
            ..EcKeyPairSpec::default()
        };
        let (public_a, private_a) = session.generate_ec_key_pair(&spec)?;
        let (public_b, private_b) = session.generate_ec_key_pair(&spec)?;
        let point_a = session.get_ec_point(public_a)?;
        let point_b = session.get_ec_point(public_b)?;
        debug!("EC points: {} and {} bytes", point_a.len(), point_b.len());

        let key_a =
            session.ecdh1_derive_aes_key(private_a, &point_b, ECDH_SHARED_DATA, AesKeySize::Aes256)?;
        let key_b =
            session.ecdh1_derive_aes_key(private_b, &point_a, ECDH_SHARED_DATA, AesKeySize::Aes256)?;

        let mechanism = Mechanism::AesCbcPad { iv: ECDH_CHECK_IV };
        let plaintext = PLAINTEXT.as_bytes();
        let ciphertext = session.encrypt(&mechanism, key_a, plaintext)?;
        let decrypted = session.decrypt(&mechanism, key_b, &ciphertext)?;
        check_round_trip("Data decrypted with the second derived key", plaintext, &decrypted)?;

        let mut stdout = Stdout::new(
            "Two P-384 key pairs generated, the AES-256 keys derived by both sides match.",
        );
        stdout.set_handles(&[key_a, key_b]);
        stdout.add_value("Public point A", hex::encode(&point_a));
        stdout.add_value("Public point B", hex::encode(&point_b));
        stdout.add_value("Encrypted with key A", hex::encode(&ciphertext));
        stdout.add_value("Decrypted with key B", String::from_utf8_lossy(&decrypted));
        ctx.write(&stdout)
    }
}

/// Generate an AES-256 key from a password, a salt and 1000 iterations of
/// HMAC-SHA1
#[derive(Parser, Debug, Default)]
pub struct Pbkdf2Action {
    /// The password; the sample password is used if not given
    #[clap(long, short = 'p', env = "P11_PBKDF2_PASSWORD", hide_env_values = true)]
    pub kdf_password: Option<String>,

    /// The number of iterations
    #[clap(long, short = 'i', default_value_t = PBKDF2_ITERATIONS)]
    pub iterations: u32,
}

impl Pbkdf2Action {
    /// # Errors
    /// Fails if the token does not support `CKM_PKCS5_PBKD2`.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let password = Zeroizing::new(
            self.kdf_password
                .clone()
                .unwrap_or_else(|| PBKDF2_PASSWORD.to_owned()),
        );
        let session = ctx.session()?;
        let key = session.pbkdf2_generate_aes_key(
            password.as_bytes(),
            PBKDF2_SALT,
            self.iterations.into(),
            AesKeySize::Aes256,
        )?;
        let mut stdout = Stdout::new("AES-256 key generated with CKM_PKCS5_PBKD2.");
        stdout.set_handle(key);
        stdout.add_value("Salt", String::from_utf8_lossy(PBKDF2_SALT));
        stdout.add_value("Iterations", self.iterations);
        ctx.write(&stdout)
    }
}

/// Generate a base AES-256 key labelled `MasterKey_DELETE_ME` and derive an
/// AES-256 key from it in counter mode with an AES-CMAC PRF
#[derive(Parser, Debug, Default)]
pub struct NistPrfKdfAction {
    /// Store the base key on the token instead of the session
    #[clap(long, default_value = "false")]
    pub token: bool,
}

impl NistPrfKdfAction {
    /// # Errors
    /// Fails if the library is not a Luna library or the derivation fails.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let base_key = session.generate_aes_key(&AesKeySpec {
            label: Some(KDF_BASE_KEY_LABEL.to_owned()),
            token: self.token,
            modifiable: false,
            encrypt: false,
            decrypt: false,
            derive: true,
            ..AesKeySpec::new(AesKeySize::Aes256)
        })?;
        let key =
            session.nist_prf_kdf_derive(base_key, KDF_LABEL, KDF_CONTEXT, AesKeySize::Aes256)?;
        let mut stdout = Stdout::new("Base key generated, AES-256 key derived with CKM_NIST_PRF_KDF.");
        stdout.add_value("Base key handle", base_key);
        stdout.set_handle(key);
        ctx.write(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::{ECDH_SHARED_DATA, KDF_CONTEXT, KDF_LABEL, PBKDF2_PASSWORD, PBKDF2_SALT};

    #[test]
    fn derivation_inputs_are_bare_strings() {
        for (input, len) in [
            (ECDH_SHARED_DATA, 16),
            (PBKDF2_SALT, 36),
            (PBKDF2_PASSWORD.as_bytes(), 27),
            (KDF_LABEL, 8),
            (KDF_CONTEXT, 8),
        ] {
            assert_eq!(input.len(), len);
            assert!(!input.contains(&0));
        }
    }
}
