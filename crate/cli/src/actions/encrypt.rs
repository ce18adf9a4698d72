use clap::{Parser, Subcommand};
use p11_base_hsm::{
    AES_BLOCK_SIZE, AesKeySize, AesKeySpec, HashAlgorithm, Mechanism, RsaKeyPairSpec,
};
use tracing::debug;

use crate::{
    actions::{AES_CBC_IV, P11Context, PLAINTEXT, check_round_trip, console::Stdout},
    cli_ensure,
    error::result::CliResult,
};

/// Single block plaintext of the ECB sample
pub const ECB_PLAINTEXT: &str = "1234567812345678";
pub const GCM_IV: &[u8] = b"123456781234";
pub const GCM_AAD: &[u8] = b"127.0.0.1";
pub const CTR_COUNTER_BLOCK: [u8; AES_BLOCK_SIZE] = [0x31; AES_BLOCK_SIZE];
pub const DES3_IV: [u8; 8] = *b"12345678";
pub const OAEP_SOURCE: &[u8] = b"HelloWorld";

/// Generate a session key, encrypt a plaintext, decrypt it and compare
#[derive(Subcommand)]
pub enum EncryptCommands {
    /// AES-256 in counter mode (`CKM_AES_CTR`)
    AesCtr(EncryptAction),
    /// AES-256 GCM with a 96-bit IV, AAD and a 128-bit tag (`CKM_AES_GCM`)
    AesGcm(EncryptAction),
    /// AES-256 CBC with PKCS#7 padding (`CKM_AES_CBC_PAD`)
    AesCbc(EncryptAction),
    /// AES-256 ECB without padding (`CKM_AES_ECB`); the plaintext must be a
    /// multiple of 16 bytes
    AesEcb(EncryptAction),
    /// Triple DES CBC with padding (`CKM_DES3_CBC_PAD`)
    Des3CbcPad(EncryptAction),
    /// RSA-2048 OAEP with SHA-256 (`CKM_RSA_PKCS_OAEP`)
    RsaOaep(EncryptAction),
}

#[derive(Parser, Debug, Default)]
pub struct EncryptAction {
    /// The data to encrypt
    #[clap(long, short = 'd')]
    pub plaintext: Option<String>,
}

impl EncryptCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::AesCtr(action) => {
                action.aes(ctx, "CKM_AES_CTR", &Mechanism::aes_ctr(CTR_COUNTER_BLOCK))
            }
            Self::AesGcm(action) => {
                action.aes(ctx, "CKM_AES_GCM", &Mechanism::aes_gcm(GCM_IV, GCM_AAD))
            }
            Self::AesCbc(action) => action.aes(
                ctx,
                "CKM_AES_CBC_PAD",
                &Mechanism::AesCbcPad { iv: AES_CBC_IV },
            ),
            Self::AesEcb(action) => action.aes_ecb(ctx),
            Self::Des3CbcPad(action) => action.des3(ctx),
            Self::RsaOaep(action) => action.rsa_oaep(ctx),
        }
    }
}

impl EncryptAction {
    fn plaintext<'a>(&'a self, default: &'a str) -> &'a [u8] {
        self.plaintext.as_deref().unwrap_or(default).as_bytes()
    }

    fn aes(&self, ctx: &P11Context, name: &str, mechanism: &Mechanism<'_>) -> CliResult<()> {
        self.aes_with(ctx, name, mechanism, self.plaintext(PLAINTEXT))
    }

    fn aes_ecb(&self, ctx: &P11Context) -> CliResult<()> {
        let plaintext = self.plaintext(ECB_PLAINTEXT);
        cli_ensure!(
            !plaintext.is_empty() && plaintext.len() % AES_BLOCK_SIZE == 0,
            "AES-ECB without padding needs a multiple of {} bytes, got {}",
            AES_BLOCK_SIZE,
            plaintext.len()
        );
        self.aes_with(ctx, "CKM_AES_ECB", &Mechanism::AesEcb, plaintext)
    }

    fn aes_with(
        &self,
        ctx: &P11Context,
        name: &str,
        mechanism: &Mechanism<'_>,
        plaintext: &[u8],
    ) -> CliResult<()> {
        let session = ctx.session()?;
        let key = session.generate_aes_key(&AesKeySpec::new(AesKeySize::Aes256))?;
        debug!("AES-256 key generated with handle {key}");
        let ciphertext = session.encrypt(mechanism, key, plaintext)?;
        let decrypted = session.decrypt(mechanism, key, &ciphertext)?;
        check_round_trip("Decrypted data", plaintext, &decrypted)?;

        let mut stdout = Stdout::new(&format!("AES-256 key generated, data encrypted with {name}."));
        stdout.set_handle(key);
        print_round_trip(&mut stdout, plaintext, &ciphertext, &decrypted);
        ctx.write(&stdout)
    }

    fn des3(&self, ctx: &P11Context) -> CliResult<()> {
        let plaintext = self.plaintext(PLAINTEXT);
        let session = ctx.session()?;
        let key = session.generate_des3_key(None, false, false)?;
        let mechanism = Mechanism::Des3CbcPad { iv: DES3_IV };
        let ciphertext = session.encrypt(&mechanism, key, plaintext)?;
        let decrypted = session.decrypt(&mechanism, key, &ciphertext)?;
        check_round_trip("Decrypted data", plaintext, &decrypted)?;

        let mut stdout = Stdout::new("DES3 key generated, data encrypted with CKM_DES3_CBC_PAD.");
        stdout.set_handle(key);
        print_round_trip(&mut stdout, plaintext, &ciphertext, &decrypted);
        ctx.write(&stdout)
    }

    fn rsa_oaep(&self, ctx: &P11Context) -> CliResult<()> {
        let plaintext = self.plaintext(PLAINTEXT);
        let session = ctx.session()?;
        let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
            sign_verify: false,
            ..RsaKeyPairSpec::default()
        })?;
        let mechanism = Mechanism::RsaOaep {
            hash: HashAlgorithm::Sha256,
            source: OAEP_SOURCE,
        };
        let ciphertext = session.encrypt(&mechanism, public_key, plaintext)?;
        let decrypted = session.decrypt(&mechanism, private_key, &ciphertext)?;
        check_round_trip("Decrypted data", plaintext, &decrypted)?;

        let mut stdout =
            Stdout::new("RSA-2048 key pair generated, data encrypted with CKM_RSA_PKCS_OAEP.");
        stdout.set_key_pair_handles(public_key, private_key);
        print_round_trip(&mut stdout, plaintext, &ciphertext, &decrypted);
        ctx.write(&stdout)
    }
}

fn print_round_trip(stdout: &mut Stdout, plaintext: &[u8], ciphertext: &[u8], decrypted: &[u8]) {
    stdout.add_value("Plaintext", String::from_utf8_lossy(plaintext));
    stdout.add_value("Encrypted", hex::encode(ciphertext));
    stdout.add_value("Decrypted", String::from_utf8_lossy(decrypted));
}
