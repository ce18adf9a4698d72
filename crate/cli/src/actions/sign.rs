use clap::{Parser, Subcommand};
use p11_base_hsm::{
    AesKeySize, AesKeySpec, EcCurve, EcKeyPairSpec, HashAlgorithm, Mechanism, RsaKeyPairSpec,
    Session, reexport::cosmian_pkcs11_sys::CK_OBJECT_HANDLE,
};

use crate::{
    actions::{P11Context, PLAINTEXT, SIGN_MESSAGE, console::Stdout},
    cli_ensure,
    error::result::CliResult,
};

pub const PSS_SALT_LEN: u32 = 32;

/// Generate key(s), sign a message and verify the signature
#[derive(Subcommand)]
pub enum SignCommands {
    /// secp256k1 `CKM_ECDSA` over a SHA-256 digest computed by the HSM
    Ecdsa(SignAction),
    /// P-384 `CKM_ECDSA_SHA256`
    EcdsaSha256(SignAction),
    /// RSA-2048 `CKM_SHA256_RSA_PKCS_PSS` with a 32 bytes salt
    RsaPss(SignAction),
    /// RSA-2048 `CKM_RSA_X9_31` over a SHA-256 digest and its hash identifier
    RsaX931(SignAction),
    /// AES-256 `CKM_AES_CMAC`
    AesCmac(SignAction),
}

#[derive(Parser, Debug, Default)]
pub struct SignAction {
    /// The message to sign
    #[clap(long, short = 'm')]
    pub message: Option<String>,
}

impl SignCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::Ecdsa(action) => action.ecdsa(ctx),
            Self::EcdsaSha256(action) => action.ecdsa_sha256(ctx),
            Self::RsaPss(action) => action.rsa_pss(ctx),
            Self::RsaX931(action) => action.rsa_x931(ctx),
            Self::AesCmac(action) => action.aes_cmac(ctx),
        }
    }
}

/// Sign `data`, verify the signature and print both
fn sign_and_verify(
    session: &Session,
    mechanism: &Mechanism<'_>,
    signing_key: CK_OBJECT_HANDLE,
    verification_key: CK_OBJECT_HANDLE,
    data: &[u8],
    stdout: &mut Stdout,
) -> CliResult<()> {
    let signature = session.sign(mechanism, signing_key, data)?;
    stdout.add_value("Signature", hex::encode(&signature));
    let verified = session.verify(mechanism, verification_key, data, &signature)?;
    cli_ensure!(verified, "Signature verification failed.");
    stdout.add_value("Verification", "Signature verified.");
    Ok(())
}

impl SignAction {
    fn message<'a>(&'a self, default: &'a str) -> &'a [u8] {
        self.message.as_deref().unwrap_or(default).as_bytes()
    }

    fn ecdsa(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let (public_key, private_key) = session.generate_ec_key_pair(&EcKeyPairSpec {
            curve: EcCurve::Secp256k1,
            ..EcKeyPairSpec::default()
        })?;
        let digest = session.digest(
            &Mechanism::Digest(HashAlgorithm::Sha256),
            self.message(PLAINTEXT),
        )?;
        let mut stdout = Stdout::new("secp256k1 key pair generated, digest signed with CKM_ECDSA.");
        stdout.set_key_pair_handles(public_key, private_key);
        stdout.add_value("SHA-256", hex::encode(&digest));
        sign_and_verify(
            &session,
            &Mechanism::Ecdsa,
            private_key,
            public_key,
            &digest,
            &mut stdout,
        )?;
        ctx.write(&stdout)
    }

    fn ecdsa_sha256(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let (public_key, private_key) = session.generate_ec_key_pair(&EcKeyPairSpec {
            curve: EcCurve::P384,
            ..EcKeyPairSpec::default()
        })?;
        let mut stdout =
            Stdout::new("P-384 key pair generated, message signed with CKM_ECDSA_SHA256.");
        stdout.set_key_pair_handles(public_key, private_key);
        sign_and_verify(
            &session,
            &Mechanism::EcdsaSha256,
            private_key,
            public_key,
            self.message(PLAINTEXT),
            &mut stdout,
        )?;
        ctx.write(&stdout)
    }

    fn rsa_pss(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
            encrypt_decrypt: false,
            ..RsaKeyPairSpec::default()
        })?;
        let mut stdout = Stdout::new(
            "RSA-2048 key pair generated, message signed with CKM_SHA256_RSA_PKCS_PSS.",
        );
        stdout.set_key_pair_handles(public_key, private_key);
        sign_and_verify(
            &session,
            &Mechanism::Sha256RsaPkcsPss {
                salt_len: PSS_SALT_LEN.into(),
            },
            private_key,
            public_key,
            self.message(PLAINTEXT),
            &mut stdout,
        )?;
        ctx.write(&stdout)
    }

    fn rsa_x931(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
            encrypt_decrypt: false,
            ..RsaKeyPairSpec::default()
        })?;
        let hash = HashAlgorithm::Sha256;
        let mut data = session.digest(&Mechanism::Digest(hash), self.message(PLAINTEXT))?;
        data.extend_from_slice(&hash.x931_trailer());
        let mut stdout =
            Stdout::new("RSA-2048 key pair generated, digest signed with CKM_RSA_X9_31.");
        stdout.set_key_pair_handles(public_key, private_key);
        stdout.add_value("SHA-256 and hash id", hex::encode(&data));
        sign_and_verify(
            &session,
            &Mechanism::RsaX931,
            private_key,
            public_key,
            &data,
            &mut stdout,
        )?;
        ctx.write(&stdout)
    }

    fn aes_cmac(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let key = session.generate_aes_key(&AesKeySpec {
            encrypt: false,
            decrypt: false,
            sign_verify: true,
            ..AesKeySpec::new(AesKeySize::Aes256)
        })?;
        let mut stdout = Stdout::new("AES-256 key generated, message signed with CKM_AES_CMAC.");
        stdout.set_handle(key);
        sign_and_verify(
            &session,
            &Mechanism::AesCmac,
            key,
            key,
            self.message(SIGN_MESSAGE),
            &mut stdout,
        )?;
        ctx.write(&stdout)
    }
}
