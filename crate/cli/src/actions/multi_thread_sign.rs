use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use clap::Parser;
use p11_base_hsm::{Mechanism, RsaKeyPairSpec};
use tracing::{debug, info};

use crate::{
    actions::{P11Context, SIGN_MESSAGE, console::Stdout},
    cli_ensure,
    error::{CliError, result::CliResult},
};

/// Sign from several threads sharing a pool of sessions.
///
/// One RSA-2048 key pair is generated, then every thread borrows sessions
/// from the pool to sign with `CKM_SHA256_RSA_PKCS`.
#[derive(Parser, Debug)]
pub struct MultiThreadSignAction {
    /// Number of signing threads
    #[clap(long, short = 't', default_value = "4", value_parser = clap::value_parser!(u16).range(1..=256))]
    pub threads: u16,

    /// Number of signatures per thread
    #[clap(long, short = 'n', default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub operations: u32,

    /// Store the key pair on the token
    #[clap(long, default_value = "false")]
    pub token: bool,
}

impl Default for MultiThreadSignAction {
    fn default() -> Self {
        Self {
            threads: 4,
            operations: 10,
            token: false,
        }
    }
}

impl MultiThreadSignAction {
    /// # Errors
    /// Fails if the key pair cannot be generated or a signature fails.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        // session objects live as long as the session that created them
        let session = ctx.session()?;
        let (public_key, private_key) = session.generate_rsa_key_pair(&RsaKeyPairSpec {
            token: self.token,
            encrypt_decrypt: false,
            ..RsaKeyPairSpec::default()
        })?;
        info!("RSA-2048 key pair generated: {public_key}/{private_key}");

        let pool = ctx.session_pool()?;
        let signed = AtomicUsize::new(0);
        let mechanism = Mechanism::Sha256RsaPkcs;
        info!("Starting {} threads", self.threads);
        thread::scope(|scope| -> CliResult<()> {
            let workers: Vec<_> = (0..self.threads)
                .map(|index| {
                    let pool = &pool;
                    let signed = &signed;
                    let mechanism = &mechanism;
                    scope.spawn(move || -> CliResult<()> {
                        for _ in 0..self.operations {
                            pool.with_session("sign", |session| {
                                session.sign(mechanism, private_key, SIGN_MESSAGE.as_bytes())
                            })?;
                            signed.fetch_add(1, Ordering::Relaxed);
                        }
                        debug!("thread {index} done");
                        Ok(())
                    })
                })
                .collect();
            for worker in workers {
                worker
                    .join()
                    .map_err(|_| CliError::Default("a signing thread panicked".to_owned()))??;
            }
            Ok(())
        })?;

        let signed = signed.into_inner();
        let expected = usize::from(self.threads) * usize::try_from(self.operations)?;
        cli_ensure!(
            signed == expected,
            "{signed} signatures done, {expected} expected"
        );

        // one signature checked end to end
        let signature = session.sign(&mechanism, private_key, SIGN_MESSAGE.as_bytes())?;
        cli_ensure!(
            session.verify(&mechanism, public_key, SIGN_MESSAGE.as_bytes(), &signature)?,
            "Signature verification failed."
        );

        let state = pool.state();
        let mut stdout = Stdout::new(&format!(
            "{signed} sign operations completed by {} threads.",
            self.threads
        ));
        stdout.set_key_pair_handles(public_key, private_key);
        stdout.add_value("Pooled sessions", state.connections);
        stdout.add_value("Idle sessions", state.idle_connections);
        ctx.write(&stdout)
    }
}
