use clap::Parser;
use p11_base_hsm::{AesKeySize, AesKeySpec, Mechanism, reexport::cosmian_pkcs11_sys::CK_ULONG};
use tracing::{debug, info};

use crate::{
    actions::{AES_CBC_IV, P11Context, PLAINTEXT, console::Stdout},
    cli_bail, cli_ensure,
    error::result::CliResult,
};

/// Generate an AES-256 key with `CKA_USAGE_LIMIT` and encrypt with it until
/// the HSM refuses the key
#[derive(Parser, Debug)]
pub struct UsageLimitAction {
    /// Number of operations the key allows
    #[clap(long, short = 'l', default_value = "5")]
    pub limit: CK_ULONG,
}

impl Default for UsageLimitAction {
    fn default() -> Self {
        Self { limit: 5 }
    }
}

impl UsageLimitAction {
    /// # Errors
    /// Fails if the key cannot be generated, if an encryption fails for any
    /// other reason than an exhausted key, or if the key is still usable
    /// past its limit.
    #[allow(clippy::useless_conversion)]
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        cli_ensure!(self.limit > 0, "the usage limit must be at least 1");
        let session = ctx.session()?;
        let key = session.generate_aes_key(&AesKeySpec {
            usage_limit: Some(self.limit),
            ..AesKeySpec::new(AesKeySize::Aes256)
        })?;
        let requested = u64::from(self.limit);
        let limit = session.usage_limit(key)?.unwrap_or(requested);
        info!("AES key {key} generated with a usage limit of {limit}");

        let mut stdout = Stdout::new(&format!(
            "AES key generated. Handle : {key}, Usage Limit : {limit}."
        ));
        stdout.set_handle(key);
        let mechanism = Mechanism::AesCbcPad { iv: AES_CBC_IV };
        for operation in 1..=requested.saturating_add(1) {
            match session.encrypt(&mechanism, key, PLAINTEXT.as_bytes()) {
                Ok(_) => {
                    let count = session.usage_count(key)?.unwrap_or(operation);
                    debug!("encryption {operation} done, usage count {count}");
                    stdout.add_value(
                        &format!("Encryption {operation}"),
                        format!("Current usage count : {count}."),
                    );
                }
                Err(e) if e.is_key_exhausted() => {
                    stdout.add_value(
                        "Result",
                        format!("Usage count exceeded the usage limit. C_Encrypt failed with: {e}"),
                    );
                    return ctx.write(&stdout);
                }
                Err(e) => return Err(e.into()),
            }
        }
        cli_bail!(
            "the key is still usable after {} operations",
            requested.saturating_add(1)
        )
    }
}
