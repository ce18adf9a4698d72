use std::path::PathBuf;

use clap::{Parser, Subcommand};
use p11_base_hsm::SlotSelector;
use p11_logger::log_init;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::{
    actions::{
        GlobalOptions, P11Context,
        console::{OutputFormat, P11_CLI_FORMAT},
        derive::DeriveCommands,
        encrypt::EncryptCommands,
        info::InfoAction,
        luna::LunaCommands,
        mechanisms::MechanismsCommands,
        multi_thread_sign::MultiThreadSignAction,
        objects::ObjectsCommands,
        random::RandomCommands,
        sign::SignCommands,
        slots::SlotsCommands,
        usage_limit::UsageLimitAction,
        wrap::WrapCommands,
    },
    config::{P11_CLI_CONF_ENV, P11Conf, User},
    error::result::CliResult,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file location
    ///
    /// This is an alternative to the env variable `P11_CLI_CONF`.
    /// Takes precedence over `P11_CLI_CONF` env variable.
    #[arg(short, long, env = P11_CLI_CONF_ENV)]
    pub conf: Option<PathBuf>,

    /// Path of the PKCS#11 library, the Luna client library by default
    #[arg(long = "lib", env = "P11_LIB")]
    pub library: Option<PathBuf>,

    /// Slot id, or label of the token in the slot
    #[arg(long, short)]
    pub slot: Option<SlotSelector>,

    /// Password of the user; without it, sessions are not logged in
    #[arg(long, short, env = "P11_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// The role to log in with
    #[arg(long, short, value_enum)]
    pub user: Option<User>,

    /// Output format of the results
    #[arg(long, short, value_enum, env = P11_CLI_FORMAT, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: CliCommands,
}

#[derive(Subcommand)]
pub enum CliCommands {
    /// Show the library information (`C_GetInfo`)
    Info(InfoAction),
    /// List slots and log in
    #[command(subcommand)]
    Slots(SlotsCommands),
    /// List the mechanisms of the token
    #[command(subcommand)]
    Mechanisms(MechanismsCommands),
    /// Generate random bytes
    #[command(subcommand)]
    Random(RandomCommands),
    #[command(subcommand)]
    Encrypt(EncryptCommands),
    #[command(subcommand)]
    Sign(SignCommands),
    #[command(subcommand)]
    Derive(DeriveCommands),
    #[command(subcommand)]
    Wrap(WrapCommands),
    #[command(subcommand)]
    Objects(ObjectsCommands),
    /// Encrypt with a key carrying a usage limit until it is exhausted
    UsageLimit(UsageLimitAction),
    /// Sign concurrently from several threads
    MultiThreadSign(MultiThreadSignAction),
    #[command(subcommand)]
    Luna(LunaCommands),
}

impl CliCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::Info(action) => action.run(ctx),
            Self::Slots(action) => action.process(ctx),
            Self::Mechanisms(action) => action.process(ctx),
            Self::Random(action) => action.process(ctx),
            Self::Encrypt(action) => action.process(ctx),
            Self::Sign(action) => action.process(ctx),
            Self::Derive(action) => action.process(ctx),
            Self::Wrap(action) => action.process(ctx),
            Self::Objects(action) => action.process(ctx),
            Self::UsageLimit(action) => action.run(ctx),
            Self::MultiThreadSign(action) => action.run(ctx),
            Self::Luna(action) => action.process(ctx),
        }
    }
}

/// Main function of the samples CLI.
///
/// Logging is initialized first, then the arguments are parsed. The
/// library is only loaded once the arguments are valid.
///
/// # Errors
/// Fails if the configuration cannot be loaded, the library or slot cannot
/// be opened, or the command fails.
pub fn p11_main() -> CliResult<()> {
    log_init(Some("warn"));
    let cli = Cli::parse();
    info!("Starting the PKCS#11 samples");

    let conf = P11Conf::load(cli.conf.as_deref())?;
    debug!("Configuration: {conf:?}");
    let options = GlobalOptions {
        library: cli.library,
        slot: cli.slot,
        password: cli.password.map(Zeroizing::new),
        user: cli.user.map(Into::into),
        format: cli.format,
    };
    let ctx = P11Context::new(options, &conf)?;
    cli.command.process(&ctx)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
