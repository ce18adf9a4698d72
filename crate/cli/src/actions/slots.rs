use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    actions::{P11Context, console::Stdout},
    cli_ensure,
    error::result::CliResult,
};

/// List slots and log in to a partition
#[derive(Subcommand)]
pub enum SlotsCommands {
    List(ListSlotsAction),
    Login(LoginAction),
}

impl SlotsCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::List(action) => action.run(ctx),
            Self::Login(action) => action.run(ctx),
        }
    }
}

/// List the slots holding a token, with their label, model, serial number,
/// firmware and memory
#[derive(Parser, Debug, Default)]
pub struct ListSlotsAction {
    /// List every slot, including the ones without a token
    #[clap(long, default_value = "false")]
    pub all: bool,
}

impl ListSlotsAction {
    /// # Errors
    /// Fails if the slot list or the token information cannot be read.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let hsm = ctx.hsm();
        let slot_ids = hsm.get_available_slot_list(!self.all)?;
        let mut stdout = Stdout::new(&format!("{} slot(s) found.", slot_ids.len()));
        if self.all {
            let slots = slot_ids
                .into_iter()
                .map(|slot_id| hsm.get_slot_info(slot_id))
                .collect::<Result<Vec<_>, _>>()?;
            stdout.set_items(&slots)?;
        } else {
            let tokens = slot_ids
                .into_iter()
                .map(|slot_id| hsm.get_token_info(slot_id))
                .collect::<Result<Vec<_>, _>>()?;
            stdout.set_items(&tokens)?;
        }
        ctx.write(&stdout)
    }
}

/// Log in to the selected slot with `--password` and `--user`, then log out
#[derive(Parser, Debug, Default)]
pub struct LoginAction {}

impl LoginAction {
    /// # Errors
    /// Fails if no password is given or the login is refused.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        cli_ensure!(
            ctx.is_logged_in(),
            "a password is required to log in: use --password or P11_PASSWORD"
        );
        let slot = ctx.slot()?;
        cli_ensure!(
            slot.is_logged_in(),
            "the login session of slot {} is not logged in",
            ctx.slot_id()
        );
        info!("Logged in to slot {} as {}", ctx.slot_id(), ctx.user());
        let mut stdout = Stdout::new(&format!(
            "LOGIN: SUCCESS (slot {}, {})",
            ctx.slot_id(),
            ctx.user()
        ));
        drop(slot);
        ctx.hsm().close_slot(ctx.slot_id())?;
        stdout.add_value("LOGOUT", "SUCCESS");
        ctx.write(&stdout)
    }
}
