use clap::Parser;

use crate::{
    actions::{P11Context, console::Stdout},
    error::result::CliResult,
};

/// Show the information returned by `C_GetInfo`
#[derive(Parser, Debug, Default)]
pub struct InfoAction {}

impl InfoAction {
    /// # Errors
    /// Fails if `C_GetInfo` fails.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let info = ctx.hsm().get_info()?;
        let mut stdout = Stdout::new("");
        stdout.set_item(&info)?;
        ctx.write(&stdout)
    }
}
