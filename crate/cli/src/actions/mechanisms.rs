use std::fmt::{self, Display, Formatter};

use clap::{Parser, Subcommand};
use p11_base_hsm::mechanisms::{mechanism_from_name, mechanism_name};
use serde::Serialize;

use crate::{
    actions::{P11Context, console::Stdout},
    error::result::CliResult,
};

/// Query the mechanisms supported by the slot
#[derive(Subcommand)]
pub enum MechanismsCommands {
    List(ListMechanismsAction),
    Info(MechanismInfoAction),
}

impl MechanismsCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::List(action) => action.run(ctx),
            Self::Info(action) => action.run(ctx),
        }
    }
}

#[derive(Serialize, Debug)]
struct MechanismEntry {
    index: usize,
    name: &'static str,
    code: u64,
}

impl Display for MechanismEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}. | {} | 0x{:X}", self.index, self.name, self.code)
    }
}

/// List every mechanism supported by the slot (`C_GetMechanismList`)
#[derive(Parser, Debug, Default)]
pub struct ListMechanismsAction {}

impl ListMechanismsAction {
    /// # Errors
    /// Fails if the mechanism list cannot be read.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let mechanisms = ctx.slot()?.get_supported_mechanisms()?;
        let entries = mechanisms
            .into_iter()
            .enumerate()
            .map(|(i, code)| MechanismEntry {
                index: i + 1,
                name: mechanism_name(code).unwrap_or("UNKNOWN"),
                code: u64::from(code),
            })
            .collect::<Vec<_>>();
        let mut stdout = Stdout::new(&format!(
            "Slot {} supports {} mechanisms.",
            ctx.slot_id(),
            entries.len()
        ));
        stdout.set_items(&entries)?;
        ctx.write(&stdout)
    }
}

/// Show the key sizes and the functions of one mechanism (`C_GetMechanismInfo`)
#[derive(Parser, Debug, Default)]
pub struct MechanismInfoAction {
    /// Mechanism name (`CKM_AES_GCM`, `aes_gcm`) or hexadecimal code (`0x1087`)
    #[clap(required = true)]
    pub name: String,
}

impl MechanismInfoAction {
    /// # Errors
    /// Fails if the name is unknown or the slot does not support the mechanism.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let mechanism = mechanism_from_name(&self.name)?;
        let info = ctx.slot()?.get_mechanism_info(mechanism)?;
        let mut stdout = Stdout::new(&format!("[ {} ]", info.mechanism));
        stdout.set_item(&info)?;
        ctx.write(&stdout)
    }
}
