use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    actions::{P11Context, console::Stdout},
    cli_ensure,
    error::result::{CliResult, CliResultHelper},
};

/// Upper bound of the number of objects `sim-insert` accepts from a blob
const MAX_INSERTED_OBJECTS: usize = 1024;

/// SafeNet Luna extensions (`CA_*` functions)
#[derive(Subcommand)]
pub enum LunaCommands {
    /// Extract every private key of the partition into a SIM blob (`CA_SIMExtract`)
    SimExtract(SimExtractAction),
    /// Insert the objects of a SIM blob (`CA_SIMInsert`)
    SimInsert(SimInsertAction),
    /// Show the capabilities and policies of the partition
    PartitionPolicies(PartitionPoliciesAction),
}

impl LunaCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::SimExtract(action) => action.run(ctx),
            Self::SimInsert(action) => action.run(ctx),
            Self::PartitionPolicies(action) => action.run(ctx),
        }
    }
}

#[derive(Parser, Debug)]
pub struct SimExtractAction {
    /// The file the blob is written to
    #[clap(long, short = 'o', default_value = "extracted.sim")]
    pub output: PathBuf,

    /// Destroy the private keys once extracted
    #[clap(long, default_value = "false")]
    pub delete: bool,
}

impl SimExtractAction {
    /// # Errors
    /// Fails if the extraction fails or the blob cannot be written.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let Some((count, blob)) = session.sim_extract_token_private_keys(self.delete)? else {
            return ctx.write(&Stdout::new("No private key found on the token."));
        };
        fs::write(&self.output, &blob)
            .with_context(|| format!("failed writing the blob to {}", self.output.display()))?;
        info!("{count} private keys extracted to {}", self.output.display());

        let mut stdout = Stdout::new(&format!("{count} objects found."));
        stdout.add_value("Blob size", blob.len());
        stdout.add_value("Blob written to", self.output.display());
        if self.delete {
            stdout.add_value("Deleted", "The extracted keys were destroyed.");
        }
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug)]
pub struct SimInsertAction {
    /// The file holding the blob
    #[clap(long, short = 'i', default_value = "extracted.sim")]
    pub input: PathBuf,
}

impl SimInsertAction {
    /// # Errors
    /// Fails if the blob cannot be read or inserted.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let blob = fs::read(&self.input)
            .with_context(|| format!("failed reading the blob from {}", self.input.display()))?;
        cli_ensure!(!blob.is_empty(), "the blob file {} is empty", self.input.display());
        let handles = ctx.session()?.sim_insert(&blob, MAX_INSERTED_OBJECTS)?;
        let mut stdout = Stdout::new(&format!("{} objects inserted.", handles.len()));
        stdout.set_handles(&handles);
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct PartitionPoliciesAction {}

impl PartitionPoliciesAction {
    /// # Errors
    /// Fails if the library has no `CA_GetTokenCapabilities` or
    /// `CA_GetTokenPolicies`.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let slot_id = ctx.slot_id();
        let capabilities = ctx.hsm().token_capabilities(slot_id)?;
        let mut stdout = Stdout::new(&format!(
            "Capabilities of slot {slot_id} are as follows :-\nID\tDescription\n--\t-----------"
        ));
        stdout.set_items(&capabilities)?;
        ctx.write(&stdout)?;

        let policies = ctx.hsm().token_policies(slot_id)?;
        let mut stdout = Stdout::new(&format!(
            "Policies of slot {slot_id} are as follows :-\nID\tDescription\n--\t-----------"
        ));
        stdout.set_items(&policies)?;
        ctx.write(&stdout)
    }
}
