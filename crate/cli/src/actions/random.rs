use clap::{Parser, Subcommand};

use crate::{
    actions::{P11Context, console::Stdout, parse_hex},
    cli_ensure,
    error::result::CliResult,
};

/// Use the random number generator of the HSM
#[derive(Subcommand)]
pub enum RandomCommands {
    Generate(GenerateRandomAction),
    Seed(SeedRandomAction),
}

impl RandomCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::Generate(action) => action.run(ctx),
            Self::Seed(action) => action.run(ctx),
        }
    }
}

/// Generate random bytes (`C_GenerateRandom`)
#[derive(Parser, Debug, Default)]
pub struct GenerateRandomAction {
    /// Number of bytes to generate
    #[clap(required = true, value_parser = clap::value_parser!(u32).range(1..=65536))]
    pub length: u32,
}

impl GenerateRandomAction {
    /// # Errors
    /// Fails if the session cannot be opened or the generation fails.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let random = ctx.session()?.generate_random(usize::try_from(self.length)?)?;
        let mut stdout = Stdout::new(&format!("{} random bytes generated.", random.len()));
        stdout.add_value("Random", hex::encode(random));
        ctx.write(&stdout)
    }
}

/// Mix a seed into the random number generator (`C_SeedRandom`), then draw
/// 16 bytes from it
#[derive(Parser, Debug, Default)]
pub struct SeedRandomAction {
    /// Hexadecimal seed
    #[clap(required = true)]
    pub seed: String,
}

impl SeedRandomAction {
    /// # Errors
    /// Fails if the seed is not hexadecimal or the token refuses it.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let seed = parse_hex(&self.seed)?;
        cli_ensure!(!seed.is_empty(), "the seed must not be empty");
        let session = ctx.session()?;
        session.seed_random(&seed)?;
        let random = session.generate_random(16)?;
        let mut stdout = Stdout::new("Random number generator seeded.");
        stdout.add_value("Random", hex::encode(random));
        ctx.write(&stdout)
    }
}
