use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use density_forge::NormalizationMethod;

#[derive(Parser)]
#[command(
    name = "dnforge",
    about = "Charge-conserving electron density coefficient prediction",
    version,
    author,
    before_help = crate::display::banner_for_help(),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Predict atom and bond coefficients for a batch of molecules (JSON)
    #[command(visible_alias = "p")]
    Predict(PredictArgs),

    /// Fill coefficients of a basis-function list for one molecule (JSON)
    #[command(visible_alias = "f")]
    Parametrize(ParametrizeArgs),
}

impl Command {
    pub fn common(&self) -> &IoOptions {
        match self {
            Command::Predict(args) => &args.io,
            Command::Parametrize(args) => &args.io,
        }
    }
}

/// I/O options shared by all commands.
#[derive(Args)]
pub struct IoOptions {
    /// Input JSON file (stdin if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output JSON file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Suppress progress output (for scripting)
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Model options shared by all commands.
#[derive(Args)]
#[command(next_help_heading = "Model")]
pub struct ModelOptions {
    /// Model configuration (TOML file, built-in default if omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Trained network weights (JSON file)
    #[arg(long, value_name = "FILE")]
    pub weights: Option<PathBuf>,

    /// Override the configured charge normalization
    #[arg(long, value_name = "METHOD")]
    pub normalization: Option<Normalization>,
}

#[derive(Args)]
pub struct PredictArgs {
    #[command(flatten)]
    pub io: IoOptions,

    #[command(flatten)]
    pub model: ModelOptions,

    /// Also report the per-atom partition of the predicted electron count
    #[arg(long)]
    pub atomic_charges: bool,
}

#[derive(Args)]
pub struct ParametrizeArgs {
    #[command(flatten)]
    pub io: IoOptions,

    #[command(flatten)]
    pub model: ModelOptions,

    /// Fail instead of warning when a bond function has no matching bond
    #[arg(long)]
    pub strict: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Normalization {
    /// Raw network output
    None,
    /// Nearest point on the charge-conserving hyperplane
    Kkt,
    /// Uniform rescaling to the target charge
    Scale,
}

impl From<Normalization> for NormalizationMethod {
    fn from(value: Normalization) -> Self {
        match value {
            Normalization::None => NormalizationMethod::None,
            Normalization::Kkt => NormalizationMethod::Kkt,
            Normalization::Scale => NormalizationMethod::Scale,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
