use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "ni43101",
    version,
    about = "NI 43-101 technical report extraction tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Extract(ExtractArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExtractionStrategy {
    TwoStage,
    Single,
}

impl ExtractionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoStage => "two_stage",
            Self::Single => "single",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExtractionMode {
    Full,
    Smart,
}

impl ExtractionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Smart => "smart",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LlmProvider {
    Gemini,
    Mock,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Mock => "mock",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SectionArg {
    Metadata,
    Resources,
    Reserves,
    Economics,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub sqlite_path: Option<PathBuf>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, value_enum, default_value_t = ExtractionStrategy::TwoStage)]
    pub strategy: ExtractionStrategy,

    #[arg(long, value_enum, default_value_t = ExtractionMode::Smart)]
    pub mode: ExtractionMode,

    #[arg(long, value_enum, default_value_t = LlmProvider::Gemini)]
    pub provider: LlmProvider,

    #[arg(long, default_value = "models/gemini-flash-latest")]
    pub model: String,

    #[arg(long)]
    pub retry_model: Option<String>,

    #[arg(long, default_value_t = 350_000)]
    pub max_chars: usize,

    #[arg(long, default_value_t = 20_000)]
    pub focus_min_chars: usize,

    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    #[arg(long = "section", value_enum)]
    pub sections: Vec<SectionArg>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    pub no_embeddings: bool,

    #[arg(long, default_value_t = false)]
    pub no_retries: bool,

    #[arg(long, default_value = "models/text-embedding-004")]
    pub embedding_model: String,

    #[arg(long, default_value_t = 4000)]
    pub embedding_max_chars: usize,

    #[arg(long, default_value_t = 60)]
    pub embedding_max_pages: usize,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,
}
