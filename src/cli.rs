use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Data directory (overrides `SCHOLARGEN_DATA_DIR`).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Document {
        #[command(subcommand)]
        command: DocumentCommand,
    },
    Generate {
        #[command(subcommand)]
        command: GenerateCommand,
    },
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
    /// Run the generation worker in the foreground.
    Work(WorkArgs),
}

#[derive(Debug, Subcommand)]
pub enum DocumentCommand {
    /// Create a DRAFT document and print it as JSON.
    Create(DocumentCreateArgs),
    Show(DocumentIdArgs),
    /// Print the progress report.
    Status(DocumentIdArgs),
}

#[derive(Debug, Args)]
pub struct DocumentCreateArgs {
    /// Owner account (billed for full generation).
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub topic: String,

    #[arg(long)]
    pub theses: Option<String>,

    /// Bibliographic entry; repeat for several.
    #[arg(long = "reference")]
    pub references: Vec<String>,

    /// LLM service override (`openai`, `openai_assistant`).
    #[arg(long)]
    pub service: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Args)]
pub struct DocumentIdArgs {
    pub id: uuid::Uuid,
}

#[derive(Debug, Subcommand)]
pub enum GenerateCommand {
    /// Enqueue structure generation.
    Base(DocumentIdArgs),
    /// Enqueue full generation, debiting the document owner.
    Full(GenerateFullArgs),
}

#[derive(Debug, Args)]
pub struct GenerateFullArgs {
    pub id: uuid::Uuid,

    /// Amount to debit (default: `SCHOLARGEN_FULL_GENERATION_PRICE`).
    #[arg(long)]
    pub price: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    Status(DocumentIdArgs),
    /// Remove all pending and failed jobs of a document.
    Delete(DocumentIdArgs),
}

#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    Credit(LedgerCreditArgs),
    Balance(LedgerBalanceArgs),
}

#[derive(Debug, Args)]
pub struct LedgerCreditArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub amount: u64,

    #[arg(long, default_value = "manual top-up")]
    pub memo: String,
}

#[derive(Debug, Args)]
pub struct LedgerBalanceArgs {
    #[arg(long)]
    pub user: String,
}

#[derive(Debug, Args)]
pub struct WorkArgs {
    /// Exit once no pending job remains.
    #[arg(long)]
    pub until_idle: bool,

    /// Worker slots (overrides `SCHOLARGEN_MAX_CONCURRENCY`).
    #[arg(long)]
    pub max_concurrency: Option<usize>,
}
