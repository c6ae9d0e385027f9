use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use scholargen::app::context::AppContext;
use scholargen::cli::{Cli, Command, DocumentCommand, GenerateCommand, JobsCommand, LedgerCommand};
use scholargen::config::Config;
use scholargen::document::{GptSettings, NewDocument};
use scholargen::generation::BillingContext;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

async fn try_main() -> anyhow::Result<()> {
    scholargen::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let mut config = Config::from_env().context("load config")?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = data_dir;
    }
    if let Command::Work(args) = &cli.command
        && let Some(max_concurrency) = args.max_concurrency
    {
        config.max_concurrency = max_concurrency.max(1);
    }
    let ctx = AppContext::from_config(config).context("build app context")?;

    match cli.command {
        Command::Document {
            command: DocumentCommand::Create(args),
        } => {
            let gpt_settings = (args.service.is_some()
                || args.model.is_some()
                || args.temperature.is_some())
            .then(|| GptSettings {
                service: args.service,
                model: args.model,
                temperature: args.temperature,
            });
            let document = NewDocument {
                user_id: args.user,
                title: args.title,
                topic: args.topic,
                theses: args.theses,
                references: args.references,
                gpt_settings,
            }
            .into_document()
            .context("validate document")?;
            ctx.documents
                .create(&document)
                .await
                .context("create document")?;
            print_json(&document)?;
        }
        Command::Document {
            command: DocumentCommand::Show(args),
        } => {
            let document = ctx.orchestrator.load(args.id).await?;
            print_json(&document)?;
        }
        Command::Document {
            command: DocumentCommand::Status(args),
        } => {
            let report = ctx.orchestrator.status(args.id).await?;
            print_json(&report)?;
        }
        Command::Generate {
            command: GenerateCommand::Base(args),
        } => {
            let document = ctx
                .orchestrator
                .start_base_generation(args.id)
                .await
                .context("start structure generation")?;
            print_json(&document)?;
        }
        Command::Generate {
            command: GenerateCommand::Full(args),
        } => {
            let document = ctx.orchestrator.load(args.id).await?;
            let amount = args.price.unwrap_or(ctx.config.full_generation_price);
            let billing = BillingContext::owner_of(&document, amount);
            let document = ctx
                .orchestrator
                .start_full_generation(args.id, &billing)
                .await
                .context("start full generation")?;
            print_json(&document)?;
        }
        Command::Jobs {
            command: JobsCommand::Status(args),
        } => {
            let status = ctx.orchestrator.job_status(args.id).await?;
            print_json(&status)?;
        }
        Command::Jobs {
            command: JobsCommand::Delete(args),
        } => {
            let deleted = ctx.orchestrator.delete_jobs(args.id).await?;
            print_json(&deleted)?;
        }
        Command::Ledger {
            command: LedgerCommand::Credit(args),
        } => {
            let transaction = ctx
                .ledger
                .credit(&args.user, args.amount, &args.memo)
                .await
                .context("credit ledger")?;
            print_json(&transaction)?;
        }
        Command::Ledger {
            command: LedgerCommand::Balance(args),
        } => {
            let balance = ctx
                .ledger
                .balance(&args.user)
                .await
                .context("read balance")?;
            print_json(&serde_json::json!({ "user_id": args.user, "balance": balance }))?;
        }
        Command::Work(args) => {
            if args.until_idle {
                ctx.worker.run_until_idle().await.context("run worker")?;
            } else {
                ctx.worker
                    .run(async {
                        let _ = tokio::signal::ctrl_c().await;
                    })
                    .await;
            }
        }
    }

    Ok(())
}
