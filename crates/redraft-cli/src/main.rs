//! `redraft` - plan and run chunked document rewrites from the terminal.
//!
//! ```bash
//! # Show how a document would be split
//! redraft plan essay.md --budget 4000
//!
//! # Rewrite everything, then tighten the result once more
//! redraft run essay.md -i "make it formal" --refine "shorter"
//!
//! # Rewrite chunks 0 and 2, expand chunk 1, add two sections
//! redraft run essay.md -i "more vivid" --rewrite 0,2 --expand 1 --append 2
//! ```

mod output;
mod run;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use redraft_common::config::AppConfig;
use redraft_common::telemetry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "redraft", version, about)]
struct Cli {
    /// Enable debug logging (logs go to stderr)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a document into chunks and print the plan
    Plan {
        file: PathBuf,
        #[command(flatten)]
        budgets: BudgetArgs,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Transform a document chunk by chunk
    Run(run::RunArgs),
}

#[derive(Args, Clone, Copy)]
pub struct BudgetArgs {
    /// Single-call token budget
    #[arg(long)]
    budget: Option<usize>,
    /// Per-chunk token budget once the document is split
    #[arg(long)]
    chunk_budget: Option<usize>,
}

impl BudgetArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(budget) = self.budget {
            config.single_call_budget = budget;
            if self.chunk_budget.is_none() && config.chunk_budget > budget {
                config.chunk_budget = budget;
            }
        }
        if let Some(chunk_budget) = self.chunk_budget {
            config.chunk_budget = chunk_budget;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_with_level(if cli.verbose { "debug" } else { "warn" });

    let mut config = AppConfig::from_env().context("failed to load configuration")?;

    match cli.command {
        Command::Plan {
            file,
            budgets,
            json,
        } => {
            budgets.apply(&mut config);
            let document = run::read_document(&file).await?;
            let plan = redraft_chunker::planner::plan(&document, &run::policy(&config))?;
            println!("{}", output::format_plan(&plan, json)?);
        }
        Command::Run(args) => {
            args.budgets.apply(&mut config);
            run::execute(args, config).await?;
        }
    }

    Ok(())
}
