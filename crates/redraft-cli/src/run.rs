use anyhow::{bail, Context, Result};
use clap::Args;
use redraft_chunker::planner::plan;
use redraft_chunker::ChunkingPolicy;
use redraft_common::config::AppConfig;
use redraft_common::types::{Provider, RunStatus};
use redraft_orchestrator::{
    Operation, OrchestrationProgress, OrchestrationSession, Orchestrator, ReprocessingController,
    Selection, TransformOptions,
};
use redraft_transform::{EchoTransform, HttpTransformClient, RetryOnRateLimit, TextTransform};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::output;
use crate::BudgetArgs;

#[derive(Args)]
pub struct RunArgs {
    /// Document to transform
    file: PathBuf,

    /// Instructions for the rewrite
    #[arg(short, long)]
    instructions: String,

    /// Chunk indices to rewrite (comma separated)
    #[arg(long, value_delimiter = ',')]
    rewrite: Vec<usize>,

    /// Chunk indices to expand (comma separated)
    #[arg(long, value_delimiter = ',')]
    expand: Vec<usize>,

    /// Number of new sections to append
    #[arg(long)]
    append: Option<usize>,

    /// File with reference content to draw facts from
    #[arg(long)]
    content_source: Option<PathBuf>,

    /// File with sample writing to imitate
    #[arg(long)]
    style_source: Option<PathBuf>,

    /// Provider the transform service should use
    #[arg(long)]
    provider: Option<Provider>,

    /// Echo chunks back instead of calling the transform service
    #[arg(long)]
    dry_run: bool,

    /// Refine the finished rewrite; repeat to chain passes
    #[arg(long)]
    refine: Vec<String>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Print the full outcome as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    pub budgets: BudgetArgs,
}

impl RunArgs {
    fn operations(&self, plan_len: usize) -> Vec<Operation> {
        let mut operations = Vec::new();
        if !self.rewrite.is_empty() {
            operations.push(Operation::Rewrite(Selection::new(self.rewrite.iter().copied())));
        }
        if !self.expand.is_empty() {
            operations.push(Operation::Expand(Selection::new(self.expand.iter().copied())));
        }
        if let Some(sections) = self.append {
            operations.push(Operation::Append { sections });
        }
        if operations.is_empty() {
            operations.push(Operation::Rewrite(Selection::all(plan_len)));
        }
        operations
    }
}

pub fn policy(config: &AppConfig) -> ChunkingPolicy {
    ChunkingPolicy::new(config.single_call_budget).with_chunk_budget(config.chunk_budget)
}

pub async fn read_document(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

fn transform(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn TextTransform>> {
    if dry_run {
        tracing::info!("Dry run, chunks are echoed back");
        return Ok(Arc::new(EchoTransform));
    }
    let client = HttpTransformClient::new(
        &config.transform_url,
        config.api_key.clone(),
        config.request_timeout(),
    )
    .context("failed to build transform client")?;
    tracing::info!(url = %client.base_url(), "Using transform service");
    Ok(Arc::new(RetryOnRateLimit::new(
        client,
        config.rate_limit_retries,
        config.rate_limit_backoff(),
    )))
}

pub async fn execute(args: RunArgs, mut config: AppConfig) -> Result<()> {
    if let Some(provider) = args.provider {
        config.provider = provider;
    }

    let document = read_document(&args.file).await?;
    let plan = plan(&document, &policy(&config))?;
    tracing::info!(chunks = plan.len(), fingerprint = %plan.fingerprint(), "Planned document");

    let mut options = TransformOptions::new(args.instructions.clone()).with_provider(config.provider);
    if let Some(path) = &args.content_source {
        options = options.with_content_source(read_document(path).await?);
    }
    if let Some(path) = &args.style_source {
        options = options.with_style_source(read_document(path).await?);
    }

    let orchestrator = Arc::new(Orchestrator::from_config(
        transform(&config, args.dry_run)?,
        &config,
    ));
    let mut controller = ReprocessingController::new(orchestrator);

    let mut session = OrchestrationSession::new().with_sink(|p: &OrchestrationProgress| {
        tracing::info!(
            phase = %p.phase,
            chunk = ?p.chunk_index,
            "{}/{} ({:.0}%)",
            p.current_chunk,
            p.total_chunks,
            p.percent_complete()
        );
    });

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current chunk");
            cancel.cancel();
        }
    });

    let operations = args.operations(plan.len());
    let outcome = controller
        .run(&mut session, &plan, &options, operations)
        .await?;

    let mut refined = None;
    if !args.refine.is_empty() {
        if outcome.status != RunStatus::Completed {
            tracing::warn!(status = %outcome.status, "Skipping refinement, run did not complete");
        } else {
            for instructions in &args.refine {
                refined = Some(controller.refine_last_rewrite(instructions, &options).await?);
            }
        }
    }

    let rendered = output::format_outcome(&outcome, refined.as_deref(), args.json)?;
    match &args.out {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote result");
        }
        None => println!("{rendered}"),
    }

    if outcome.status == RunStatus::Failed {
        bail!("every chunk failed to transform");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        let mut argv = vec!["redraft", "doc.md", "-i", "tighten"];
        argv.extend_from_slice(args);
        Harness::parse_from(argv).run
    }

    #[test]
    fn no_selection_rewrites_everything() {
        let ops = parse(&[]).operations(3);
        assert_eq!(ops, vec![Operation::Rewrite(Selection::all(3))]);
    }

    #[test]
    fn selections_parse_from_comma_lists() {
        let ops = parse(&["--rewrite", "0,2", "--expand", "1", "--append", "2"]).operations(3);
        assert_eq!(
            ops,
            vec![
                Operation::Rewrite(Selection::new([0, 2])),
                Operation::Expand(Selection::new([1])),
                Operation::Append { sections: 2 },
            ]
        );
    }

    #[test]
    fn provider_and_refinements() {
        let args = parse(&["--provider", "openai", "--refine", "shorter", "--refine", "plainer"]);
        assert_eq!(args.provider, Some(Provider::OpenAi));
        assert_eq!(args.refine, vec!["shorter", "plainer"]);
    }
}
