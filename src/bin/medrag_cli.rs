use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use medrag::{build_provider, Pipeline, PipelineArgs, Query, DEFAULT_LOG_FILTER};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "medrag-cli",
    about = "Answer one medical question from the command line"
)]
struct QueryCli {
    /// Question to answer
    #[arg(long)]
    query: String,

    /// Optional trailing conversation context
    #[arg(long)]
    context: Option<String>,

    /// Print classification, evidence and the composed prompt; skip the model call
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Print the full response envelope as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = QueryCli::parse();
    let settings = cli.pipeline.build_settings();
    let rules = cli.pipeline.load_rules()?;
    let source = Arc::new(cli.pipeline.build_literature_client()?);
    let provider = build_provider(&cli.pipeline.build_provider_settings());
    let pipeline = Pipeline::new(settings, source, provider, &rules);

    if cli.dry_run {
        let query = Query::new(&cli.query, cli.context.as_deref())?;
        let prepared = pipeline.prepare(&query).await;
        println!("classification: {:?}", prepared.classification);
        println!("search strategy: {}", prepared.strategy.label());
        println!("citations: {}", prepared.evidence.citations.len());
        if let Some(calc) = &prepared.calculation {
            println!("calculation: {}", calc.summary());
            for assumption in &calc.assumptions {
                println!("  assumption: {assumption}");
            }
        }
        println!("--- Composed Prompt ---\n{}", prepared.prompt.text());
        println!("dry-run enabled; skipping LLM call.");
        return Ok(());
    }

    let envelope = pipeline
        .answer(&cli.query, cli.context.as_deref())
        .await?;
    if cli.json {
        let json =
            serde_json::to_string_pretty(&envelope).context("failed to serialize response")?;
        println!("{json}");
        return Ok(());
    }
    println!("--- Answer ---\n{}", envelope.response_text);
    if envelope.evidence_used {
        println!("\n--- Sources ({}) ---", envelope.citation_count);
        for record in &envelope.citations {
            println!("[PMID {}] {} ({}) {}", record.id, record.title, record.year, record.source_url);
        }
    }
    Ok(())
}
