use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use pubmed_parser::{parse_records, BibliographicRecord, ParseOutcome};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "pubmed_parser",
    version,
    about = "Extract bibliographic records from a PubMed efetch XML payload (rettype=abstract)"
)]
struct ParserCli {
    /// efetch XML file; `-` or no argument reads stdin
    input: Option<PathBuf>,

    /// Stop after this many accepted records; later articles are counted as unparsed
    #[arg(long)]
    limit: Option<usize>,

    /// Report only the articles that failed the acceptance gate
    #[arg(long)]
    rejected_only: bool,
}

fn main() -> Result<()> {
    let cli = ParserCli::parse();
    let xml = match cli.input.as_deref() {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let outcome = parse_records(&xml, cli.limit.unwrap_or(usize::MAX));
    for rejection in &outcome.rejected {
        eprintln!("skipped: {rejection}");
    }
    let report = Report::new(&outcome, cli.rejected_only);
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize report")?
    );
    Ok(())
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<&'a [BibliographicRecord]>,
    rejected: Vec<Rejected<'a>>,
    unparsed: usize,
}

#[derive(Serialize)]
struct Rejected<'a> {
    id: Option<&'a str>,
    reason: String,
}

impl<'a> Report<'a> {
    fn new(outcome: &'a ParseOutcome, rejected_only: bool) -> Self {
        Self {
            records: (!rejected_only).then_some(outcome.records.as_slice()),
            rejected: outcome
                .rejected
                .iter()
                .map(|rejection| Rejected {
                    id: rejection.id.as_deref(),
                    reason: rejection.to_string(),
                })
                .collect(),
            unparsed: outcome.unparsed,
        }
    }
}
