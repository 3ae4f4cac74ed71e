//! Record fetch stage and evidence formatting.

use std::time::Duration;

use pubmed_parser::{parse_records, BibliographicRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::eutils::LiteratureSource;
use crate::search::RecordId;

/// Line that opens every rendered study.
pub const STUDY_HEADER_PREFIX: &str = "=== STUDY ";

/// Placed between rendered studies.
pub const STUDY_SEPARATOR: &str = "\n\n----------------------------------------\n\n";

/// Label used when no publication type hints at the study design.
pub const GENERIC_STUDY_TYPE: &str = "Research Article";

const DOI_UNAVAILABLE: &str = "not available";

/// Formatted evidence text and the records it was rendered from, in acceptance order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBundle {
    pub formatted_text: String,
    pub citations: Vec<BibliographicRecord>,
}

impl EvidenceBundle {
    /// Builds a bundle from accepted records.
    pub fn from_records(citations: Vec<BibliographicRecord>) -> Self {
        Self {
            formatted_text: format_evidence(&citations),
            citations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// Fetches up to `max_records` of `ids` in a single batch and keeps the
/// records that pass acceptance.
///
/// Never fails: an empty id list makes no call, and fetch errors or timeouts
/// produce an empty bundle.
pub async fn fetch_evidence(
    source: &dyn LiteratureSource,
    ids: &[RecordId],
    max_records: usize,
    timeout: Duration,
) -> EvidenceBundle {
    if ids.is_empty() || max_records == 0 {
        return EvidenceBundle::default();
    }
    let batch = &ids[..ids.len().min(max_records)];

    let xml = match tokio::time::timeout(timeout, source.fetch(batch)).await {
        Ok(Ok(xml)) => xml,
        Ok(Err(err)) => {
            warn!(requested = batch.len(), error = %format!("{err:#}"), "record fetch failed");
            return EvidenceBundle::default();
        }
        Err(_) => {
            warn!(
                requested = batch.len(),
                timeout_secs = timeout.as_secs_f64(),
                "record fetch timed out"
            );
            return EvidenceBundle::default();
        }
    };

    let outcome = parse_records(&xml, max_records);
    for rejection in &outcome.rejected {
        debug!(record = rejection.id.as_deref().unwrap_or("<unknown>"), reason = %rejection, "record rejected");
    }
    if outcome.unparsed > 0 {
        debug!(unparsed = outcome.unparsed, "article blocks left unparsed");
    }
    info!(
        requested = batch.len(),
        accepted = outcome.records.len(),
        rejected = outcome.rejected.len(),
        "evidence records parsed"
    );
    EvidenceBundle::from_records(outcome.records)
}

/// First publication type naming a trial, meta-analysis or review design.
pub fn study_type_label(publication_types: &[String]) -> &str {
    publication_types
        .iter()
        .find(|kind| {
            let lower = kind.to_lowercase();
            lower.contains("randomized") || lower.contains("meta") || lower.contains("systematic")
        })
        .map(String::as_str)
        .unwrap_or(GENERIC_STUDY_TYPE)
}

/// Renders one record with its position in the evidence list (1-based).
pub fn render_record(position: usize, record: &BibliographicRecord) -> String {
    let mut authors = record.authors.join(", ");
    if record.more_authors {
        authors.push_str(" et al.");
    }
    if authors.is_empty() {
        authors.push_str("not listed");
    }
    let doi = record.doi.as_deref().unwrap_or(DOI_UNAVAILABLE);

    format!(
        "{STUDY_HEADER_PREFIX}{position} ===\n\
         PMID: {id}\n\
         Year: {year}\n\
         Study type: {study_type}\n\
         Title: {title}\n\
         Journal: {journal}\n\
         Authors: {authors}\n\
         Abstract:\n{abstract_text}\n\
         DOI: {doi}\n\
         URL: {url}",
        id = record.id,
        year = record.year,
        study_type = study_type_label(&record.publication_types),
        title = record.title,
        journal = record.journal,
        abstract_text = record.abstract_text,
        url = record.source_url,
    )
}

/// Joins rendered records with [`STUDY_SEPARATOR`].
pub fn format_evidence(records: &[BibliographicRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| render_record(idx + 1, record))
        .collect::<Vec<_>>()
        .join(STUDY_SEPARATOR)
}

/// Number of study headers in formatted evidence text.
pub fn count_rendered_studies(formatted: &str) -> usize {
    formatted
        .lines()
        .filter(|line| line.starts_with(STUDY_HEADER_PREFIX))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::search::SearchRequest;

    fn record(id: &str, types: &[&str], doi: Option<&str>) -> BibliographicRecord {
        BibliographicRecord {
            id: id.to_string(),
            title: format!("Study {id}"),
            journal: "The Lancet".to_string(),
            year: "2021".to_string(),
            authors: vec!["Smith J".into(), "Chen L".into(), "Okafor N".into()],
            more_authors: true,
            doi: doi.map(str::to_string),
            abstract_text: "BACKGROUND: Something.\nRESULTS: Something else happened.".to_string(),
            publication_types: types.iter().map(|t| t.to_string()).collect(),
            source_url: pubmed_parser::source_url(id),
        }
    }

    #[test]
    fn study_type_prefers_design_types() {
        let types = vec![
            "Journal Article".to_string(),
            "Systematic Review".to_string(),
            "Meta-Analysis".to_string(),
        ];
        assert_eq!(study_type_label(&types), "Systematic Review");
        assert_eq!(study_type_label(&["Journal Article".to_string()]), GENERIC_STUDY_TYPE);
        assert_eq!(study_type_label(&[]), GENERIC_STUDY_TYPE);
    }

    #[test]
    fn renders_all_fields() {
        let text = render_record(2, &record("123", &["Randomized Controlled Trial"], None));
        assert!(text.starts_with("=== STUDY 2 ==="));
        assert!(text.contains("PMID: 123\n"));
        assert!(text.contains("Study type: Randomized Controlled Trial\n"));
        assert!(text.contains("Authors: Smith J, Chen L, Okafor N et al.\n"));
        assert!(text.contains("DOI: not available\n"));
        assert!(text.ends_with("URL: https://pubmed.ncbi.nlm.nih.gov/123/"));
    }

    #[test]
    fn rendered_count_matches_citations() {
        for n in [0usize, 1, 4] {
            let records: Vec<_> = (0..n)
                .map(|i| record(&format!("{}", 100 + i), &["Journal Article"], Some("10.1/x")))
                .collect();
            let bundle = EvidenceBundle::from_records(records);
            assert_eq!(count_rendered_studies(&bundle.formatted_text), bundle.citations.len());
        }
        let two = format_evidence(&[record("1", &[], None), record("2", &[], None)]);
        assert_eq!(two.matches(STUDY_SEPARATOR).count(), 1);
    }

    struct CountingSource {
        fetches: AtomicUsize,
        seen: Mutex<Vec<RecordId>>,
        body: anyhow::Result<String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl LiteratureSource for CountingSource {
        async fn search(&self, _request: &SearchRequest) -> anyhow::Result<Vec<RecordId>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, ids: &[RecordId]) -> anyhow::Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().expect("seen lock").extend_from_slice(ids);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.body {
                Ok(body) => Ok(body.clone()),
                Err(err) => Err(anyhow!("{err}")),
            }
        }
    }

    fn source(body: anyhow::Result<String>) -> CountingSource {
        CountingSource {
            fetches: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            body,
            delay: None,
        }
    }

    #[tokio::test]
    async fn empty_ids_make_no_call() {
        let src = source(Ok(String::new()));
        let bundle = fetch_evidence(&src, &[], 10, Duration::from_secs(1)).await;
        assert!(bundle.is_empty());
        assert_eq!(src.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn truncates_ids_and_fetches_once() {
        let src = source(Ok("<PubmedArticleSet></PubmedArticleSet>".into()));
        let ids: Vec<RecordId> = (0..15).map(|i| RecordId(i.to_string())).collect();
        let bundle = fetch_evidence(&src, &ids, 10, Duration::from_secs(1)).await;
        assert!(bundle.is_empty());
        assert_eq!(src.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(src.seen.lock().expect("seen lock").len(), 10);
    }

    #[tokio::test]
    async fn fetch_errors_degrade_to_empty() {
        let src = source(Err(anyhow!("efetch returned 500")));
        let ids = vec![RecordId("1".into())];
        let bundle = fetch_evidence(&src, &ids, 10, Duration::from_secs(1)).await;
        assert_eq!(bundle, EvidenceBundle::default());
    }

    #[tokio::test]
    async fn slow_fetch_times_out_as_empty() {
        let article = r#"<PubmedArticleSet><PubmedArticle><MedlineCitation>
            <PMID Version="1">1</PMID>
            <Article>
              <Journal><JournalIssue><PubDate><Year>2020</Year></PubDate></JournalIssue><Title>BMJ</Title></Journal>
              <ArticleTitle>Inhaled corticosteroids in mild asthma</ArticleTitle>
              <Abstract><AbstractText>Regular low-dose inhaled corticosteroids reduced severe exacerbations compared with as-needed reliever therapy alone.</AbstractText></Abstract>
            </Article>
        </MedlineCitation></PubmedArticle></PubmedArticleSet>"#;
        let ids = vec![RecordId("1".into())];

        let fast = source(Ok(article.to_string()));
        let bundle = fetch_evidence(&fast, &ids, 10, Duration::from_secs(1)).await;
        assert_eq!(bundle.citations.len(), 1);

        let slow = CountingSource {
            delay: Some(Duration::from_millis(500)),
            ..source(Ok(article.to_string()))
        };
        let bundle = fetch_evidence(&slow, &ids, 10, Duration::from_millis(20)).await;
        assert_eq!(bundle, EvidenceBundle::default());
        assert_eq!(slow.fetches.load(Ordering::SeqCst), 1);
    }
}
