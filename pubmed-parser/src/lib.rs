//! Extract bibliographic records from PubMed `efetch` XML.
//!
//! The input is treated as semi-structured text rather than a validated
//! document: each `<PubmedArticle>` block is scanned by independent field
//! extractors (see [`fields`]) and accumulated in a [`RecordBuilder`]. Only
//! records that carry an identifier, a title and a substantive abstract are
//! promoted to [`BibliographicRecord`]; everything else is reported as a
//! [`RecordRejection`] and skipped.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub mod fields;

/// Authors kept per record; longer lists set [`BibliographicRecord::more_authors`].
pub const MAX_AUTHORS: usize = 3;

/// Abstracts must be longer than this many characters to be accepted.
pub const MIN_ABSTRACT_CHARS: usize = 100;

/// Year label used when no publication date can be recovered.
pub const UNKNOWN_YEAR: &str = "Unknown";

const SOURCE_URL_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";

static ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<PubmedArticle\b.*?</PubmedArticle>").expect("valid article pattern")
});

/// A parsed citation that passed the acceptance gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographicRecord {
    pub id: String,
    pub title: String,
    pub journal: String,
    /// Four-digit year or [`UNKNOWN_YEAR`].
    pub year: String,
    /// At most [`MAX_AUTHORS`] names.
    pub authors: Vec<String>,
    pub more_authors: bool,
    pub doi: Option<String>,
    pub abstract_text: String,
    pub publication_types: Vec<String>,
    pub source_url: String,
}

/// Builds the canonical PubMed URL for an identifier.
pub fn source_url(id: &str) -> String {
    format!("{SOURCE_URL_BASE}/{id}/")
}

/// Why an article block was not promoted to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// No PMID could be found.
    MissingId,
    /// The article title is absent or empty.
    MissingTitle,
    /// No abstract text was found.
    MissingAbstract,
    /// The abstract is too short to be useful evidence.
    AbstractTooShort {
        /// Character count of the abstract that was found.
        chars: usize,
    },
}

/// A skipped article block, identified when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRejection {
    pub id: Option<String>,
    pub reason: RejectionReason,
}

impl fmt::Display for RecordRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.as_deref().unwrap_or("<unknown>");
        match &self.reason {
            RejectionReason::MissingId => write!(f, "article without PMID skipped"),
            RejectionReason::MissingTitle => write!(f, "record {id} has no title"),
            RejectionReason::MissingAbstract => write!(f, "record {id} has no abstract"),
            RejectionReason::AbstractTooShort { chars } => write!(
                f,
                "record {id} abstract has {chars} chars (need more than {MIN_ABSTRACT_CHARS})"
            ),
        }
    }
}

impl std::error::Error for RecordRejection {}

/// Accumulates optional fields for one article before validation.
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    id: Option<String>,
    title: Option<String>,
    journal: Option<String>,
    year: Option<String>,
    authors: Vec<String>,
    doi: Option<String>,
    abstract_text: Option<String>,
    publication_types: Vec<String>,
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl RecordBuilder {
    /// Runs every field extractor over one `<PubmedArticle>` block.
    pub fn from_article(article: &str) -> Self {
        Self {
            id: non_empty(fields::extract_pmid(article)),
            title: non_empty(fields::extract_title(article)),
            journal: non_empty(fields::extract_journal(article)),
            year: non_empty(fields::extract_year(article)),
            authors: fields::extract_authors(article),
            doi: non_empty(fields::extract_doi(article)),
            abstract_text: non_empty(fields::extract_abstract(article)),
            publication_types: fields::extract_publication_types(article),
        }
    }

    /// Promotes the builder to a record, or explains why it cannot be used.
    pub fn build(self) -> Result<BibliographicRecord, RecordRejection> {
        let reject = |id: Option<String>, reason| Err(RecordRejection { id, reason });
        let Some(id) = self.id else {
            return reject(None, RejectionReason::MissingId);
        };
        let Some(title) = self.title else {
            return reject(Some(id), RejectionReason::MissingTitle);
        };
        let Some(abstract_text) = self.abstract_text else {
            return reject(Some(id), RejectionReason::MissingAbstract);
        };
        let chars = abstract_text.chars().count();
        if chars <= MIN_ABSTRACT_CHARS {
            return reject(Some(id), RejectionReason::AbstractTooShort { chars });
        }

        let more_authors = self.authors.len() > MAX_AUTHORS;
        let mut authors = self.authors;
        authors.truncate(MAX_AUTHORS);
        let source_url = source_url(&id);
        Ok(BibliographicRecord {
            id,
            title,
            journal: self.journal.unwrap_or_default(),
            year: self.year.unwrap_or_else(|| UNKNOWN_YEAR.to_string()),
            authors,
            more_authors,
            doi: self.doi,
            abstract_text,
            publication_types: self.publication_types,
            source_url,
        })
    }
}

/// Result of parsing one efetch payload.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Accepted records in document order.
    pub records: Vec<BibliographicRecord>,
    /// Article blocks that failed the acceptance gate.
    pub rejected: Vec<RecordRejection>,
    /// Article blocks left unparsed because the limit was reached.
    pub unparsed: usize,
}

/// Parses up to `limit` accepted records from an efetch XML payload.
///
/// # Example
///
/// ```
/// let xml = "<PubmedArticleSet></PubmedArticleSet>";
/// let outcome = pubmed_parser::parse_records(xml, 10);
/// assert!(outcome.records.is_empty());
/// assert!(outcome.rejected.is_empty());
/// ```
pub fn parse_records(xml: &str, limit: usize) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for article in ARTICLE.find_iter(xml) {
        if outcome.records.len() >= limit {
            outcome.unparsed += 1;
            continue;
        }
        match RecordBuilder::from_article(article.as_str()).build() {
            Ok(record) => outcome.records.push(record),
            Err(rejection) => outcome.rejected.push(rejection),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn article(pmid: &str, title: &str, abstract_body: &str, authors: usize) -> String {
        let author_xml: String = (0..authors)
            .map(|idx| {
                format!("<Author><LastName>Author{idx}</LastName><Initials>A</Initials></Author>")
            })
            .collect();
        format!(
            "<PubmedArticle><MedlineCitation><PMID Version=\"1\">{pmid}</PMID><Article>\
             <Journal><JournalIssue><PubDate><Year>2022</Year></PubDate></JournalIssue>\
             <Title>Diabetes Care</Title></Journal>\
             <ArticleTitle>{title}</ArticleTitle>\
             <Abstract><AbstractText>{abstract_body}</AbstractText></Abstract>\
             <AuthorList>{author_xml}</AuthorList>\
             <PublicationTypeList><PublicationType>Journal Article</PublicationType></PublicationTypeList>\
             </Article></MedlineCitation></PubmedArticle>"
        )
    }

    fn long_abstract() -> String {
        "Glycemic control improved substantially across the intervention arm. ".repeat(3)
    }

    #[test]
    fn accepts_complete_record() {
        let xml = article("111", "A trial", &long_abstract(), 2);
        let outcome = parse_records(&xml, 10);
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.id, "111");
        assert_eq!(record.journal, "Diabetes Care");
        assert_eq!(record.year, "2022");
        assert_eq!(record.authors, vec!["Author0 A", "Author1 A"]);
        assert!(!record.more_authors);
        assert_eq!(record.doi, None);
        assert_eq!(record.source_url, "https://pubmed.ncbi.nlm.nih.gov/111/");
    }

    #[test]
    fn caps_authors() {
        let xml = article("112", "A trial", &long_abstract(), 7);
        let record = &parse_records(&xml, 10).records[0];
        assert_eq!(record.authors.len(), MAX_AUTHORS);
        assert!(record.more_authors);
    }

    #[test]
    fn short_or_missing_abstracts_are_rejected() {
        let xml = format!(
            "{}{}{}",
            article("1", "Short", "Too short.", 1),
            article("2", "", &long_abstract(), 1),
            "<PubmedArticle><PMID>3</PMID><ArticleTitle>No abstract</ArticleTitle></PubmedArticle>"
        );
        let outcome = parse_records(&xml, 10);
        assert!(outcome.records.is_empty());
        let reasons: Vec<_> = outcome.rejected.iter().map(|r| r.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                RejectionReason::AbstractTooShort { chars: 10 },
                RejectionReason::MissingTitle,
                RejectionReason::MissingAbstract,
            ]
        );
    }

    #[test]
    fn abstract_at_threshold_is_rejected() {
        let exact = "x".repeat(MIN_ABSTRACT_CHARS);
        let outcome = parse_records(&article("9", "Edge", &exact, 1), 10);
        assert!(outcome.records.is_empty());
        let above = "x".repeat(MIN_ABSTRACT_CHARS + 1);
        assert_eq!(parse_records(&article("9", "Edge", &above, 1), 10).records.len(), 1);
    }

    #[test]
    fn limit_bounds_accepted_records() {
        let xml: String = (0..5)
            .map(|idx| article(&idx.to_string(), "T", &long_abstract(), 1))
            .collect();
        let outcome = parse_records(&xml, 2);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.unparsed, 3);
    }

    #[test]
    fn unknown_year_when_dates_missing() {
        let xml = format!(
            "<PubmedArticle><PMID>5</PMID><ArticleTitle>T</ArticleTitle>\
             <Abstract><AbstractText>{}</AbstractText></Abstract></PubmedArticle>",
            long_abstract()
        );
        let record = &parse_records(&xml, 10).records[0];
        assert_eq!(record.year, UNKNOWN_YEAR);
        assert_eq!(record.journal, "");
    }

    #[test]
    fn garbage_input_yields_nothing() {
        for input in ["", "not xml at all", "<PubmedArticle>", "</PubmedArticle><PubmedArticle"] {
            let outcome = parse_records(input, 10);
            assert!(outcome.records.is_empty());
            assert!(outcome.rejected.is_empty());
        }
    }
}
