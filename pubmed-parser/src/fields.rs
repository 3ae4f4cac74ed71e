//! Per-field extractors over a single `<PubmedArticle>` block.
//!
//! Every extractor returns an empty value when its pattern is absent; none of
//! them fail. Deciding whether a record is usable is left to
//! [`crate::RecordBuilder::build`].

use std::sync::LazyLock;

use regex::Regex;

fn pattern(source: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|err| panic!("invalid field pattern {source:?}: {err}"))
}

static PMID: LazyLock<Regex> = LazyLock::new(|| pattern(r"<PMID\b[^>]*>\s*(\d+)\s*</PMID>"));
static ARTICLE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<ArticleTitle\b[^>]*>(.*?)</ArticleTitle>"));
static JOURNAL_TITLE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<Journal\b[^>]*>.*?<Title\b[^>]*>(.*?)</Title>"));
static ISO_ABBREVIATION: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<ISOAbbreviation\b[^>]*>(.*?)</ISOAbbreviation>"));
static PUB_DATE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<PubDate\b[^>]*>(.*?)</PubDate>"));
static ARTICLE_DATE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<ArticleDate\b[^>]*>(.*?)</ArticleDate>"));
static YEAR: LazyLock<Regex> = LazyLock::new(|| pattern(r"<Year\b[^>]*>\s*(\d{4})\s*</Year>"));
static MEDLINE_DATE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"<MedlineDate\b[^>]*>\D*(\d{4})"));
static AUTHOR: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<Author\b[^>]*>(.*?)</Author>"));
static LAST_NAME: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<LastName\b[^>]*>(.*?)</LastName>"));
static INITIALS: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<Initials\b[^>]*>(.*?)</Initials>"));
static FORE_NAME: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<ForeName\b[^>]*>(.*?)</ForeName>"));
static COLLECTIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<CollectiveName\b[^>]*>(.*?)</CollectiveName>"));
static ELOCATION_DOI: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"(?s)<ELocationID\b[^>]*EIdType="doi"[^>]*>(.*?)</ELocationID>"#)
});
static ARTICLE_ID_DOI: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"(?s)<ArticleId\b[^>]*IdType="doi"[^>]*>(.*?)</ArticleId>"#));
static ABSTRACT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<Abstract\b[^>]*>(.*?)</Abstract>"));
static EMPTY_ABSTRACT_TEXT: LazyLock<Regex> = LazyLock::new(|| pattern(r"<AbstractText\b[^>]*/>"));
static ABSTRACT_TEXT: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<AbstractText\b([^>]*)>(.*?)</AbstractText>"));
static LABEL_ATTR: LazyLock<Regex> = LazyLock::new(|| pattern(r#"\bLabel="([^"]*)""#));
static PUBLICATION_TYPE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<PublicationType\b[^>]*>(.*?)</PublicationType>"));
static TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"<[^>]+>"));

/// First capture group of `re` in `haystack`, or `""`.
fn first_capture<'a>(re: &Regex, haystack: &'a str) -> &'a str {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("")
}

/// Strips inline markup, decodes entities and collapses whitespace.
pub fn clean_text(raw: &str) -> String {
    let stripped = TAG.replace_all(raw, "");
    let decoded = html_escape::decode_html_entities(&*stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// PubMed identifier of the citation.
pub fn extract_pmid(article: &str) -> String {
    first_capture(&PMID, article).to_string()
}

/// Article title with inline markup removed.
pub fn extract_title(article: &str) -> String {
    clean_text(first_capture(&ARTICLE_TITLE, article))
}

/// Full journal title, falling back to the ISO abbreviation.
pub fn extract_journal(article: &str) -> String {
    let full = clean_text(first_capture(&JOURNAL_TITLE, article));
    if !full.is_empty() {
        return full;
    }
    clean_text(first_capture(&ISO_ABBREVIATION, article))
}

/// Four-digit publication year, or `""` when no date block carries one.
pub fn extract_year(article: &str) -> String {
    let pub_date = first_capture(&PUB_DATE, article);
    for candidate in [
        first_capture(&YEAR, pub_date),
        first_capture(&MEDLINE_DATE, pub_date),
        first_capture(&YEAR, first_capture(&ARTICLE_DATE, article)),
    ] {
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }
    String::new()
}

/// All author display names in document order (`"Last Initials"` or the collective name).
pub fn extract_authors(article: &str) -> Vec<String> {
    AUTHOR
        .captures_iter(article)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| author_name(body.as_str()))
        .collect()
}

fn author_name(body: &str) -> Option<String> {
    let last = clean_text(first_capture(&LAST_NAME, body));
    if last.is_empty() {
        let collective = clean_text(first_capture(&COLLECTIVE_NAME, body));
        return (!collective.is_empty()).then_some(collective);
    }
    let mut given = clean_text(first_capture(&INITIALS, body));
    if given.is_empty() {
        given = clean_text(first_capture(&FORE_NAME, body));
    }
    if given.is_empty() {
        Some(last)
    } else {
        Some(format!("{last} {given}"))
    }
}

/// DOI from the article's electronic location, then from the PubMed id list.
pub fn extract_doi(article: &str) -> String {
    let elocation = clean_text(first_capture(&ELOCATION_DOI, article));
    if !elocation.is_empty() {
        return elocation;
    }
    clean_text(first_capture(&ARTICLE_ID_DOI, article))
}

/// Abstract text. Labeled sections are joined in document order as `LABEL: text`.
pub fn extract_abstract(article: &str) -> String {
    let scope = ABSTRACT
        .captures(article)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(article);
    let scope = EMPTY_ABSTRACT_TEXT.replace_all(scope, "");

    let mut sections = Vec::new();
    for caps in ABSTRACT_TEXT.captures_iter(&scope) {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let text = clean_text(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
        if text.is_empty() {
            continue;
        }
        let label = clean_text(first_capture(&LABEL_ATTR, attrs));
        if label.is_empty() {
            sections.push(text);
        } else {
            sections.push(format!("{label}: {text}"));
        }
    }
    sections.join("\n")
}

/// Publication type names in document order.
pub fn extract_publication_types(article: &str) -> Vec<String> {
    PUBLICATION_TYPE
        .captures_iter(article)
        .filter_map(|caps| caps.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|value| !value.is_empty())
        .collect()
}
