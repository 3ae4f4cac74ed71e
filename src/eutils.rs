//! HTTP client for the NCBI E-utilities bibliographic service.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::search::{RecordId, SearchRequest};

/// Public E-utilities endpoint.
pub const DEFAULT_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// A bibliographic service that can search for record ids and fetch records in bulk.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Returns record ids in relevance order.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RecordId>>;

    /// Returns the raw structured document covering all `ids`.
    async fn fetch(&self, ids: &[RecordId]) -> Result<String>;
}

/// esearch/efetch client.
#[derive(Clone)]
pub struct EutilsClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    tool: Option<String>,
    email: Option<String>,
}

impl EutilsClient {
    /// Builds a client against `base_url` (normally [`DEFAULT_EUTILS_BASE`]).
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        tool: Option<String>,
        email: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url =
            Url::parse(&normalized).with_context(|| format!("invalid E-utilities base {base_url}"))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build E-utilities HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            tool,
            email,
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base_url
            .join(name)
            .with_context(|| format!("failed to build {name} URL"))
    }

    fn search_url(&self, request: &SearchRequest) -> Result<Url> {
        let mut url = self.endpoint("esearch.fcgi")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("db", "pubmed")
                .append_pair("term", request.expression.as_str())
                .append_pair("retmode", "json")
                .append_pair("retmax", &request.max_results.to_string())
                .append_pair("sort", "relevance")
                .append_pair("datetype", "pdat")
                .append_pair("reldate", &request.recency_days.to_string())
                .append_pair("usehistory", "n");
        }
        self.append_identity(&mut url);
        Ok(url)
    }

    fn fetch_url(&self, ids: &[RecordId]) -> Result<Url> {
        let joined = ids
            .iter()
            .map(RecordId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut url = self.endpoint("efetch.fcgi")?;
        url.query_pairs_mut()
            .append_pair("db", "pubmed")
            .append_pair("id", &joined)
            .append_pair("retmode", "xml")
            .append_pair("rettype", "abstract");
        self.append_identity(&mut url);
        Ok(url)
    }

    fn append_identity(&self, url: &mut Url) {
        let mut query = url.query_pairs_mut();
        if let Some(key) = &self.api_key {
            query.append_pair("api_key", key);
        }
        if let Some(tool) = &self.tool {
            query.append_pair("tool", tool);
        }
        if let Some(email) = &self.email {
            query.append_pair("email", email);
        }
    }

    async fn get_text(&self, url: Url, what: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to call E-utilities {what}"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("E-utilities {what} returned {status}: {text}");
        }
        resp.text()
            .await
            .with_context(|| format!("failed to read E-utilities {what} body"))
    }
}

#[async_trait]
impl LiteratureSource for EutilsClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RecordId>> {
        let url = self.search_url(request)?;
        let body = self.get_text(url, "esearch").await?;
        let ids = parse_search_ids(&body)?;
        debug!(count = ids.len(), "esearch returned ids");
        Ok(ids)
    }

    async fn fetch(&self, ids: &[RecordId]) -> Result<String> {
        if ids.is_empty() {
            return Ok(String::new());
        }
        let url = self.fetch_url(ids)?;
        self.get_text(url, "efetch").await
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

/// Reads the id list out of an esearch JSON body.
fn parse_search_ids(body: &str) -> Result<Vec<RecordId>> {
    let parsed: SearchEnvelope =
        serde_json::from_str(body).context("failed to parse esearch response")?;
    if let Some(error) = parsed.esearchresult.error {
        bail!("esearch reported an error: {error}");
    }
    Ok(parsed
        .esearchresult
        .idlist
        .into_iter()
        .filter(|id| !id.trim().is_empty())
        .map(RecordId)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchExpression;
    use pretty_assertions::assert_eq;

    fn client() -> EutilsClient {
        EutilsClient::new(
            "https://example.test/eutils/",
            Some("k3y".into()),
            Some("medrag".into()),
            None,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    fn param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    #[test]
    fn search_url_carries_all_parameters() {
        let request = SearchRequest {
            expression: SearchExpression("(asthma) AND humans[MeSH Terms]".into()),
            max_results: 10,
            recency_days: 1825,
        };
        let url = client().search_url(&request).expect("url");
        assert_eq!(url.path(), "/eutils/esearch.fcgi");
        assert_eq!(param(&url, "db").as_deref(), Some("pubmed"));
        assert_eq!(
            param(&url, "term").as_deref(),
            Some("(asthma) AND humans[MeSH Terms]")
        );
        assert_eq!(param(&url, "retmax").as_deref(), Some("10"));
        assert_eq!(param(&url, "reldate").as_deref(), Some("1825"));
        assert_eq!(param(&url, "datetype").as_deref(), Some("pdat"));
        assert_eq!(param(&url, "sort").as_deref(), Some("relevance"));
        assert_eq!(param(&url, "api_key").as_deref(), Some("k3y"));
        assert_eq!(param(&url, "tool").as_deref(), Some("medrag"));
        assert_eq!(param(&url, "email"), None);
    }

    #[test]
    fn fetch_url_batches_ids() {
        let ids = vec![RecordId("1".into()), RecordId("22".into())];
        let url = client().fetch_url(&ids).expect("url");
        assert_eq!(url.path(), "/eutils/efetch.fcgi");
        assert_eq!(param(&url, "id").as_deref(), Some("1,22"));
        assert_eq!(param(&url, "rettype").as_deref(), Some("abstract"));
        assert_eq!(param(&url, "retmode").as_deref(), Some("xml"));
    }

    #[test]
    fn parses_id_list() {
        let body = r#"{"header":{},"esearchresult":{"count":"2","idlist":["35012345","36099887"]}}"#;
        assert_eq!(
            parse_search_ids(body).expect("ids"),
            vec![RecordId("35012345".into()), RecordId("36099887".into())]
        );
        let empty = r#"{"esearchresult":{"count":"0","idlist":[]}}"#;
        assert!(parse_search_ids(empty).expect("ids").is_empty());
    }

    #[test]
    fn surfaces_service_errors() {
        let body = r#"{"esearchresult":{"ERROR":"Invalid query"}}"#;
        let err = parse_search_ids(body).expect_err("error");
        assert!(err.to_string().contains("Invalid query"));
        assert!(parse_search_ids("<html>").is_err());
    }
}
