#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use medrag::{
    ClassifierRules, GenerationParams, GenerationRequest, LiteratureSource, LlmProvider, Pipeline,
    PipelineSettings, PlatformIdentity, RecordId, SearchRequest, SearchSettings,
};

/// Timeout applied to every upstream call by [`pipeline_with_timeouts`].
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(20);

/// Delay that outlasts [`SHORT_TIMEOUT`] many times over.
pub const SLOW: Duration = Duration::from_millis(500);

/// Literature source with scripted search results that fetches a valid
/// article for every requested id.
#[derive(Default)]
pub struct StubSource {
    searches: Mutex<VecDeque<Vec<RecordId>>>,
    pub requests: Mutex<Vec<SearchRequest>>,
    pub search_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    search_delay: Option<Duration>,
    fetch_delay: Option<Duration>,
}

impl StubSource {
    pub fn with_searches(searches: Vec<Vec<&str>>) -> Self {
        let scripted = searches
            .into_iter()
            .map(|ids| ids.into_iter().map(|id| RecordId(id.to_string())).collect())
            .collect();
        Self {
            searches: Mutex::new(scripted),
            ..Self::default()
        }
    }

    /// Every search sleeps for `delay` before answering.
    pub fn slow_search(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    /// Every fetch sleeps for `delay` before answering.
    pub fn slow_fetch(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn upstream_calls(&self) -> usize {
        self.searches() + self.fetches()
    }
}

#[async_trait]
impl LiteratureSource for StubSource {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RecordId>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .searches
            .lock()
            .expect("searches lock")
            .pop_front()
            .unwrap_or_default())
    }

    async fn fetch(&self, ids: &[RecordId]) -> Result<String> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let articles: String = ids.iter().map(|id| article_xml(id.as_str())).collect();
        Ok(format!("<?xml version=\"1.0\" ?>\n<PubmedArticleSet>\n{articles}</PubmedArticleSet>\n"))
    }
}

/// A parsable article for `id` with a labeled abstract well above the length gate.
pub fn article_xml(id: &str) -> String {
    format!(
        r#"<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">{id}</PMID>
    <Article>
      <Journal><JournalIssue><PubDate><Year>2022</Year></PubDate></JournalIssue><Title>Diabetes Care</Title></Journal>
      <ArticleTitle>Glycaemic outcomes in trial {id}</ArticleTitle>
      <Abstract>
        <AbstractText Label="BACKGROUND">Glucose-lowering agents differ in their effect on glycated haemoglobin.</AbstractText>
        <AbstractText Label="RESULTS">In trial {id}, HbA1c fell by 1.1 percentage points versus 0.6 with the comparator (p &lt; 0.001).</AbstractText>
      </Abstract>
      <AuthorList>
        <Author><LastName>Smith</LastName><Initials>J</Initials></Author>
      </AuthorList>
      <PublicationTypeList>
        <PublicationType>Randomized Controlled Trial</PublicationType>
      </PublicationTypeList>
    </Article>
  </MedlineCitation>
</PubmedArticle>
"#
    )
}

/// Model stub that records prompts and replies with fixed text or an error.
pub struct StubModel {
    reply: Option<String>,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl StubModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replies with `text`, but only after `delay`.
    pub fn slow(text: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::replying(text)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("prompts lock").last().cloned()
    }
}

#[async_trait]
impl LlmProvider for StubModel {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(request.prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| anyhow!("model returned 503 Service Unavailable"))
    }
}

pub fn pipeline(source: Arc<StubSource>, model: Option<Arc<StubModel>>) -> Pipeline {
    let provider = model.map(|m| m as Arc<dyn LlmProvider>);
    Pipeline::new(
        PipelineSettings::default(),
        source,
        provider,
        &ClassifierRules::default(),
    )
}

/// Like [`pipeline`], with every upstream call bounded by [`SHORT_TIMEOUT`].
pub fn pipeline_with_timeouts(source: Arc<StubSource>, model: Option<Arc<StubModel>>) -> Pipeline {
    let settings = PipelineSettings::new(
        SearchSettings {
            timeout: SHORT_TIMEOUT,
            ..SearchSettings::default()
        },
        10,
        SHORT_TIMEOUT,
        GenerationParams::default(),
        PlatformIdentity::default(),
    );
    let provider = model.map(|m| m as Arc<dyn LlmProvider>);
    Pipeline::new(settings, source, provider, &ClassifierRules::default())
}
