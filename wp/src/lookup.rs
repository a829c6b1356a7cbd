//! Lookup - ground planning in current facts
//!
//! A [`Lookup`] turns a free-text query into free text. The text is never
//! parsed by the workflow: the oracle reduces it to a few relevant facts
//! which are then appended to the ledger as a `System` entry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LookupConfig;
use crate::oracle::{GenerateRequest, Oracle};
use crate::prompts::PromptLoader;

/// Reply token budget for the reduction call
const REDUCTION_MAX_TOKENS: u32 = 512;

/// Sentinel the reduction prompt uses when nothing was relevant
const NOTHING_RELEVANT: &str = "NONE";

/// Errors from a lookup backend
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Lookup request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Lookup service returned HTTP {0}")]
    Status(u16),

    #[error("Lookup returned no results")]
    Empty,
}

/// Search collaborator
#[async_trait]
pub trait Lookup: Send + Sync {
    /// Run a query and return raw result text
    async fn search(&self, query: &str) -> Result<String, LookupError>;

    fn name(&self) -> &str;
}

/// DuckDuckGo Instant Answer API
pub struct DuckDuckGoLookup {
    base_url: String,
    max_results: usize,
    http: reqwest::Client,
}

impl DuckDuckGoLookup {
    pub fn from_config(config: &LookupConfig) -> Result<Self, LookupError> {
        debug!(base_url = %config.base_url, "DuckDuckGoLookup::from_config: called");
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("webpilot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            http,
        })
    }

    /// Flatten an instant answer into plain lines
    fn summarize(&self, answer: InstantAnswer) -> Result<String, LookupError> {
        let mut lines = Vec::new();

        for text in [answer.answer, answer.abstract_text, answer.definition] {
            if !text.trim().is_empty() {
                lines.push(text.trim().to_string());
            }
        }
        if !answer.abstract_url.is_empty() {
            lines.push(format!("Source: {}", answer.abstract_url));
        }

        let related = answer
            .related_topics
            .into_iter()
            .flat_map(RelatedTopic::flatten)
            .filter(|t| !t.text.trim().is_empty())
            .take(self.max_results);
        for topic in related {
            match topic.first_url {
                Some(url) if !url.is_empty() => lines.push(format!("{} ({})", topic.text.trim(), url)),
                _ => lines.push(topic.text.trim().to_string()),
            }
        }

        debug!(lines = lines.len(), "DuckDuckGoLookup::summarize: done");
        if lines.is_empty() {
            return Err(LookupError::Empty);
        }
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl Lookup for DuckDuckGoLookup {
    async fn search(&self, query: &str) -> Result<String, LookupError> {
        debug!(%query, "DuckDuckGoLookup::search: called");
        let response = self
            .http
            .get(format!("{}/", self.base_url))
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }

        let answer: InstantAnswer = response.json().await?;
        self.summarize(answer)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Answer")]
    answer: String,
    #[serde(rename = "AbstractText")]
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    #[serde(rename = "Definition")]
    definition: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

/// Either a single topic or a named group of topics
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedTopic {
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
    #[serde(rename = "Topics")]
    topics: Vec<RelatedTopic>,
}

impl RelatedTopic {
    fn flatten(self) -> Vec<RelatedTopic> {
        if self.topics.is_empty() {
            vec![self]
        } else {
            self.topics.into_iter().flat_map(RelatedTopic::flatten).collect()
        }
    }
}

/// Queries a lookup and has the oracle keep only what matters for the task
pub struct Grounder {
    lookup: Arc<dyn Lookup>,
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptLoader>,
}

impl Grounder {
    pub fn new(lookup: Arc<dyn Lookup>, oracle: Arc<dyn Oracle>, prompts: Arc<PromptLoader>) -> Self {
        debug!(lookup = lookup.name(), "Grounder::new: called");
        Self { lookup, oracle, prompts }
    }

    /// Facts relevant to `task`, or `None` when the lookup or reduction fails
    /// or finds nothing useful
    pub async fn ground(&self, task: &str) -> Option<String> {
        debug!(task_len = task.len(), "Grounder::ground: called");

        let results = match self.lookup.search(task).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, lookup = self.lookup.name(), "Lookup failed, planning without it");
                return None;
            }
        };

        let request = match (self.prompts.lookup_system(), self.prompts.lookup_user(task, &results)) {
            (Ok(system), Ok(user)) => GenerateRequest::new(system, user).with_max_tokens(REDUCTION_MAX_TOKENS),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Lookup prompt could not be built");
                return None;
            }
        };

        let reduced = match self.oracle.generate(request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Lookup reduction failed, planning without it");
                return None;
            }
        };

        if reduced.is_empty() || reduced == NOTHING_RELEVANT {
            debug!("Grounder::ground: nothing relevant");
            return None;
        }

        info!(facts_len = reduced.len(), "Grounded task with lookup facts");
        Some(reduced)
    }
}
