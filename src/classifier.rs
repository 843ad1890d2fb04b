use crate::message::Category;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Closed label set returned by the moderation model. The wire value is an
/// arbitrary string; `parse` folds it into this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Normal,
    Scam,
    Sexual,
    Grooming,
    HateOrThreat,
}

impl Label {
    /// Folds the model's label vocabulary into the closed set. `hate`,
    /// `insult` and `threat` are known synonyms for `hate_or_threat`; an
    /// unrecognized label also maps there: a label the pipeline has never
    /// seen must not slip through as safe.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "normal" => Label::Normal,
            "scam" => Label::Scam,
            "sexual" => Label::Sexual,
            "grooming" => Label::Grooming,
            "hate_or_threat" | "hate" | "insult" | "threat" => Label::HateOrThreat,
            other => {
                log::warn!("Unrecognized classifier label '{other}', treating as hate_or_threat");
                Label::HateOrThreat
            }
        }
    }

    /// The violation category this label maps to; `None` for `normal`.
    pub fn category(self) -> Option<Category> {
        match self {
            Label::Normal => None,
            Label::Scam => Some(Category::Scam),
            Label::Sexual => Some(Category::Sexual),
            Label::Grooming => Some(Category::Grooming),
            Label::HateOrThreat => Some(Category::HateOrThreat),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: Label,
    pub score: f64,
}

/// Seam for the remote moderation call so the orchestrator can be exercised
/// against canned verdicts and simulated outages.
pub trait Classify: Send + Sync {
    fn classify(&self, text: &str) -> impl Future<Output = Result<Verdict>> + Send;
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    label: String,
    #[serde(default)]
    score: Value,
}

/// HTTP client for the external moderation endpoint. The whole request runs
/// under one hard timeout; the caller decides what a failure means.
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteClassifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chat-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building moderation HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl Classify for RemoteClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .with_context(|| format!("classifier request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!("classifier returned {status}");
        }

        let raw: RawVerdict = response
            .json()
            .await
            .context("malformed classifier response")?;
        let score = raw.score.as_f64().filter(|s| s.is_finite()).unwrap_or(0.0);
        Ok(Verdict {
            label: Label::parse(&raw.label),
            score,
        })
    }
}
