use crate::penalty::PenaltySchedule;
use crate::rules::RuleMatcher;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub rules: RuleConfig,
    pub penalty: PenaltySchedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
    /// Verdicts scoring below this are treated as safe regardless of label.
    pub score_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/moderate".to_string(),
            timeout_ms: 10_000,
            score_threshold: 0.8,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub sexual: Vec<String>,
    pub hate_or_threat: Vec<String>,
    pub grooming: Vec<String>,
    pub link_pattern: String,
    pub phone_pattern: String,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            sexual: vec![
                "sex".to_string(),
                "sexy".to_string(),
                "làm tình".to_string(),
                "khoả thân".to_string(),
                "nude".to_string(),
                "xxx".to_string(),
            ],
            hate_or_threat: vec![
                "giết mày".to_string(),
                "đánh mày".to_string(),
                "đồ ngu".to_string(),
                "câm mồm".to_string(),
                "biến đi".to_string(),
                "kill you".to_string(),
            ],
            grooming: vec![
                "đừng nói với ai".to_string(),
                "giữ bí mật nhé".to_string(),
                "gửi ảnh cho anh".to_string(),
                "bé ơi".to_string(),
            ],
            link_pattern: r"(?:https?://|www\.)[^\s]+".to_string(),
            phone_pattern: r"(?:\+?84|0)\d{8,10}".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks everything `--test-config` cares about: patterns compile, the
    /// threshold is a usable probability, and the endpoint is an http(s) URL.
    pub fn validate(&self) -> Result<()> {
        RuleMatcher::new(&self.rules)?;

        if !(self.classifier.score_threshold > 0.0 && self.classifier.score_threshold <= 1.0) {
            bail!(
                "score_threshold must be in (0, 1], got {}",
                self.classifier.score_threshold
            );
        }
        if self.classifier.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }

        let endpoint = url::Url::parse(&self.classifier.endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("classifier endpoint must be http(s), got {}", endpoint);
        }

        if self.rules.sexual.is_empty()
            && self.rules.hate_or_threat.is_empty()
            && self.rules.grooming.is_empty()
        {
            log::warn!("All keyword lists are empty; rule-based detection is effectively off");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.rules.sexual, config.rules.sexual);
        assert_eq!(parsed.classifier.endpoint, config.classifier.endpoint);
        assert_eq!(parsed.classifier.score_threshold, 0.8);
        assert_eq!(parsed.penalty.base_points, 2);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "classifier:\n  endpoint: http://moderation.internal/moderate\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.classifier.endpoint, "http://moderation.internal/moderate");
        assert_eq!(config.classifier.timeout_ms, 10_000);
        assert!(!config.rules.sexual.is_empty());
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let mut config = Config::default();
        config.classifier.score_threshold = 1.5;
        assert!(config.validate().is_err());

        config.classifier.score_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let mut config = Config::default();
        config.classifier.endpoint = "ftp://example.com/moderate".to_string();
        assert!(config.validate().is_err());

        config.classifier.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = Config::default();
        config.rules.phone_pattern = "(".to_string();
        assert!(config.validate().is_err());
    }
}
