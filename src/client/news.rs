//! Headline sentiment from the Marketaux news API
//!
//! Keyword rules: any headline mentioning bankruptcy or
//! dilution makes a symbol negative, earnings beats make it positive.

use crate::error::Result;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.marketaux.com";

const NEGATIVE_TERMS: &[&str] = &["bankruptcy", "dilution"];
const POSITIVE_TERMS: &[&str] = &["record revenue", "strong earnings"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Clone)]
pub struct NewsClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    data: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: String,
}

impl NewsClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Sentiment for a symbol; request failures count as neutral
    pub async fn sentiment(&self, symbol: &str) -> Sentiment {
        match self.fetch_titles(symbol).await {
            Ok(titles) => classify_headlines(&titles),
            Err(e) => {
                warn!("News lookup failed for {}: {}", symbol, e);
                Sentiment::Neutral
            }
        }
    }

    async fn fetch_titles(&self, symbol: &str) -> Result<Vec<String>> {
        let url = format!("{}/v1/news/all", self.base_url);
        let resp: NewsResponse = self
            .http
            .get(&url)
            .query(&[
                ("symbols", symbol),
                ("filter_entities", "true"),
                ("language", "en"),
                ("api_token", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.data.into_iter().map(|a| a.title).collect())
    }
}

/// First matching headline decides, scanning in order
pub fn classify_headlines<S: AsRef<str>>(titles: &[S]) -> Sentiment {
    for title in titles {
        let title = title.as_ref().to_lowercase();
        if NEGATIVE_TERMS.iter().any(|t| title.contains(t)) {
            return Sentiment::Negative;
        }
        if POSITIVE_TERMS.iter().any(|t| title.contains(t)) {
            return Sentiment::Positive;
        }
    }
    Sentiment::Neutral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_headline() {
        let titles = ["Company files for Bankruptcy protection", "Strong earnings expected"];
        assert_eq!(classify_headlines(&titles), Sentiment::Negative);
    }

    #[test]
    fn test_positive_headline() {
        let titles = ["Firm posts record revenue in Q2"];
        assert_eq!(classify_headlines(&titles), Sentiment::Positive);
    }

    #[test]
    fn test_first_match_wins() {
        let titles = ["Strong earnings beat", "Share dilution announced"];
        assert_eq!(classify_headlines(&titles), Sentiment::Positive);
    }

    #[test]
    fn test_no_match_is_neutral() {
        let titles: [&str; 0] = [];
        assert_eq!(classify_headlines(&titles), Sentiment::Neutral);
        assert_eq!(classify_headlines(&["Quiet trading day"]), Sentiment::Neutral);
    }
}
