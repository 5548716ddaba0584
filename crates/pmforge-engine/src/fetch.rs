//! Remote document retrieval

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConvertError;

/// Retrieves the text of a remote document.
pub trait Fetcher {
    /// # Errors
    ///
    /// Returns `ConvertError::Fetch` when the document cannot be retrieved
    fn fetch(&self, url: &str) -> Result<String, ConvertError>;
}

/// Blocking HTTP fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpFetcher {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, ConvertError> {
        let fail = |reason: String| ConvertError::Fetch {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| fail(e.to_string()))?;

        let response = client.get(url).send().map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }
        response.text().map_err(|e| fail(e.to_string()))
    }
}

/// Serves documents from memory; unknown URLs fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    documents: HashMap<String, String>,
}

impl MemoryFetcher {
    #[must_use]
    pub fn with_document(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.documents.insert(url.into(), body.into());
        self
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<String, ConvertError> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| ConvertError::Fetch {
                url: url.to_string(),
                reason: "not available offline".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fetcher_serves_known_urls() {
        let fetcher = MemoryFetcher::default().with_document("http://x/a.json", "{}");
        assert_eq!(fetcher.fetch("http://x/a.json").unwrap(), "{}");
        assert!(matches!(
            fetcher.fetch("http://x/b.json"),
            Err(ConvertError::Fetch { .. })
        ));
    }
}
