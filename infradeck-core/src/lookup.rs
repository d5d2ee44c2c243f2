//! Async fetch bridge
//!
//! Inventory lookups (secret retrieval plus a remote API call) run as tokio
//! tasks. [`FetchBridge::request`] returns immediately; the task delivers
//! exactly one [`AppEvent::LookupFinished`] into the controller's queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::reducer::AppEvent;

pub const DEFAULT_INCLUDE_PATTERN: &str = r"^ubuntu-server-24\.04\..*";
pub const DEFAULT_EXCLUDE_SUFFIX: &str = "-test";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("secret lookup failed: {0}")]
    Secret(String),
    #[error("inventory request failed: {0}")]
    Request(String),
    #[error("unexpected inventory response: {0}")]
    Malformed(String),
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of template names for a cluster
#[async_trait]
pub trait InventoryLookup: Send + Sync {
    async fn templates_for(&self, cluster: &str) -> Result<Vec<String>, LookupError>;
}

/// Name policy applied to inventory results before they reach the form
#[derive(Clone, Debug)]
pub struct TemplateFilter {
    include: Regex,
    exclude_suffix: String,
}

impl TemplateFilter {
    pub fn new(include: &str, exclude_suffix: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            include: Regex::new(include)?,
            exclude_suffix: exclude_suffix.to_string(),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.include.is_match(name)
            && (self.exclude_suffix.is_empty() || !name.ends_with(&self.exclude_suffix))
    }

    pub fn apply<I, S>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(Into::into)
            .filter(|n| self.matches(n))
            .collect()
    }
}

impl Default for TemplateFilter {
    fn default() -> Self {
        Self::new(DEFAULT_INCLUDE_PATTERN, DEFAULT_EXCLUDE_SUFFIX)
            .expect("default template pattern compiles")
    }
}

/// One outstanding "refresh the dependent field's options" request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupRequest {
    pub dependent: String,
    pub trigger_value: String,
    pub token: u64,
}

#[derive(Clone)]
pub struct FetchBridge {
    lookup: Arc<dyn InventoryLookup>,
    events: UnboundedSender<AppEvent>,
    timeout: Duration,
}

impl FetchBridge {
    pub fn new(lookup: Arc<dyn InventoryLookup>, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            lookup,
            events,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a lookup without waiting for it. Must be called inside a tokio
    /// runtime.
    pub fn request(&self, request: LookupRequest) -> JoinHandle<()> {
        let lookup = Arc::clone(&self.lookup);
        let events = self.events.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, lookup.templates_for(&request.trigger_value)).await {
                Ok(result) => result,
                Err(_) => Err(LookupError::Timeout(timeout)),
            };
            match &result {
                Ok(names) => tracing::info!(cluster = %request.trigger_value, count = names.len(), "inventory lookup finished"),
                Err(e) => tracing::warn!(cluster = %request.trigger_value, error = %e, "inventory lookup failed"),
            }

            let event = AppEvent::LookupFinished {
                dependent: request.dependent,
                token: request.token,
                result: result.map_err(|e| e.to_string()),
            };
            // receiver gone means the app is shutting down
            let _ = events.send(event);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct StaticLookup(Result<Vec<String>, LookupError>);

    #[async_trait]
    impl InventoryLookup for StaticLookup {
        async fn templates_for(&self, _cluster: &str) -> Result<Vec<String>, LookupError> {
            self.0.clone()
        }
    }

    struct SlowLookup;

    #[async_trait]
    impl InventoryLookup for SlowLookup {
        async fn templates_for(&self, _cluster: &str) -> Result<Vec<String>, LookupError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
    }

    fn request(token: u64) -> LookupRequest {
        LookupRequest {
            dependent: "vm_template".into(),
            trigger_value: "cl12600k".into(),
            token,
        }
    }

    #[test]
    fn test_default_filter() {
        let filter = TemplateFilter::default();
        let kept = filter.apply([
            "ubuntu-server-24.04.1",
            "ubuntu-server-24.04.2-test",
            "ubuntu-server-22.04.5",
            "debian-12",
        ]);
        assert_eq!(kept, ["ubuntu-server-24.04.1"]);
    }

    #[test]
    fn test_filter_without_suffix() {
        let filter = TemplateFilter::new("^win-", "").unwrap();
        assert!(filter.matches("win-2022-test"));
        assert!(!filter.matches("ubuntu"));
    }

    #[tokio::test]
    async fn test_bridge_delivers_one_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = FetchBridge::new(
            Arc::new(StaticLookup(Ok(vec!["ubuntu-server-24.04.1".into()]))),
            tx,
        );

        bridge.request(request(7)).await.unwrap();

        match rx.recv().await.unwrap() {
            AppEvent::LookupFinished { dependent, token, result } => {
                assert_eq!(dependent, "vm_template");
                assert_eq!(token, 7);
                assert_eq!(result.unwrap(), ["ubuntu-server-24.04.1"]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bridge_reports_errors_as_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = FetchBridge::new(
            Arc::new(StaticLookup(Err(LookupError::MissingCredentials(
                "TF_VAR_role_id".into(),
            )))),
            tx,
        );

        bridge.request(request(1)).await.unwrap();

        match rx.recv().await.unwrap() {
            AppEvent::LookupFinished { result, .. } => {
                assert!(result.unwrap_err().contains("TF_VAR_role_id"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_times_out() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = FetchBridge::new(Arc::new(SlowLookup), tx).with_timeout(Duration::from_secs(2));

        bridge.request(request(3)).await.unwrap();

        match rx.recv().await.unwrap() {
            AppEvent::LookupFinished { result, .. } => {
                assert!(result.unwrap_err().contains("timed out"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
