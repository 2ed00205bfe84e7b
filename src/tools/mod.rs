//! Tool trait and registry
//!
//! Tools are name-keyed external data-fetch operations. Resolution is
//! case-insensitive and whitespace-insensitive; an unresolved name is a
//! non-retryable error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::PipelineError;
use crate::Result;

/// Trait for a single external data provider
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn fetch(&self, subject: &str) -> Result<Value>;
}

/// Casefold and strip whitespace so `"Alpha Vantage"`, `"alphavantage"`,
/// and `" ALPHA VANTAGE "` all resolve to the same entry.
pub fn normalize_tool_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Tool registry for looking up providers by normalized name
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(normalize_tool_name(tool.name()), tool);
    }

    /// Resolve a requested name. Unknown names fail fast.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(&normalize_tool_name(name))
            .cloned()
            .ok_or_else(|| PipelineError::UnknownTool(name.trim().to_string()))
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.values().map(|t| t.name()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared pooled HTTP client for the market-data providers.
/// The request timeout is the per-call deadline.
#[derive(Clone)]
struct MarketDataClient {
    client: Client,
}

impl MarketDataClient {
    fn new() -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

pub struct AlphaVantageTool {
    api: MarketDataClient,
    api_key: String,
}

#[async_trait::async_trait]
impl Tool for AlphaVantageTool {
    fn name(&self) -> &'static str {
        "Alpha Vantage"
    }

    fn description(&self) -> &'static str {
        "Daily adjusted time series from alphavantage.co"
    }

    async fn fetch(&self, subject: &str) -> Result<Value> {
        let response = self
            .api
            .client
            .get("https://www.alphavantage.co/query")
            .query(&[
                ("function", "TIME_SERIES_DAILY_ADJUSTED"),
                ("symbol", subject),
                ("outputsize", "compact"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| tool_failure(self.name(), e))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| tool_failure(self.name(), e))?;

        if !status.is_success() {
            return Err(PipelineError::ToolFailed {
                tool: self.name().to_string(),
                cause: format!("HTTP {} from provider", status),
            });
        }

        // The provider reports request-level errors inside a 200 body
        if let Some(message) = payload.get("Error Message").and_then(Value::as_str) {
            return Err(PipelineError::ToolFailed {
                tool: self.name().to_string(),
                cause: message.to_string(),
            });
        }

        Ok(payload)
    }
}

pub struct YahooFinanceTool {
    api: MarketDataClient,
    api_key: String,
}

#[async_trait::async_trait]
impl Tool for YahooFinanceTool {
    fn name(&self) -> &'static str {
        "Yahoo Finance"
    }

    fn description(&self) -> &'static str {
        "One month of daily chart data from yfapi.net"
    }

    async fn fetch(&self, subject: &str) -> Result<Value> {
        let url = format!("https://yfapi.net/v8/finance/chart/{}", subject);

        let response = self
            .api
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .query(&[("range", "1mo"), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| tool_failure(self.name(), e))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| tool_failure(self.name(), e))?;

        if !status.is_success() {
            return Err(PipelineError::ToolFailed {
                tool: self.name().to_string(),
                cause: format!("HTTP {} from provider", status),
            });
        }

        Ok(payload)
    }
}

fn tool_failure(tool: &str, error: reqwest::Error) -> PipelineError {
    PipelineError::ToolFailed {
        tool: tool.to_string(),
        cause: error.to_string(),
    }
}

/// Create the default registry with both HTTP-backed market-data providers.
pub fn create_default_registry(config: &Config) -> ToolRegistry {
    let api = MarketDataClient::new();
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(AlphaVantageTool {
        api: api.clone(),
        api_key: config.alpha_vantage_api_key.clone(),
    }));
    registry.register(Arc::new(YahooFinanceTool {
        api,
        api_key: config.yahoo_finance_api_key.clone(),
    }));

    registry
}
