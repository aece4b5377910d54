//! Full-text search consumed as a tool.
//!
//! The orchestration core never talks to the search engine directly -- the
//! index is reached exclusively through this `Tool` implementation, so the
//! core stays free of the search wire protocol.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use planweave_core::tool::Tool;
use planweave_types::tool::{ToolDescriptor, ToolError};

// ---------------------------------------------------------------------------
// Configuration and wire types
// ---------------------------------------------------------------------------

/// Configuration for the search endpoint.
#[derive(Clone)]
pub struct HttpSearchConfig {
    /// Tool name the model sees (e.g. "search_product_qa").
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// Full URL of the query endpoint.
    pub endpoint: String,
    pub api_key: String,
}

/// Arguments the model supplies for a search call.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Query text to search for.
    pub query: String,
    /// Maximum number of hits to return.
    #[serde(default)]
    pub top_k: Option<u32>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    size: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

const DEFAULT_TOP_K: u32 = 5;

// ---------------------------------------------------------------------------
// HttpSearchTool
// ---------------------------------------------------------------------------

/// Full-text search over an HTTP query endpoint.
pub struct HttpSearchTool {
    client: reqwest::Client,
    descriptor: ToolDescriptor,
    endpoint: String,
    api_key: String,
}

impl HttpSearchTool {
    pub fn new(config: HttpSearchConfig) -> Self {
        let descriptor = ToolDescriptor::new::<SearchArgs>(&config.name, &config.description);
        Self {
            client: reqwest::Client::new(),
            descriptor,
            endpoint: config.endpoint,
            api_key: config.api_key,
        }
    }

    fn parse_args(&self, args: Value) -> Result<SearchArgs, ToolError> {
        serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
            tool: self.descriptor.name.clone(),
            message: e.to_string(),
        })
    }
}

impl Tool for HttpSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Value) -> Result<Vec<Value>, ToolError> {
        let args = self.parse_args(args)?;
        let size = args.top_k.unwrap_or(DEFAULT_TOP_K);

        tracing::debug!(
            tool = self.descriptor.name.as_str(),
            query = args.query.as_str(),
            size,
            "search tool invoked"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SearchRequest {
                query: &args.query,
                size,
            })
            .send()
            .await
            .map_err(|e| ToolError::Invocation {
                tool: self.descriptor.name.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Invocation {
                tool: self.descriptor.name.clone(),
                message: format!("{status}: {body}"),
            });
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|e| ToolError::Invocation {
                tool: self.descriptor.name.clone(),
                message: e.to_string(),
            })?;
        Ok(parsed.results)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
