//! Tool trait, registry and the built-in tools
//!
//! Every tool declares a name, a JSON Schema for its arguments and one for
//! its result. The registry is the name → tool lookup table the orchestrator
//! dispatches through; names are unique.

use crate::error::AgentError;
use crate::index::VectorIndex;
use crate::models::SalesData;
use crate::Result;
use chrono::{Local, NaiveDate};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const GET_CURRENT_DATE: &str = "get_current_date";
pub const GET_SALES: &str = "get_sales";
pub const PRODUCT_DESCRIPTIONS: &str = "product_descriptions";

/// Trait for a single callable tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the arguments object
    fn parameters(&self) -> Value;
    /// JSON Schema of the returned value
    fn returns(&self) -> Value;
    async fn execute(&self, args: &Value) -> Result<Value>;
}

/// What the generation model is told about a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Fails on a name collision instead of replacing the earlier tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name();
        if self.tools.contains_key(name) {
            return Err(AgentError::DuplicateTool(name.to_string()));
        }
        self.tools.insert(name.to_string(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({}))
}

/// A missing arguments object is read as `{}`.
fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args).map_err(|e| AgentError::invalid_tool_input(tool, e))
}

//
// ================= get_current_date =================
//

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CurrentDateArgs {}

pub struct CurrentDateTool;

#[async_trait::async_trait]
impl Tool for CurrentDateTool {
    fn name(&self) -> &'static str {
        GET_CURRENT_DATE
    }

    fn description(&self) -> &'static str {
        "Get the current calendar date"
    }

    fn parameters(&self) -> Value {
        schema_of::<CurrentDateArgs>()
    }

    fn returns(&self) -> Value {
        schema_of::<NaiveDate>()
    }

    async fn execute(&self, _args: &Value) -> Result<Value> {
        Ok(serde_json::to_value(Local::now().date_naive())?)
    }
}

//
// ================= get_sales =================
//

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SalesArgs {
    pub year: i64,
    /// Not range-checked
    pub month: i64,
}

/// Placeholder figure standing in for a real sales source.
pub fn sales_figure(year: i64, month: i64) -> Option<i64> {
    year.checked_mul(month)?.checked_mul(100)
}

pub struct SalesTool;

#[async_trait::async_trait]
impl Tool for SalesTool {
    fn name(&self) -> &'static str {
        GET_SALES
    }

    fn description(&self) -> &'static str {
        "Get the sales figure for a given year and month"
    }

    fn parameters(&self) -> Value {
        schema_of::<SalesArgs>()
    }

    fn returns(&self) -> Value {
        schema_of::<SalesData>()
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let SalesArgs { year, month } = parse_args(GET_SALES, args)?;

        let sales = sales_figure(year, month).ok_or_else(|| AgentError::ToolError {
            tool: GET_SALES.to_string(),
            reason: format!("sales figure overflows for year {} month {}", year, month),
        })?;

        Ok(serde_json::to_value(SalesData { year, month, sales })?)
    }
}

//
// ================= product_descriptions =================
//

fn default_top_k() -> i64 {
    5
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProductDescriptionsArgs {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

/// Retrieval tool backed by the catalog vector index
pub struct ProductDescriptionsTool {
    index: Arc<VectorIndex>,
}

impl ProductDescriptionsTool {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }
}

#[async_trait::async_trait]
impl Tool for ProductDescriptionsTool {
    fn name(&self) -> &'static str {
        PRODUCT_DESCRIPTIONS
    }

    fn description(&self) -> &'static str {
        "Search the product catalog for descriptions matching a free-text query"
    }

    fn parameters(&self) -> Value {
        schema_of::<ProductDescriptionsArgs>()
    }

    fn returns(&self) -> Value {
        schema_of::<Vec<crate::models::ScoredMatch>>()
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let ProductDescriptionsArgs { query, top_k } = parse_args(PRODUCT_DESCRIPTIONS, args)?;

        // Negative counts behave like zero.
        let k = usize::try_from(top_k).unwrap_or(0);
        let matches = self.index.search(&query, k).await?;

        debug!(query = %query, top_k, hits = matches.len(), "Product search");

        Ok(serde_json::to_value(matches)?)
    }
}

/// Registry with the three built-in tools.
pub fn create_default_registry(index: Arc<VectorIndex>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(CurrentDateTool))?;
    registry.register(Arc::new(SalesTool))?;
    registry.register(Arc::new(ProductDescriptionsTool::new(index)))?;

    Ok(registry)
}
