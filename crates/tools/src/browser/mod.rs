//! Browser tool bridge.
//!
//! A [`BrowserSession`] is one live connection to a browser automation host.
//! Only the primitives in [`ALLOWED_BROWSER_TOOLS`] are exposed to the model;
//! everything else the host offers is filtered out before the model sees it.

pub mod mcp;

use async_trait::async_trait;
use escapist_core::error::ToolError;
use escapist_core::tool::{Tool, ToolRegistry, ToolResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub use mcp::{McpBrowserHost, McpSession};

/// Browser primitives the reservationist may use.
pub const ALLOWED_BROWSER_TOOLS: &[&str] = &[
    "browser_navigate",
    "browser_click",
    "browser_type",
    "browser_snapshot",
    "browser_scroll",
    "browser_select_option",
    "browser_press_key",
    "browser_go_back",
    "browser_tab_close",
    "browser_close",
];

/// A primitive as advertised by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Outcome of one primitive call.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserCallResult {
    pub text: String,
    /// The host reported the call itself as failed
    pub is_error: bool,
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<BrowserToolSpec>, ToolError>;

    async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<BrowserCallResult, ToolError>;

    /// Release the host. Safe to call more than once.
    async fn shutdown(&self);
}

/// Starts a fresh session per availability check.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, ToolError>;
}

/// One allow-listed primitive exposed as a [`Tool`].
pub struct BrowserTool {
    spec: BrowserToolSpec,
    description: String,
    session: Arc<dyn BrowserSession>,
}

impl BrowserTool {
    pub fn new(spec: BrowserToolSpec, session: Arc<dyn BrowserSession>) -> Self {
        let description = if spec.description.trim().is_empty() {
            format!("Browser tool: {}", spec.name)
        } else {
            spec.description.clone()
        };
        Self {
            spec,
            description,
            session,
        }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.spec.input_schema.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        debug!(tool = %self.spec.name, "Browser call");
        match self.session.call(&self.spec.name, arguments).await {
            Ok(result) if result.is_error => Ok(ToolResult::failure(result.text)),
            Ok(result) => Ok(ToolResult::ok(result.text)),
            Err(e) => {
                warn!(tool = %self.spec.name, error = %e, "Browser call failed");
                Ok(ToolResult::failure(format!(
                    "Error executing {}: {e}",
                    self.spec.name
                )))
            }
        }
    }
}

pub fn is_allowed(name: &str) -> bool {
    ALLOWED_BROWSER_TOOLS.contains(&name)
}

/// Tool table for a session: the host's primitives, minus anything off the
/// allow-list, in the order the host listed them.
pub async fn browser_registry(session: Arc<dyn BrowserSession>) -> Result<ToolRegistry, ToolError> {
    let specs = session.list_tools().await?;
    let offered = specs.len();

    let mut registry = ToolRegistry::new();
    for spec in specs.into_iter().filter(|s| is_allowed(&s.name)) {
        registry.register(Box::new(BrowserTool::new(spec, session.clone())));
    }

    debug!(offered, exposed = registry.len(), "Browser tools filtered");
    Ok(registry)
}
