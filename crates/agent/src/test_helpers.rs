//! Shared test helpers: a scripted model and an in-process browser.

use async_trait::async_trait;
use escapist_core::error::{ProviderError, ToolError};
use escapist_core::message::{Message, MessageToolCall};
use escapist_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use escapist_tools::{BrowserCallResult, BrowserLauncher, BrowserSession, BrowserToolSpec};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::loop_runner::LoopSettings;

/// A provider that replays a fixed script of responses and errors.
///
/// Every request is recorded. Running past the end of the script is an
/// `ApiError`, which the control loop treats as fatal.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::ApiError {
                    status_code: 599,
                    message: "script exhausted".into(),
                })
            })
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

pub fn tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant("").with_tool_calls(tool_calls),
        usage: usage(),
        model: "mock-model".into(),
    }
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.to_string(),
    }
}

pub fn rate_limited() -> ProviderError {
    ProviderError::RateLimited { retry_after_secs: 60 }
}

/// Default settings with millisecond backoff.
pub fn fast_settings() -> LoopSettings {
    LoopSettings {
        backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(4), 0.25),
        ..LoopSettings::default()
    }
}

/// An in-process browser: every primitive answers with canned text.
pub struct FakeBrowser {
    pub tools: Vec<&'static str>,
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
    pub shut_down: AtomicBool,
    pub fail_listing: bool,
}

impl FakeBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tools: vec![
                "browser_navigate",
                "browser_snapshot",
                "browser_click",
                "browser_close",
                "browser_evaluate",
            ],
            calls: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            fail_listing: false,
        })
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn list_tools(&self) -> Result<Vec<BrowserToolSpec>, ToolError> {
        if self.fail_listing {
            return Err(ToolError::Upstream {
                service: "browser".into(),
                reason: "tools/list failed".into(),
            });
        }
        Ok(self
            .tools
            .iter()
            .map(|name| BrowserToolSpec {
                name: (*name).into(),
                description: String::new(),
                input_schema: serde_json::json!({"type": "object"}),
            })
            .collect())
    }

    async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<BrowserCallResult, ToolError> {
        self.calls.lock().unwrap().push((name.to_string(), arguments));
        let text = match name {
            "browser_snapshot" => "- heading \"Book The Vault\"\n- button \"Sat 7:00 PM\"".to_string(),
            other => format!("{other} ok"),
        };
        Ok(BrowserCallResult { text, is_error: false })
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Hands out the same [`FakeBrowser`] on every launch, or refuses to start.
pub struct FakeLauncher {
    pub browser: Option<Arc<FakeBrowser>>,
    pub launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn with(browser: Arc<FakeBrowser>) -> Arc<Self> {
        Arc::new(Self {
            browser: Some(browser),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            browser: None,
            launches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, ToolError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        match &self.browser {
            Some(b) => Ok(b.clone() as Arc<dyn BrowserSession>),
            None => Err(ToolError::Upstream {
                service: "browser".into(),
                reason: "failed to spawn npx".into(),
            }),
        }
    }
}
