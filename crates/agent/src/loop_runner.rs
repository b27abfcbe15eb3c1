//! The control loop shared by every Escapist agent.
//!
//! ```text
//! AGENT ──tool calls──▶ TOOLS ──▶ AGENT
//!   │  └─rate limited, retries left: sleep, AGENT again
//!   │  └─rate limited, retries exhausted──▶ ERROR ──▶ DONE
//!   └─text only──▶ DONE
//! ```
//!
//! Any provider failure other than a rate limit aborts the run with `Err`.
//! Tool failures never do: they become error text in the tool result.

use escapist_config::AppConfig;
use escapist_core::message::{Conversation, Message};
use escapist_core::provider::{Provider, ProviderRequest, ToolDefinition};
use escapist_core::tool::{ToolCall, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;

/// Shown when the loop ends in ERROR without a configured message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Service temporarily unavailable. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Agent,
    Tools,
    Error,
    Done,
}

/// Rate-limit bookkeeping for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Consecutive rate-limited model calls; reset by any success
    pub attempt_count: u32,
    pub rate_limited: bool,
    pub error_message: Option<String>,
}

/// Model and retry parameters common to all agents.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_retries: u32,
    pub backoff: Backoff,
    pub rate_limit_message: String,
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            max_retries: config.retry.max_retries,
            backoff: Backoff::from_config(&config.retry),
            rate_limit_message: config.retry.rate_limit_message.clone(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Content of the final conversation message
    pub text: String,
    pub conversation: Conversation,
    pub retry: RetryState,
    /// Every state entered, in order, ending with `Done`
    pub trace: Vec<LoopState>,
}

/// One agent: a system prompt, a tool table and a model.
pub struct ControlLoop {
    name: String,
    provider: Arc<dyn Provider>,
    settings: LoopSettings,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
}

impl ControlLoop {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        settings: LoopSettings,
        system_prompt: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            settings,
            system_prompt: system_prompt.into(),
            tools,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Drive `conversation` until the model stops asking for tools or the
    /// rate-limit budget is spent.
    pub async fn run(&self, mut conversation: Conversation) -> escapist_core::Result<LoopOutcome> {
        info!(
            agent = %self.name,
            conversation_id = %conversation.id,
            tools = self.tools.len(),
            "Starting run"
        );

        let definitions = self.tools.definitions();
        let mut retry = RetryState::default();
        let mut trace = Vec::new();
        let mut state = LoopState::Agent;

        loop {
            trace.push(state);
            state = match state {
                LoopState::Agent => {
                    let request = ProviderRequest {
                        model: self.settings.model.clone(),
                        system: self.system_prompt.clone(),
                        messages: conversation.messages().to_vec(),
                        temperature: self.settings.temperature,
                        max_tokens: self.settings.max_tokens,
                        tools: definitions.clone(),
                        tool_choice: None,
                    };

                    match self.provider.complete(request).await {
                        Ok(response) => {
                            retry.attempt_count = 0;
                            let wants_tools = response.message.requests_tools();
                            debug!(
                                agent = %self.name,
                                tool_calls = response.message.tool_calls.len(),
                                "Model responded"
                            );
                            conversation.push(response.message);
                            if wants_tools {
                                LoopState::Tools
                            } else {
                                LoopState::Done
                            }
                        }
                        Err(e) if e.is_rate_limit() => {
                            retry.attempt_count += 1;
                            if retry.attempt_count > self.settings.max_retries {
                                warn!(
                                    agent = %self.name,
                                    attempt = retry.attempt_count,
                                    "Rate limit retries exhausted"
                                );
                                retry.rate_limited = true;
                                retry.error_message = Some(self.settings.rate_limit_message.clone());
                                LoopState::Error
                            } else {
                                let delay = self
                                    .settings
                                    .backoff
                                    .delay(retry.attempt_count - 1, &mut rand::thread_rng());
                                warn!(
                                    agent = %self.name,
                                    attempt = retry.attempt_count,
                                    max_retries = self.settings.max_retries,
                                    delay_secs = delay.as_secs_f64(),
                                    "Rate limited, backing off"
                                );
                                tokio::time::sleep(delay).await;
                                LoopState::Agent
                            }
                        }
                        Err(e) => {
                            warn!(agent = %self.name, error = %e, "Model call failed, aborting run");
                            return Err(e.into());
                        }
                    }
                }
                LoopState::Tools => {
                    self.dispatch_tools(&mut conversation).await;
                    LoopState::Agent
                }
                LoopState::Error => {
                    let message = retry
                        .error_message
                        .clone()
                        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
                    conversation.push(Message::assistant(message));
                    LoopState::Done
                }
                LoopState::Done => break,
            };
        }

        let text = conversation
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        info!(
            agent = %self.name,
            messages = conversation.len(),
            rate_limited = retry.rate_limited,
            "Run complete"
        );

        Ok(LoopOutcome {
            text,
            conversation,
            retry,
            trace,
        })
    }

    /// One more model call over a finished `conversation`, followed by
    /// `instruction`, that must answer through `tool`.
    ///
    /// Rate limits are retried on the same budget and backoff as a run.
    /// Returns the call's arguments, or `None` when the budget is spent or
    /// the model produced no usable call.
    pub async fn force_tool(
        &self,
        conversation: &Conversation,
        instruction: &str,
        tool: ToolDefinition,
    ) -> escapist_core::Result<Option<serde_json::Value>> {
        let name = tool.name.clone();
        let mut messages = conversation.messages().to_vec();
        messages.push(Message::user(instruction));
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            system: self.system_prompt.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools: vec![tool],
            tool_choice: Some(name.clone()),
        };

        let mut attempt = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    let Some(call) = response.message.tool_calls.into_iter().find(|tc| tc.name == name)
                    else {
                        warn!(agent = %self.name, tool = %name, "Model skipped the required tool");
                        return Ok(None);
                    };
                    return match serde_json::from_str(&call.arguments) {
                        Ok(arguments) => Ok(Some(arguments)),
                        Err(e) => {
                            warn!(agent = %self.name, tool = %name, error = %e, "Unparseable tool arguments");
                            Ok(None)
                        }
                    };
                }
                Err(e) if e.is_rate_limit() => {
                    attempt += 1;
                    if attempt > self.settings.max_retries {
                        warn!(agent = %self.name, tool = %name, attempt, "Rate limit retries exhausted");
                        return Ok(None);
                    }
                    let delay = self.settings.backoff.delay(attempt - 1, &mut rand::thread_rng());
                    warn!(
                        agent = %self.name,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(agent = %self.name, error = %e, "Model call failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Answer every call in the last assistant message, sequentially and in
    /// issue order, one tool result per call.
    async fn dispatch_tools(&self, conversation: &mut Conversation) {
        let calls = conversation
            .last()
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        for tc in calls {
            let (output, failed) = match serde_json::from_str::<serde_json::Value>(&tc.arguments) {
                Ok(arguments) => {
                    let call = ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        arguments,
                    };
                    debug!(agent = %self.name, tool = %tc.name, "Executing tool");
                    match self.tools.execute(&call).await {
                        Ok(result) => {
                            if !result.success {
                                debug!(agent = %self.name, tool = %tc.name, "Tool reported failure");
                            }
                            (result.output, !result.success)
                        }
                        Err(e) => {
                            warn!(agent = %self.name, tool = %tc.name, error = %e, "Tool execution failed");
                            (format!("Error: {e}"), true)
                        }
                    }
                }
                Err(e) => {
                    warn!(agent = %self.name, tool = %tc.name, error = %e, "Unparseable tool arguments");
                    (format!("Error: invalid arguments for {}: {e}", tc.name), true)
                }
            };

            conversation.push(if failed {
                Message::tool_error(&tc.id, output)
            } else {
                Message::tool_result(&tc.id, output)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use escapist_core::error::{ProviderError, ToolError};
    use escapist_core::message::Role;
    use escapist_core::tool::{Tool, ToolResult};
    use std::time::Duration;

    struct NamedTool {
        name: &'static str,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            if self.fail {
                Err(ToolError::ExecutionFailed {
                    tool_name: self.name.into(),
                    reason: "boom".into(),
                })
            } else {
                Ok(ToolResult::ok(format!("{} done", self.name)))
            }
        }
    }

    fn registry(tools: Vec<NamedTool>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Box::new(tool));
        }
        Arc::new(registry)
    }

    fn control(provider: Arc<ScriptedProvider>, tools: Arc<ToolRegistry>) -> ControlLoop {
        ControlLoop::new("test", provider, fast_settings(), "You are a test agent", tools)
    }

    #[tokio::test]
    async fn text_only_goes_straight_to_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("Hello"))]));
        let outcome = control(provider.clone(), registry(vec![]))
            .run(Conversation::from_user("hi"))
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello");
        assert_eq!(outcome.trace, vec![LoopState::Agent, LoopState::Done]);
        assert_eq!(outcome.conversation.len(), 2);

        let requests = provider.requests();
        assert_eq!(requests[0].system, "You are a test agent");
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn one_tool_round_then_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![tool_call("c1", "lookup", serde_json::json!({}))])),
            Ok(text_response("Found it")),
        ]));
        let tools = registry(vec![NamedTool { name: "lookup", fail: false }]);
        let outcome = control(provider.clone(), tools)
            .run(Conversation::from_user("find"))
            .await
            .unwrap();

        assert_eq!(
            outcome.trace,
            vec![LoopState::Agent, LoopState::Tools, LoopState::Agent, LoopState::Done]
        );
        assert_eq!(outcome.text, "Found it");

        // The second request carries the tool result, and both carry the schema.
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools[0].name, "lookup");
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(last.content, "lookup done");
    }

    #[tokio::test]
    async fn tool_results_follow_call_order_despite_failures() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![
                tool_call("a", "alpha", serde_json::json!({})),
                tool_call("b", "beta", serde_json::json!({})),
                tool_call("c", "gamma", serde_json::json!({})),
            ])),
            Ok(text_response("done")),
        ]));
        let tools = registry(vec![
            NamedTool { name: "alpha", fail: false },
            NamedTool { name: "beta", fail: false },
            NamedTool { name: "gamma", fail: true },
        ]);
        let outcome = control(provider, tools)
            .run(Conversation::from_user("go"))
            .await
            .unwrap();

        let results: Vec<(&str, &str)> = outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id.as_deref().unwrap(), m.content.as_str()))
            .collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ("a", "alpha done"));
        assert_eq!(results[1], ("b", "beta done"));
        assert_eq!(results[2].0, "c");
        assert!(results[2].1.starts_with("Error: "));
        assert!(results[2].1.contains("boom"));

        let flags: Vec<bool> = outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.is_error)
            .collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_become_error_text() {
        let mut bad = tool_call("b", "lookup", serde_json::json!({}));
        bad.arguments = "{not json".into();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![
                tool_call("a", "missing_tool", serde_json::json!({})),
                bad,
            ])),
            Ok(text_response("recovered")),
        ]));
        let tools = registry(vec![NamedTool { name: "lookup", fail: false }]);
        let outcome = control(provider, tools)
            .run(Conversation::from_user("go"))
            .await
            .unwrap();

        let tool_msgs: Vec<&Message> = outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert!(tool_msgs[0].content.contains("Tool not found: missing_tool"));
        assert!(tool_msgs[1].content.starts_with("Error: invalid arguments for lookup"));
        assert!(tool_msgs.iter().all(|m| m.is_error));
        assert_eq!(outcome.text, "recovered");
    }

    fn record_tool() -> ToolDefinition {
        ToolDefinition {
            name: "record".into(),
            description: "record things".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn force_tool_returns_the_call_arguments() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(rate_limited()),
            Ok(tool_call_response(vec![tool_call(
                "r1",
                "record",
                serde_json::json!({"items": [1, 2]}),
            )])),
        ]));
        let control = control(provider.clone(), registry(vec![NamedTool { name: "lookup", fail: false }]));
        let mut conversation = Conversation::from_user("find");
        conversation.push(Message::assistant("Found two"));

        let arguments = control
            .force_tool(&conversation, "Record them.", record_tool())
            .await
            .unwrap();
        assert_eq!(arguments, Some(serde_json::json!({"items": [1, 2]})));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].tool_choice.as_deref(), Some("record"));
        assert_eq!(requests[1].tools.len(), 1);
        assert_eq!(requests[1].tools[0].name, "record");
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[1].messages[2].content, "Record them.");
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn force_tool_without_a_call_is_none() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("no tool for you"))]));
        let control = control(provider, registry(vec![]));
        let arguments = control
            .force_tool(&Conversation::from_user("find"), "Record them.", record_tool())
            .await
            .unwrap();
        assert_eq!(arguments, None);
    }

    #[tokio::test]
    async fn force_tool_gives_up_after_rate_limit_budget() {
        let settings = fast_settings();
        let script: Vec<_> = (0..=settings.max_retries).map(|_| Err(rate_limited())).collect();
        let provider = Arc::new(ScriptedProvider::new(script));
        let control = control(provider.clone(), registry(vec![]));

        let arguments = control
            .force_tool(&Conversation::from_user("find"), "Record them.", record_tool())
            .await
            .unwrap();
        assert_eq!(arguments, None);
        assert_eq!(provider.requests().len() as u32, settings.max_retries + 1);
    }

    struct SoftFailTool;

    #[async_trait::async_trait]
    impl Tool for SoftFailTool {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "reports failure as a result"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::failure("Could not find coordinates for 'Atlantis'."))
        }
    }

    #[tokio::test]
    async fn failed_tool_results_carry_the_error_flag() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![
                tool_call("a", "search", serde_json::json!({})),
                tool_call("b", "lookup", serde_json::json!({})),
            ])),
            Ok(text_response("done")),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SoftFailTool));
        registry.register(Box::new(NamedTool { name: "lookup", fail: false }));
        control(provider.clone(), Arc::new(registry))
            .run(Conversation::from_user("go"))
            .await
            .unwrap();

        let requests = provider.requests();
        let sent: Vec<&Message> = requests[1]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(sent[0].content, "Could not find coordinates for 'Atlantis'.");
        assert!(sent[0].is_error);
        assert_eq!(sent[1].content, "lookup done");
        assert!(!sent[1].is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_max_retries_rate_limits() {
        let settings = LoopSettings::default();
        let mut script: Vec<_> = (0..settings.max_retries).map(|_| Err(rate_limited())).collect();
        script.push(Ok(text_response("Finally")));
        let provider = Arc::new(ScriptedProvider::new(script));

        let started = tokio::time::Instant::now();
        let outcome = ControlLoop::new("test", provider.clone(), settings, "sys", registry(vec![]))
            .run(Conversation::from_user("hi"))
            .await
            .unwrap();

        assert_eq!(outcome.text, "Finally");
        assert_eq!(outcome.retry, RetryState::default());
        assert_eq!(provider.requests().len(), 6);
        assert!(!outcome.conversation.messages().iter().any(|m| m.content == GENERIC_FAILURE_MESSAGE));
        // 60 + 120 + 240 + 300 + 300 nominal, each within ±25%.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs_f64(1020.0 * 0.75));
        assert!(waited <= Duration::from_secs_f64(1020.0 * 1.25 + 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_end_in_error_message() {
        let settings = LoopSettings::default();
        let script: Vec<_> = (0..=settings.max_retries).map(|_| Err(rate_limited())).collect();
        let provider = Arc::new(ScriptedProvider::new(script));

        let outcome = ControlLoop::new("test", provider.clone(), settings.clone(), "sys", registry(vec![]))
            .run(Conversation::from_user("hi"))
            .await
            .unwrap();

        assert!(outcome.retry.rate_limited);
        assert_eq!(outcome.retry.attempt_count, settings.max_retries + 1);
        assert_eq!(outcome.text, settings.rate_limit_message);
        assert_eq!(outcome.trace.iter().rev().nth(1), Some(&LoopState::Error));
        assert_eq!(outcome.trace.last(), Some(&LoopState::Done));
        assert_eq!(provider.requests().len() as u32, settings.max_retries + 1);

        let last = outcome.conversation.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_attempt_count() {
        // Two throttles, a tool round, two more throttles: never more than
        // two consecutive, so five retries are plenty.
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Ok(tool_call_response(vec![tool_call("a", "lookup", serde_json::json!({}))])),
            Err(rate_limited()),
            Err(rate_limited()),
            Ok(text_response("ok")),
        ]));
        let mut settings = fast_settings();
        settings.max_retries = 2;
        let outcome = ControlLoop::new(
            "test",
            provider,
            settings,
            "sys",
            registry(vec![NamedTool { name: "lookup", fail: false }]),
        )
        .run(Conversation::from_user("hi"))
        .await
        .unwrap();

        assert_eq!(outcome.text, "ok");
        assert!(!outcome.retry.rate_limited);
    }

    #[tokio::test]
    async fn unexpected_provider_error_aborts() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::ApiError {
            status_code: 500,
            message: "internal".into(),
        })]));
        let err = control(provider.clone(), registry(vec![]))
            .run(Conversation::from_user("hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, escapist_core::Error::Provider(ProviderError::ApiError { status_code: 500, .. })));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn raw_429_counts_as_rate_limit() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::ApiError {
                status_code: 429,
                message: "slow down".into(),
            }),
            Ok(text_response("ok")),
        ]));
        let outcome = control(provider, registry(vec![]))
            .run(Conversation::from_user("hi"))
            .await
            .unwrap();
        assert_eq!(outcome.text, "ok");
        assert_eq!(outcome.trace, vec![LoopState::Agent, LoopState::Agent, LoopState::Done]);
    }

    #[test]
    fn settings_from_config() {
        let mut config = AppConfig::default();
        config.retry.max_retries = 2;
        config.model = "claude-haiku".into();
        let settings = LoopSettings::from_config(&config);
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.model, "claude-haiku");
        assert_eq!(settings.max_tokens, Some(4096));
    }
}
