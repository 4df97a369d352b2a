//! Agent runner
//!
//! Drives one user turn: the model is called with the cumulative history and
//! the two database tools, tool calls are executed in order and their results
//! fed back until the model answers in plain text. Each model request runs
//! inside the retrying invoker and the history is replaced only when the turn
//! succeeds.

use crate::agent::deps::AgentDeps;
use crate::agent::prompt;
use crate::agent::tools::{self, ToolError};
use crate::error::{DbdexError, Result};
use crate::llm::provider::{GenerationParams, LLMProvider, LLMResponse, Message, ToolDefinition};
use crate::llm::retry::RetryingInvoker;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Model calls allowed per user turn
pub const MAX_STEPS: usize = 10;

/// Retryable failures tolerated per tool per turn
pub const MAX_TOOL_RETRIES: u32 = 2;

/// Outcome of a completed turn
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Final text reply
    pub output: String,
    /// Full transcript including this turn
    pub messages: Vec<Message>,
    /// Model calls made
    pub steps: usize,
    /// Whether the reply was already written to the sink while streaming
    pub streamed: bool,
}

/// Owns the conversation and the session dependencies
pub struct AgentRunner {
    provider: Arc<dyn LLMProvider>,
    deps: AgentDeps,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    params: GenerationParams,
    invoker: RetryingInvoker,
    stream: bool,
    message_history: Option<Vec<Message>>,
}

impl AgentRunner {
    /// Create a runner whose system prompt describes the connected database
    pub fn new(provider: Arc<dyn LLMProvider>, deps: AgentDeps) -> Result<Self> {
        let system_prompt = prompt::system_prompt(&deps.database)?;
        Ok(Self {
            provider,
            deps,
            system_prompt,
            tools: tools::definitions(),
            params: GenerationParams::default(),
            invoker: RetryingInvoker::default(),
            stream: false,
            message_history: None,
        })
    }

    /// Write reply text to the sink as it arrives
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_invoker(mut self, invoker: RetryingInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn deps(&self) -> &AgentDeps {
        &self.deps
    }

    pub fn provider(&self) -> &dyn LLMProvider {
        self.provider.as_ref()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn message_history(&self) -> Option<&[Message]> {
        self.message_history.as_deref()
    }

    /// Forget the conversation; the next turn starts from the system prompt
    pub fn clear_message_history(&mut self) {
        self.message_history = None;
    }

    /// Answer `query`; transient model faults retry the failing request only
    pub async fn run(&mut self, query: &str) -> Result<RunOutput> {
        let output = self.run_turn(query).await?;

        info!(steps = output.steps, messages = output.messages.len(), "turn complete");
        self.message_history = Some(output.messages.clone());
        Ok(output)
    }

    async fn run_turn(&self, query: &str) -> Result<RunOutput> {
        let mut messages = match self.message_history.as_deref() {
            Some(history) => history.to_vec(),
            None => vec![Message::system(self.system_prompt.clone())],
        };
        messages.push(Message::user(query));

        let mut retries: HashMap<String, u32> = HashMap::new();

        for step in 1..=MAX_STEPS {
            let response = self.request(&messages).await?;

            debug!(
                step,
                tool_calls = response.tool_calls.len(),
                tokens = ?response.get_total_tokens(),
                "model step"
            );
            messages.push(response.to_message());

            if !response.has_tool_calls() {
                return Ok(RunOutput {
                    output: response.content,
                    messages,
                    steps: step,
                    streamed: self.stream,
                });
            }

            for call in &response.tool_calls {
                match tools::dispatch(&self.deps, call).await {
                    Ok(content) => messages.push(Message::tool_result(&call.id, content)),
                    Err(ToolError::Retry(message)) => {
                        let count = retries.entry(call.name.clone()).or_insert(0);
                        *count += 1;
                        if *count > MAX_TOOL_RETRIES {
                            return Err(DbdexError::Agent(format!(
                                "Tool '{}' exceeded max retries count of {}",
                                call.name, MAX_TOOL_RETRIES
                            )));
                        }
                        warn!(tool = %call.name, retry = *count, error = %message, "tool asked model to retry");
                        messages.push(Message::tool_error(
                            &call.id,
                            ToolError::retry_message(&message),
                        ));
                    }
                    Err(ToolError::Fatal(err)) => return Err(err),
                }
            }
        }

        Err(DbdexError::Agent(format!(
            "No final answer after {} model steps",
            MAX_STEPS
        )))
    }

    /// One model request, retried on transient faults
    async fn request(&self, messages: &[Message]) -> Result<LLMResponse> {
        self.invoker
            .invoke(move || async move {
                if self.stream {
                    let sink = self.deps.sink.clone();
                    let mut on_text = move |text: &str| sink.write_chunk(text);
                    self.provider
                        .generate_stream(messages, &self.tools, Some(&self.params), &mut on_text)
                        .await
                } else {
                    self.provider
                        .generate(messages, &self.tools, Some(&self.params))
                        .await
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::deps::BufferSink;
    use crate::database::manager::DatabaseManager;
    use crate::llm::provider::{MessageRole, ToolCall};
    use crate::llm::retry::Backoff;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses and records what it was sent
    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<LLMResponse>>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<LLMResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last_request(&self) -> Vec<Message> {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn generate(
            &self,
            messages: &[Message],
            _tools: &[ToolDefinition],
            _params: Option<&GenerationParams>,
        ) -> Result<LLMResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LLMResponse::new("out of script")))
        }

        fn provider_name(&self) -> &str {
            "Scripted"
        }

        fn model(&self) -> &str {
            "script"
        }

        fn has_api_key(&self) -> bool {
            true
        }
    }

    struct NoWait;

    #[async_trait]
    impl Backoff for NoWait {
        async fn wait(&self, _delay: Duration) {}
    }

    fn sql_call(id: &str, sql: &str) -> LLMResponse {
        LLMResponse::with_tool_calls(vec![ToolCall::new(id, tools::EXECUTE_SQL, json!({ "sql": sql }))])
    }

    async fn runner(provider: Arc<ScriptedProvider>, sink: Arc<BufferSink>) -> AgentRunner {
        let database = DatabaseManager::connect("sqlite::memory:").await.unwrap();
        let deps = AgentDeps::new(Arc::new(database), sink);
        AgentRunner::new(provider, deps)
            .unwrap()
            .with_invoker(RetryingInvoker::new().with_backoff(NoWait))
    }

    #[tokio::test]
    async fn test_tool_round_trip_and_history() {
        let provider = ScriptedProvider::new(vec![
            Ok(sql_call("c1", "SELECT 42 AS answer")),
            Ok(LLMResponse::new("The answer is 42.")),
            Ok(LLMResponse::new("Still 42.")),
        ]);
        let mut runner = runner(provider.clone(), Arc::new(BufferSink::new())).await;

        let output = runner.run("What is the answer?").await.unwrap();
        assert_eq!(output.output, "The answer is 42.");
        assert_eq!(output.steps, 2);

        let history = runner.message_history().unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(history[3].role, MessageRole::Tool);
        assert_eq!(history[3].content, r#"{"columns":["answer"],"rows":[[42]]}"#);

        runner.run("And again?").await.unwrap();
        assert_eq!(provider.last_request().len(), 6);
        assert_eq!(runner.message_history().unwrap().len(), 7);

        runner.clear_message_history();
        assert!(runner.message_history().is_none());
    }

    #[tokio::test]
    async fn test_guard_rejection_is_sent_back() {
        let provider = ScriptedProvider::new(vec![
            Ok(sql_call("c1", "DELETE FROM users")),
            Ok(LLMResponse::new("I can only read data.")),
        ]);
        let mut runner = runner(provider.clone(), Arc::new(BufferSink::new())).await;

        runner.run("Delete every user").await.unwrap();
        let request = provider.last_request();
        let tool_message = request.last().unwrap();
        assert!(tool_message.is_error);
        assert_eq!(
            tool_message.content,
            "Only SELECT style queries are allowed\n\nFix the errors and try again."
        );
    }

    #[tokio::test]
    async fn test_tool_retries_are_bounded() {
        let provider = ScriptedProvider::new(vec![
            Ok(sql_call("c1", "DROP TABLE a")),
            Ok(sql_call("c2", "DROP TABLE b")),
            Ok(sql_call("c3", "DROP TABLE c")),
        ]);
        let mut runner = runner(provider.clone(), Arc::new(BufferSink::new())).await;

        let err = runner.run("Drop everything").await.unwrap_err();
        assert!(matches!(err, DbdexError::Agent(_)));
        assert_eq!(provider.calls(), 3);
        assert!(runner.message_history().is_none());
    }

    #[tokio::test]
    async fn test_execution_fault_ends_turn() {
        let provider = ScriptedProvider::new(vec![
            Ok(sql_call("c1", "SELECT * FROM missing")),
            Ok(LLMResponse::new("unreachable")),
        ]);
        let mut runner = runner(provider.clone(), Arc::new(BufferSink::new())).await;

        let err = runner.run("Show missing").await.unwrap_err();
        assert!(matches!(err, DbdexError::Execution { .. }));
        assert_eq!(provider.calls(), 1);
        assert!(runner.deps().last_result().await.unwrap().error.is_some());
    }

    fn overloaded() -> DbdexError {
        DbdexError::LLMApiError {
            provider: "Scripted".to_string(),
            message: "503 model overloaded".to_string(),
            status: 503,
        }
    }

    #[tokio::test]
    async fn test_overload_retries_model_request() {
        let provider = ScriptedProvider::new(vec![
            Err(overloaded()),
            Err(overloaded()),
            Ok(LLMResponse::new("Hello!")),
        ]);
        let mut runner = runner(provider.clone(), Arc::new(BufferSink::new())).await;

        let output = runner.run("Hi").await.unwrap();
        assert_eq!(output.output, "Hello!");
        assert_eq!(provider.calls(), 3);
        assert_eq!(runner.message_history().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_overload_mid_turn_does_not_replay_earlier_steps() {
        let checking = LLMResponse {
            content: "Checking. ".to_string(),
            ..sql_call("c1", "SELECT 1 AS one")
        };
        let provider = ScriptedProvider::new(vec![
            Ok(checking),
            Err(overloaded()),
            Ok(LLMResponse::new("Done.")),
        ]);
        let sink = Arc::new(BufferSink::new());
        let mut runner = runner(provider.clone(), sink.clone()).await.with_streaming(true);

        let output = runner.run("Count one").await.unwrap();
        assert_eq!(output.output, "Done.");
        assert_eq!(sink.contents(), "Checking. Done.");
        assert_eq!(provider.calls(), 3);

        // the retried request carries the single tool result from step one
        let request = provider.last_request();
        let tool_results = request.iter().filter(|m| m.role == MessageRole::Tool).count();
        assert_eq!(tool_results, 1);
        assert_eq!(runner.message_history().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_streaming_writes_to_sink() {
        let provider = ScriptedProvider::new(vec![Ok(LLMResponse::new("streamed reply"))]);
        let sink = Arc::new(BufferSink::new());
        let mut runner = runner(provider, sink.clone()).await.with_streaming(true);

        let output = runner.run("Hi").await.unwrap();
        assert!(output.streamed);
        assert_eq!(sink.contents(), "streamed reply");
    }

    #[tokio::test]
    async fn test_step_limit() {
        let replies = (0..MAX_STEPS)
            .map(|i| Ok(sql_call(&format!("c{}", i), "SELECT 1")))
            .collect();
        let provider = ScriptedProvider::new(replies);
        let mut runner = runner(provider.clone(), Arc::new(BufferSink::new())).await;

        let err = runner.run("Loop forever").await.unwrap_err();
        assert!(matches!(err, DbdexError::Agent(ref m) if m.contains("10 model steps")));
        assert_eq!(provider.calls(), MAX_STEPS);
    }
}
