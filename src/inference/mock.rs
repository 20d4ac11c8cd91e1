//! Scripted provider for tests and offline runs.
//!
//! Replies are consumed from a script in order; when the script runs out, the
//! `always` step (if any) repeats. Every call is recorded so tests can assert
//! on what the loop actually sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::errors::InferenceError;
use super::provider::Provider;
use super::types::{GenerationOptions, Message, ProviderReply, Role, ToolDefinition};

type Responder =
    Arc<dyn Fn(&[Message], &[ToolDefinition]) -> Result<ProviderReply, InferenceError> + Send + Sync>;

/// One scripted behavior.
#[derive(Clone)]
pub enum MockStep {
    /// Return a fixed reply.
    Reply(ProviderReply),
    /// Fail with the given error.
    Fail(InferenceError),
    /// Sleep, then reply.
    Delay(Duration, ProviderReply),
    /// Echo the last user message back as text.
    Echo,
    /// Compute the reply from the request.
    Respond(Responder),
}

impl MockStep {
    pub fn respond<F>(f: F) -> Self
    where
        F: Fn(&[Message], &[ToolDefinition]) -> Result<ProviderReply, InferenceError> + Send + Sync + 'static,
    {
        MockStep::Respond(Arc::new(f))
    }
}

/// What the mock saw for one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    /// Names of the tools offered, in order.
    pub tools: Vec<String>,
    pub model_hint: Option<String>,
}

pub struct MockProvider {
    name: String,
    model: String,
    timeout: Duration,
    script: Mutex<VecDeque<MockStep>>,
    always: Option<MockStep>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: "mock-model".into(),
            timeout: Duration::from_secs(5),
            script: Mutex::new(VecDeque::new()),
            always: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Provider that echoes the user's message, for running without a backend.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name).always(MockStep::Echo)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append one step to the script.
    pub fn then(self, step: MockStep) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
        self
    }

    /// Step repeated once the script is exhausted.
    pub fn always(mut self, step: MockStep) -> Self {
        self.always = Some(step);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_step(&self) -> Option<MockStep> {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        scripted.or_else(|| self.always.clone())
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerationOptions,
    ) -> Result<ProviderReply, InferenceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
                model_hint: options.model_hint.clone(),
            });
        }

        let step = self.next_step().ok_or_else(|| InferenceError::MalformedResponse {
            provider: self.name.clone(),
            reason: "mock script exhausted".into(),
        })?;

        match step {
            MockStep::Reply(reply) => Ok(reply),
            MockStep::Fail(error) => Err(error),
            MockStep::Delay(delay, reply) => {
                tokio::time::sleep(delay).await;
                Ok(reply)
            }
            MockStep::Echo => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Ok(ProviderReply::text(self.model.clone(), last_user))
            }
            MockStep::Respond(f) => f(messages, tools),
        }
    }
}
