//! Bounded tool-calling loop for the agent tier.
//!
//! Call the model with the tool definitions; if it asks for tools, run them,
//! feed the results back and call again. The loop ends when the model
//! answers in plain text. A model that still wants tools after
//! `max_rounds` rounds fails with `RoundLimitExceeded`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use carwise_core::error::TierError;
use carwise_core::event::{DomainEvent, EventBus};
use carwise_core::message::Message;
use carwise_core::provider::{Provider, ProviderRequest};
use carwise_core::tool::ToolCall;
use carwise_tools::ToolBox;
use tracing::{debug, info, warn};

use crate::reasoning::ReasoningCapture;

/// What a finished loop produced.
#[derive(Debug, Clone)]
pub struct ToolLoopOutcome {
    pub final_text: String,
    /// Rounds in which tools were executed
    pub rounds: u32,
    pub tool_calls: usize,
    pub model: String,
}

pub struct ToolLoop<'a> {
    provider: &'a dyn Provider,
    tools: &'a ToolBox,
    event_bus: Option<&'a Arc<EventBus>>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_rounds: u32,
    call_timeout: Duration,
}

impl<'a> ToolLoop<'a> {
    pub fn new(provider: &'a dyn Provider, tools: &'a ToolBox, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools,
            event_bus: None,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_rounds: 3,
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_event_bus(mut self, bus: &'a Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Bound on each model call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run the loop over `messages`, reporting every tool step to `capture`.
    pub async fn run(
        &self,
        mut messages: Vec<Message>,
        capture: &mut ReasoningCapture,
    ) -> Result<ToolLoopOutcome, TierError> {
        let definitions = self.tools.definitions();
        let mut rounds = 0u32;
        let mut tool_calls = 0usize;

        info!(model = %self.model, max_rounds = self.max_rounds, tools = ?self.tools.names(), "Tool loop starting");

        loop {
            let mut request = ProviderRequest::new(self.model.clone(), messages.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = definitions.clone();

            let response = tokio::time::timeout(self.call_timeout, self.provider.complete(request))
                .await
                .map_err(|_| {
                    TierError::ModelUnavailable(format!(
                        "no response within {}s",
                        self.call_timeout.as_secs()
                    ))
                })??;

            if !response.message.has_tool_calls() {
                info!(rounds, tool_calls, "Tool loop completed");
                return Ok(ToolLoopOutcome {
                    final_text: response.message.content.trim().to_string(),
                    rounds,
                    tool_calls,
                    model: response.model,
                });
            }

            if rounds >= self.max_rounds {
                warn!(limit = self.max_rounds, "Model still requesting tools at round limit");
                return Err(TierError::RoundLimitExceeded {
                    limit: self.max_rounds,
                });
            }
            rounds += 1;
            debug!(round = rounds, calls = response.message.tool_calls.len(), "Tool round");

            let rationale = response.message.content.clone();
            let requested = response.message.tool_calls.clone();
            messages.push(response.message);

            for raw in &requested {
                tool_calls += 1;
                capture.on_tool_selected(&raw.name, &raw.arguments, &rationale);

                let call = match ToolCall::parse(raw) {
                    Ok(call) => call,
                    Err(e) => {
                        capture.on_tool_result(&e.to_string(), false);
                        return Err(e.into());
                    }
                };

                let start = Instant::now();
                let result = self.tools.execute(&call).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                self.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: result.is_ok(),
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });

                match result {
                    Ok(output) => {
                        capture.on_tool_result(&output.output, output.success);
                        messages.push(Message::tool_result(&call.id, output.output));
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool call failed");
                        capture.on_tool_result(&e.to_string(), false);
                        return Err(e.into());
                    }
                }
            }
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = self.event_bus {
            bus.publish(event);
        }
    }
}
