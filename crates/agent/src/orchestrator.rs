//! The orchestration loop.
//!
//! One `run` handles one user message: invoke the model, execute the tool
//! calls it asks for in order, feed the results back, and repeat until the
//! model answers with text or the iteration ceiling is hit.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatdesk_config::AgentConfig;
use chatdesk_core::error::{Error, PreconditionFailed, ToolError};
use chatdesk_core::event::{DomainEvent, EventBus};
use chatdesk_core::provider::{ModelRequest, ModelResponse, Provider, RequestedCall};
use chatdesk_core::session::Session;
use chatdesk_core::tool::{ToolContext, ToolRegistry};
use chatdesk_core::turn::{Arguments, ToolOutcome, Turn};
use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::prompt;
use crate::stage_tracker::StageTracker;

/// Outcome text for handler faults. Details go to the log, not the model.
const HANDLER_FAULT_REASON: &str = "The operation failed unexpectedly. Please try again.";

/// Drives a session through model invocations and tool executions.
pub struct Orchestrator {
    /// The language model
    provider: Arc<dyn Provider>,

    /// Registered tools, read-only after startup
    tools: Arc<ToolRegistry>,

    /// Stage gating and transitions
    tracker: StageTracker,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Maximum model invocations per run
    max_iterations: u32,

    /// Deadline for each model invocation
    model_timeout: Duration,

    /// Deadline for each tool handler
    tool_timeout: Duration,

    /// Instruction text placed before the status block
    base_prompt: String,

    /// Replaces `base_prompt` once the session is routed to the unit
    unit_prompts: HashMap<String, String>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            tools,
            tracker: StageTracker::new(),
            event_bus,
            max_iterations: 10,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(15),
            base_prompt: prompt::DEFAULT_BASE_PROMPT.to_string(),
            unit_prompts: HashMap::new(),
        }
    }

    /// Build with the limits and prompt from the `[agent]` section.
    pub fn from_config(
        config: &AgentConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let orchestrator = Self::new(provider, tools, event_bus)
            .with_max_iterations(config.max_iterations)
            .with_model_timeout(config.model_timeout())
            .with_tool_timeout(config.tool_timeout());
        match &config.system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => orchestrator.with_base_prompt(prompt.clone()),
            _ => orchestrator,
        }
    }

    /// Set the maximum number of model invocations per run (at least 1).
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Replace the base instruction. The status block is always appended.
    pub fn with_base_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_prompt = prompt.into();
        self
    }

    /// Base instructions keyed by business unit. Blank entries are ignored.
    pub fn with_unit_prompts(mut self, prompts: HashMap<String, String>) -> Self {
        self.unit_prompts = prompts
            .into_iter()
            .filter(|(_, prompt)| !prompt.trim().is_empty())
            .collect();
        self
    }

    /// The base instruction for the session's selected unit, if it has one.
    fn base_prompt_for(&self, session: &Session) -> &str {
        session
            .facts
            .company
            .as_deref()
            .and_then(|unit| self.unit_prompts.get(unit))
            .unwrap_or(&self.base_prompt)
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Process one user message against `session`.
    ///
    /// Turns and stage transitions committed before a failure stay in the
    /// session; the caller decides whether to persist them.
    pub async fn run(&self, session: &mut Session, user_text: &str) -> Result<String, Error> {
        if session.stage.is_terminal() {
            return Err(Error::SessionAlreadyEnded {
                session_id: session.id.to_string(),
            });
        }

        info!(
            session_id = %session.id,
            stage = %session.stage,
            turns = session.context.len(),
            "Processing message"
        );

        session.context.append(Turn::user(user_text))?;
        self.event_bus.publish(DomainEvent::TurnStarted {
            session_id: session.id.to_string(),
            stage: session.stage,
            timestamp: Utc::now(),
        });

        match self.drive(session).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(session_id = %session.id, stage = %session.stage, error = %e, "Orchestration failed");
                self.event_bus.publish(DomainEvent::OrchestrationFailed {
                    session_id: session.id.to_string(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&self, session: &mut Session) -> Result<String, Error> {
        let mut last_successful_tool: Option<String> = None;
        let mut preamble: Option<String> = None;

        for iteration in 1..=self.max_iterations {
            let permitted = self.tracker.permitted_tools(session.stage);
            let request = ModelRequest::new(
                session.context.snapshot().to_vec(),
                self.tools.declarations_for(permitted),
            )
            .with_system(prompt::system_instruction(
                self.base_prompt_for(session),
                session,
                permitted,
            ));

            debug!(
                session_id = %session.id,
                iteration,
                stage = %session.stage,
                tools = request.tools.len(),
                "Invoking model"
            );

            let response = tokio::time::timeout(self.model_timeout, self.provider.generate(request))
                .await
                .map_err(|_| Error::ModelTimeout {
                    timeout_secs: self.model_timeout.as_secs(),
                })??;

            let calls = match response {
                ModelResponse::Text { text } => {
                    return self.finish(session, iteration, text, last_successful_tool, preamble);
                }
                ModelResponse::ToolCalls { calls, preamble: p } => {
                    if let Some(p) = p.filter(|p| !p.trim().is_empty()) {
                        preamble = Some(p);
                    }
                    if calls.is_empty() {
                        return self.finish(
                            session,
                            iteration,
                            String::new(),
                            last_successful_tool,
                            preamble,
                        );
                    }
                    calls
                }
            };

            debug!(session_id = %session.id, iteration, tool_count = calls.len(), "Executing tool calls");

            // Strictly in emitted order; later calls see earlier effects
            for call in calls {
                let name = call.name.clone();
                if self.execute_call(session, call).await?.is_success() {
                    last_successful_tool = Some(name);
                }
            }
        }

        Err(Error::OrchestrationExhausted {
            iterations: self.max_iterations,
        })
    }

    fn finish(
        &self,
        session: &mut Session,
        iterations: u32,
        text: String,
        last_successful_tool: Option<String>,
        preamble: Option<String>,
    ) -> Result<String, Error> {
        let text = if !text.trim().is_empty() {
            text
        } else if last_successful_tool.is_some() {
            prompt::fallback_reply(
                last_successful_tool.as_deref(),
                session.facts.company.as_deref(),
            )
        } else if let Some(preamble) = preamble {
            preamble
        } else {
            warn!(session_id = %session.id, "Model returned an empty answer");
            prompt::fallback_reply(None, session.facts.company.as_deref())
        };

        session.context.append(Turn::model_text(text.clone()))?;
        self.event_bus.publish(DomainEvent::TurnCompleted {
            session_id: session.id.to_string(),
            iterations,
            timestamp: Utc::now(),
        });
        info!(session_id = %session.id, iterations, stage = %session.stage, "Turn completed");
        Ok(text)
    }

    /// Append the call, produce its outcome, append the result, advance.
    async fn execute_call(
        &self,
        session: &mut Session,
        call: RequestedCall,
    ) -> Result<ToolOutcome, Error> {
        let RequestedCall {
            call_id,
            name,
            arguments,
            malformed,
        } = call;

        session
            .context
            .append(Turn::tool_call(&call_id, &name, arguments.clone()))?;

        let start = Instant::now();
        let checked = match malformed {
            Some(bad) => {
                debug!(
                    session_id = %session.id,
                    tool = %name,
                    call_id = %call_id,
                    raw = %bad.raw,
                    "Tool call has undecodable arguments"
                );
                Err(PreconditionFailed::new(format!("Invalid arguments: {}", bad.error)))
            }
            None => self
                .tracker
                .validate(session.stage, &session.facts, &name, &arguments),
        };
        let outcome = match checked {
            Err(rejected) => {
                debug!(
                    session_id = %session.id,
                    tool = %name,
                    call_id = %call_id,
                    reason = %rejected.reason,
                    "Tool call rejected"
                );
                ToolOutcome::failure(rejected.reason)
            }
            Ok(()) => self.dispatch(session, &name, &arguments).await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        session
            .context
            .append(Turn::tool_result(&call_id, &name, outcome.clone()))?;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            session_id: session.id.to_string(),
            tool_name: name.clone(),
            success: outcome.is_success(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let from = session.stage;
        let to = self.tracker.advance(from, &name, &outcome, &session.facts);
        if to != from {
            info!(session_id = %session.id, tool = %name, from = %from, to = %to, "Stage advanced");
            session.stage = to;
            self.event_bus.publish(DomainEvent::StageAdvanced {
                session_id: session.id.to_string(),
                from,
                to,
                timestamp: Utc::now(),
            });
        }

        Ok(outcome)
    }

    /// Run the handler under a deadline against a scratch copy of the facts.
    /// The copy is committed only when the handler returns normally.
    async fn dispatch(
        &self,
        session: &mut Session,
        name: &str,
        arguments: &Arguments,
    ) -> ToolOutcome {
        let mut scratch = session.facts.clone();
        let result = {
            let mut ctx = ToolContext::new(&session.id, &mut scratch);
            let handler = AssertUnwindSafe(self.tools.dispatch(name, &mut ctx, arguments));
            tokio::time::timeout(self.tool_timeout, handler.catch_unwind()).await
        };

        match result {
            Ok(Ok(Ok(outcome))) => {
                session.facts = scratch;
                debug!(session_id = %session.id, tool = %name, success = outcome.is_success(), "Tool finished");
                outcome
            }
            Ok(Ok(Err(ToolError::InvalidArguments(msg)))) => {
                debug!(session_id = %session.id, tool = %name, error = %msg, "Invalid tool arguments");
                ToolOutcome::failure(format!("Invalid arguments: {msg}"))
            }
            Ok(Ok(Err(ToolError::UnknownTool(unknown)))) => {
                warn!(session_id = %session.id, tool = %unknown, "Model called an unregistered tool");
                ToolOutcome::failure(format!("Unknown tool: {unknown}"))
            }
            Ok(Ok(Err(e))) => {
                warn!(session_id = %session.id, tool = %name, error = %e, "Tool execution failed");
                ToolOutcome::failure(HANDLER_FAULT_REASON)
            }
            Ok(Err(_panic)) => {
                error!(session_id = %session.id, tool = %name, "Tool handler panicked");
                ToolOutcome::failure(HANDLER_FAULT_REASON)
            }
            Err(_) => {
                warn!(
                    session_id = %session.id,
                    tool = %name,
                    timeout_secs = self.tool_timeout.as_secs(),
                    "Tool timed out"
                );
                ToolOutcome::failure(format!(
                    "Tool '{name}' timed out after {}s",
                    self.tool_timeout.as_secs()
                ))
            }
        }
    }
}
