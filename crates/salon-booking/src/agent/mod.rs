//! Conversational booking assistant: a hosted chat model driving the booking tools.

pub mod llm_client;
pub mod prompt;
pub mod tools;

pub use llm_client::{ChatModel, ModelReply, OpenAiChatModel, ToolDefinition};
pub use prompt::{system_prompt, SalonProfile};
pub use tools::BookingTools;

use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::booking_db::BookingDatabase;
use crate::config::Config;
use crate::error::{BookingError, BookingResult, ExternalFailure};
use crate::memory::{InMemoryMemoryStore, MemoryStore, Message};
use crate::metrics;

pub const NOT_CONFIGURED_REPLY: &str = "The chat assistant is not configured yet. \
     Please set OPENAI_API_KEY to enable it. You can still book through the booking form.";
const AUTH_FAILURE_REPLY: &str = "Sorry, the assistant cannot reach the AI service because of an API key problem. \
     Please contact the salon directly.";
const RATE_LIMIT_REPLY: &str =
    "Sorry, the assistant is busy right now. Please try again in a few minutes.";
const GENERIC_FAILURE_REPLY: &str =
    "Sorry, something went wrong while handling your message. Please try again later.";
const STEP_LIMIT_REPLY: &str =
    "Sorry, I couldn't finish that request. Could you rephrase it or give me a bit more detail?";
const EMPTY_REPLY: &str = "Sorry, I don't have an answer for that right now.";

fn apology_for(err: &BookingError) -> &'static str {
    match err {
        BookingError::ExternalService { kind: ExternalFailure::Authentication, .. } => AUTH_FAILURE_REPLY,
        BookingError::ExternalService { kind: ExternalFailure::RateLimited, .. } => RATE_LIMIT_REPLY,
        _ => GENERIC_FAILURE_REPLY,
    }
}

pub struct ChatAgent {
    model: Arc<dyn ChatModel>,
    tools: BookingTools,
    definitions: Vec<ToolDefinition>,
    memory: Arc<dyn MemoryStore>,
    salon: SalonProfile,
    max_steps: usize,
}

impl ChatAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: BookingTools,
        memory: Arc<dyn MemoryStore>,
        salon: SalonProfile,
        max_steps: usize,
    ) -> Self {
        Self {
            model,
            tools,
            definitions: BookingTools::definitions(),
            memory,
            salon,
            max_steps: max_steps.max(1),
        }
    }

    /// Build the agent from configuration. `None` when no usable API key is set.
    pub fn from_config(config: &Config, database: Arc<BookingDatabase>) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.api_key() else {
            warn!("OPENAI_API_KEY not configured; chat will answer with a setup notice");
            return Ok(None);
        };
        let model = OpenAiChatModel::new(
            &config.openai_base_url,
            api_key,
            &config.chat_model,
            config.chat_temperature,
            Duration::from_secs(config.llm_timeout_seconds),
        )?;
        info!("Chat agent ready with model {}", config.chat_model);
        Ok(Some(Self::new(
            Arc::new(model),
            BookingTools::new(database, config.operating_hours()),
            Arc::new(InMemoryMemoryStore::new(config.chat_history_limit)),
            SalonProfile {
                name: config.salon_name.clone(),
                phone: config.salon_phone.clone(),
                address: config.salon_address.clone(),
            },
            config.agent_max_steps,
        )))
    }

    /// Answer one customer message. Failures become an apology, never an error.
    pub async fn chat(&self, conversation_id: &str, message: &str) -> String {
        let started = Instant::now();
        let reply = match self.run_turn(conversation_id, message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Chat turn for {} failed: {}", conversation_id, e);
                apology_for(&e).to_string()
            }
        };
        metrics::observe_agent_turn(started.elapsed().as_secs_f64());
        reply
    }

    async fn run_turn(&self, conversation_id: &str, message: &str) -> BookingResult<String> {
        let today = Local::now().date_naive();
        let mut messages = vec![Message::system(system_prompt(&self.salon, today))];
        messages.extend(self.memory.get_history(conversation_id));
        let first_new = messages.len();
        messages.push(Message::user(message));

        for step in 0..self.max_steps {
            let reply = self.model.complete(&messages, &self.definitions).await?;

            if reply.tool_calls.is_empty() {
                let text = reply
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| EMPTY_REPLY.to_string());
                messages.push(Message::assistant(text.clone()));
                self.memory
                    .append(conversation_id, messages.split_off(first_new));
                return Ok(text);
            }

            debug!(
                "Step {} of {}: {} tool call(s)",
                step + 1,
                conversation_id,
                reply.tool_calls.len()
            );
            let calls = reply.tool_calls.clone();
            messages.push(Message::assistant_tool_calls(
                reply.content.unwrap_or_default(),
                reply.tool_calls,
            ));
            for call in calls {
                let output = self.tools.invoke(&call.name, &call.arguments);
                messages.push(Message::tool_result(call.id, output));
            }
        }

        warn!(
            "Conversation {} hit the {} step limit",
            conversation_id, self.max_steps
        );
        messages.push(Message::assistant(STEP_LIMIT_REPLY));
        self.memory
            .append(conversation_id, messages.split_off(first_new));
        Ok(STEP_LIMIT_REPLY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking_db::NewService;
    use crate::memory::ToolCall;
    use crate::scheduling::OperatingHours;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    struct ScriptedModel {
        replies: Mutex<VecDeque<BookingResult<ModelReply>>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<BookingResult<ModelReply>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> BookingResult<ModelReply> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelReply {
                    content: Some("done".into()),
                    tool_calls: vec![],
                }))
        }
    }

    fn text(content: &str) -> BookingResult<ModelReply> {
        Ok(ModelReply {
            content: Some(content.into()),
            tool_calls: vec![],
        })
    }

    fn call(id: &str, name: &str, arguments: &str) -> BookingResult<ModelReply> {
        Ok(ModelReply {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
        })
    }

    fn agent(model: Arc<ScriptedModel>, max_steps: usize) -> (ChatAgent, Arc<InMemoryMemoryStore>) {
        let db = Arc::new(BookingDatabase::new_in_memory().unwrap());
        db.services
            .create(NewService {
                name: "Gel Manicure".into(),
                description: None,
                duration_minutes: 60,
                price: 200000.0,
            })
            .unwrap();
        let memory = Arc::new(InMemoryMemoryStore::new(40));
        let agent = ChatAgent::new(
            model,
            BookingTools::new(db, OperatingHours::default()),
            memory.clone(),
            SalonProfile {
                name: "My Nail Store".into(),
                phone: "0123456788".into(),
                address: "01 Hai Banh Chung".into(),
            },
            max_steps,
        );
        (agent, memory)
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("call_1", "list_services", "{}"),
            text("We offer a Gel Manicure for 200000."),
        ]));
        let (agent, memory) = agent(model.clone(), 4);

        let reply = agent.chat("conv-1", "What services do you have?").await;
        assert_eq!(reply, "We offer a Gel Manicure for 200000.");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0][0].role, "system");
        let tool_message = seen[1].last().unwrap();
        assert_eq!(tool_message.role, "tool");
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_message.content.contains("Gel Manicure"));

        let history = memory.get_history("conv-1");
        let roles: Vec<_> = history.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
    }

    #[tokio::test]
    async fn test_history_carries_into_next_turn() {
        let model = Arc::new(ScriptedModel::new(vec![text("Hello!"), text("Sure.")]));
        let (agent, _memory) = agent(model.clone(), 4);
        agent.chat("conv-2", "hi").await;
        agent.chat("conv-2", "book me").await;

        let seen = model.seen.lock().unwrap();
        let second: Vec<_> = seen[1].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(&second[1..], &["hi", "Hello!", "book me"]);
    }

    #[tokio::test]
    async fn test_step_limit_stops_the_loop() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("a", "list_services", "{}"),
            call("b", "list_services", "{}"),
            call("c", "list_services", "{}"),
        ]));
        let (agent, _memory) = agent(model.clone(), 2);
        let reply = agent.chat("conv-3", "loop").await;
        assert_eq!(reply, STEP_LIMIT_REPLY);
        assert_eq!(model.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_model_failures_become_apologies() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(BookingError::external(ExternalFailure::Authentication, "401")),
            Err(BookingError::external(ExternalFailure::RateLimited, "429")),
            Err(BookingError::external(ExternalFailure::Unavailable, "timeout")),
        ]));
        let (agent, memory) = agent(model, 4);
        assert_eq!(agent.chat("c", "hi").await, AUTH_FAILURE_REPLY);
        assert_eq!(agent.chat("c", "hi").await, RATE_LIMIT_REPLY);
        assert_eq!(agent.chat("c", "hi").await, GENERIC_FAILURE_REPLY);
        assert!(memory.get_history("c").is_empty());
    }
}
