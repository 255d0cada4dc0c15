//! Conversation orchestrator.
//!
//! Drives one inbound message through the fixed cycle: resolve identity,
//! replay the bounded history window, complete, optionally run exactly one
//! tool round, complete again, persist the user/assistant pair, and hand the
//! final text back to the gateway for delivery. There is no tool chaining
//! and no retry; a failed round surfaces as a typed [`BridgeError`].

pub mod prompt;

pub use prompt::system_prompt;

use crate::channels::{CanonicalMessage, ChannelRegistry};
use crate::error::BridgeError;
use crate::providers::{ChatMessage, Provider};
use crate::store::{ConversationStore, Role};
use crate::tools::{parse_tool_call, ToolCall, ToolRegistry, IDENTITY_PARAM};
use std::sync::Arc;

pub struct Orchestrator {
    channels: Arc<ChannelRegistry>,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn Provider>,
    store: Arc<dyn ConversationStore>,
    history_size: usize,
}

impl Orchestrator {
    pub fn new(
        channels: Arc<ChannelRegistry>,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn Provider>,
        store: Arc<dyn ConversationStore>,
        history_size: usize,
    ) -> Self {
        Self {
            channels,
            tools,
            provider,
            store,
            history_size,
        }
    }

    /// Produce the final reply text for one parsed inbound message.
    ///
    /// Persists the user turn and the assistant turn (in that order) only
    /// once the final text is known; a failure anywhere leaves no partial
    /// pair behind.
    pub async fn respond(&self, message: &CanonicalMessage) -> Result<String, BridgeError> {
        let channel_type = self.channels.channel_type_of(message.provider_key)?;
        let identity = self
            .store
            .resolve_or_create_identity(
                channel_type,
                &message.sender_id,
                message.display_name.as_deref(),
            )
            .await
            .map_err(BridgeError::Storage)?;

        // Stored newest-first; the transcript wants oldest-first.
        let mut transcript: Vec<ChatMessage> = self
            .store
            .recent_turns(&identity, self.history_size)
            .await
            .map_err(BridgeError::Storage)?
            .into_iter()
            .rev()
            .map(|turn| match turn.role {
                Role::User => ChatMessage::user(turn.text),
                Role::Assistant => ChatMessage::assistant(turn.text),
            })
            .collect();
        transcript.push(ChatMessage::user(message.text.clone()));

        let prompt = system_prompt(&self.tools);
        let first = self
            .provider
            .complete(&prompt, &transcript)
            .await
            .map_err(BridgeError::Completion)?;

        let final_text = match parse_tool_call(first.trim()) {
            None => first,
            Some(call) => {
                tracing::info!(tool = %call.name, "model requested tool call");
                self.run_tool_round(message, &prompt, transcript, first.clone(), call)
                    .await?
            }
        };

        self.store
            .append_turn(&identity, Role::User, &message.text)
            .await
            .map_err(BridgeError::Storage)?;
        self.store
            .append_turn(&identity, Role::Assistant, &final_text)
            .await
            .map_err(BridgeError::Storage)?;

        Ok(final_text)
    }

    /// The single allowed tool round: validate, execute, and complete again
    /// with the tool result appended to the transcript.
    async fn run_tool_round(
        &self,
        message: &CanonicalMessage,
        prompt: &str,
        mut transcript: Vec<ChatMessage>,
        tool_call_line: String,
        call: ToolCall,
    ) -> Result<String, BridgeError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| BridgeError::ToolNotFound(call.name.clone()))?;

        let mut params = call.parameters;
        // The caller's resolved identity always wins over anything the
        // model put in the call.
        if tool.declares_parameter(IDENTITY_PARAM) {
            params.insert(IDENTITY_PARAM.to_string(), message.sender_id.clone());
        }
        for required in tool.required() {
            if !params.contains_key(*required) {
                return Err(BridgeError::MissingParameter(required.to_string()));
            }
        }

        let result = tool
            .execute(&params)
            .await
            .map_err(|source| BridgeError::ToolExecution {
                tool: call.name.clone(),
                source,
            })?;

        transcript.push(ChatMessage::assistant(tool_call_line));
        transcript.push(ChatMessage::tool(result));

        self.provider
            .complete(prompt, &transcript)
            .await
            .map_err(BridgeError::Completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TelegramConfig, TwilioConfig, WabaConfig};
    use crate::channels::{TelegramChannel, TwilioChannel, WabaChannel};
    use crate::store::{ConversationTurn, DebtRecord, DebtSource, IdentityHandle};
    use crate::tools::{default_tools, ParamSpec, Tool};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        transcripts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                transcripts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.transcripts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn complete(
            &self,
            _system_prompt: &str,
            transcript: &[ChatMessage],
        ) -> anyhow::Result<String> {
            self.transcripts.lock().unwrap().push(transcript.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        turns: Mutex<Vec<(Role, String)>>,
    }

    #[async_trait]
    impl ConversationStore for MemoryStore {
        async fn resolve_or_create_identity(
            &self,
            channel_type: &str,
            external_id: &str,
            _display_name: Option<&str>,
        ) -> anyhow::Result<IdentityHandle> {
            Ok(IdentityHandle {
                identity_id: 1,
                global_user_id: 1,
                channel_type: channel_type.to_string(),
                external_id: external_id.to_string(),
            })
        }

        async fn append_turn(
            &self,
            _identity: &IdentityHandle,
            role: Role,
            text: &str,
        ) -> anyhow::Result<()> {
            self.turns.lock().unwrap().push((role, text.to_string()));
            Ok(())
        }

        async fn recent_turns(
            &self,
            _identity: &IdentityHandle,
            limit: usize,
        ) -> anyhow::Result<Vec<ConversationTurn>> {
            let turns = self.turns.lock().unwrap();
            Ok(turns
                .iter()
                .rev()
                .take(limit)
                .map(|(role, text)| ConversationTurn {
                    role: *role,
                    text: text.clone(),
                    timestamp: Utc::now(),
                })
                .collect())
        }
    }

    struct NoDebts;

    #[async_trait]
    impl DebtSource for NoDebts {
        async fn debt_for(&self, _external_id: &str) -> anyhow::Result<Option<DebtRecord>> {
            Ok(None)
        }
    }

    /// Records the parameter map it was executed with.
    struct RecordingTool {
        params: Mutex<Option<BTreeMap<String, String>>>,
        executions: AtomicUsize,
    }

    static RECORDING_PARAMS: &[ParamSpec] = &[
        ParamSpec {
            name: "externalId",
            kind: "string",
            description: "caller identity",
        },
        ParamSpec {
            name: "city",
            kind: "string",
            description: "city",
        },
    ];

    #[async_trait]
    impl Tool for &'static RecordingTool {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn description(&self) -> &'static str {
            "records its invocation"
        }

        fn parameters(&self) -> &'static [ParamSpec] {
            RECORDING_PARAMS
        }

        fn required(&self) -> &'static [&'static str] {
            &["city"]
        }

        async fn execute(&self, params: &BTreeMap<String, String>) -> anyhow::Result<String> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            *self.params.lock().unwrap() = Some(params.clone());
            Ok("ok".into())
        }
    }

    fn channels() -> Arc<ChannelRegistry> {
        Arc::new(ChannelRegistry::new(vec![
            Arc::new(TwilioChannel::new(&TwilioConfig {
                account_sid: "AC".into(),
                auth_token: "tok".into(),
                from_number: "+1444".into(),
            })),
            Arc::new(WabaChannel::new(&WabaConfig {
                phone_number_id: "10001".into(),
                access_token: "tok".into(),
            })),
            Arc::new(TelegramChannel::new(&TelegramConfig {
                bot_token: "bot".into(),
            })),
        ]))
    }

    fn twilio_message(text: &str) -> CanonicalMessage {
        CanonicalMessage {
            sender_id: "+1999".into(),
            text: text.into(),
            provider_key: "twilio",
            display_name: Some("Ana".into()),
        }
    }

    fn orchestrator(
        provider: Arc<ScriptedProvider>,
        tools: ToolRegistry,
        store: Arc<MemoryStore>,
    ) -> Orchestrator {
        Orchestrator::new(channels(), Arc::new(tools), provider, store, 6)
    }

    #[tokio::test]
    async fn plain_response_skips_the_tool_round() {
        let provider = ScriptedProvider::new(&["Hola, ¿en qué puedo ayudarte?"]);
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(
            provider.clone(),
            default_tools(Arc::new(NoDebts)),
            store.clone(),
        );

        let reply = orch.respond(&twilio_message("hola")).await.unwrap();
        assert_eq!(reply, "Hola, ¿en qué puedo ayudarte?");
        assert_eq!(provider.calls(), 1);

        let turns = store.turns.lock().unwrap().clone();
        assert_eq!(
            turns,
            vec![
                (Role::User, "hola".to_string()),
                (Role::Assistant, "Hola, ¿en qué puedo ayudarte?".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn tool_round_feeds_result_into_second_completion() {
        let provider = ScriptedProvider::new(&[
            "[TOOL_CALL] get_status()",
            "No tienes deuda pendiente. ¡Buen día!",
        ]);
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(
            provider.clone(),
            default_tools(Arc::new(NoDebts)),
            store.clone(),
        );

        let reply = orch.respond(&twilio_message("¿Cuánto debo?")).await.unwrap();
        assert_eq!(reply, "No tienes deuda pendiente. ¡Buen día!");
        assert_eq!(provider.calls(), 2);

        let transcripts = provider.transcripts.lock().unwrap();
        let second = &transcripts[1];
        assert_eq!(second[second.len() - 2].role, "assistant");
        assert_eq!(second[second.len() - 2].content, "[TOOL_CALL] get_status()");
        assert_eq!(second[second.len() - 1].role, "tool");
        assert_eq!(second[second.len() - 1].content, "No tienes deuda pendiente.");

        // Only the user-visible pair is persisted, in order.
        let turns = store.turns.lock().unwrap().clone();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], (Role::User, "¿Cuánto debo?".to_string()));
        assert_eq!(
            turns[1],
            (Role::Assistant, "No tienes deuda pendiente. ¡Buen día!".to_string())
        );
    }

    #[tokio::test]
    async fn injected_identity_overrides_model_supplied_value() {
        static TOOL: RecordingTool = RecordingTool {
            params: Mutex::new(None),
            executions: AtomicUsize::new(0),
        };
        let provider = ScriptedProvider::new(&[
            r#"[TOOL_CALL] probe(externalId="+1555", city="Temuco")"#,
            "listo",
        ]);
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(
            provider,
            ToolRegistry::new(vec![Box::new(&TOOL)]),
            store,
        );

        orch.respond(&twilio_message("dato")).await.unwrap();

        let params = TOOL.params.lock().unwrap().clone().unwrap();
        assert_eq!(params.get("externalId").unwrap(), "+1999");
        assert_eq!(params.get("city").unwrap(), "Temuco");
    }

    #[tokio::test]
    async fn missing_required_parameter_never_reaches_the_handler() {
        static TOOL: RecordingTool = RecordingTool {
            params: Mutex::new(None),
            executions: AtomicUsize::new(0),
        };
        let provider = ScriptedProvider::new(&["[TOOL_CALL] probe()"]);
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(
            provider,
            ToolRegistry::new(vec![Box::new(&TOOL)]),
            store.clone(),
        );

        let err = orch.respond(&twilio_message("clima")).await.unwrap_err();
        assert!(matches!(err, BridgeError::MissingParameter(ref p) if p == "city"));
        assert_eq!(TOOL.executions.load(Ordering::SeqCst), 0);
        // Failed cycle persists nothing.
        assert!(store.turns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_name_is_tool_not_found() {
        let provider = ScriptedProvider::new(&["[TOOL_CALL] get_places(city=\"Temuco\")"]);
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(
            provider,
            default_tools(Arc::new(NoDebts)),
            store.clone(),
        );

        let err = orch.respond(&twilio_message("lugares")).await.unwrap_err();
        assert!(matches!(err, BridgeError::ToolNotFound(ref n) if n == "get_places"));
        assert!(store.turns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_window_is_bounded_and_oldest_first() {
        let provider = ScriptedProvider::new(&["ok"]);
        let store = Arc::new(MemoryStore::default());
        {
            let mut turns = store.turns.lock().unwrap();
            for i in 0..8 {
                turns.push((Role::User, format!("m{i}")));
            }
        }
        let orch = orchestrator(
            provider.clone(),
            default_tools(Arc::new(NoDebts)),
            store,
        );

        orch.respond(&twilio_message("actual")).await.unwrap();

        let transcripts = provider.transcripts.lock().unwrap();
        let first = &transcripts[0];
        // Six replayed turns plus the live user message.
        assert_eq!(first.len(), 7);
        assert_eq!(first[0].content, "m2");
        assert_eq!(first[5].content, "m7");
        assert_eq!(first[6].content, "actual");
    }

    #[tokio::test]
    async fn whatsapp_history_is_shared_between_twilio_and_waba() {
        let store = Arc::new(MemoryStore::default());
        let provider = ScriptedProvider::new(&["uno", "dos"]);
        let orch = orchestrator(
            provider.clone(),
            default_tools(Arc::new(NoDebts)),
            store.clone(),
        );

        orch.respond(&twilio_message("primero")).await.unwrap();
        let waba_message = CanonicalMessage {
            sender_id: "+1999".into(),
            text: "segundo".into(),
            provider_key: "waba",
            display_name: None,
        };
        orch.respond(&waba_message).await.unwrap();

        let transcripts = provider.transcripts.lock().unwrap();
        let second = &transcripts[1];
        assert!(second.iter().any(|m| m.content == "primero"));
    }
}
