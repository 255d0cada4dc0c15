/// Failure taxonomy for one inbound-message cycle.
///
/// Every variant is a distinct, matchable outcome so callers can branch on
/// the failure class instead of string-matching error text. `UnknownChannel`
/// is a detection-time failure (bad input); `UnknownProvider` is a
/// dispatch-time failure on an already-parsed message (internal
/// inconsistency); the two are deliberately separate variants.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No registered adapter's detection predicate matched the inbound payload.
    #[error("no registered channel matches the inbound payload")]
    UnknownChannel,

    /// The payload matched an adapter's shape but required substructure is missing.
    #[error("malformed {provider} payload: {detail}")]
    MalformedPayload {
        provider: &'static str,
        detail: String,
    },

    /// A parsed message carries a provider key that is not in the registry.
    #[error("provider '{0}' is not registered")]
    UnknownProvider(String),

    /// The model requested a tool that is not in the registry.
    #[error("tool '{0}' is not registered")]
    ToolNotFound(String),

    /// A schema-required parameter is absent after identity injection.
    #[error("tool call is missing required parameter '{0}'")]
    MissingParameter(String),

    /// The tool handler itself failed.
    #[error("tool '{tool}' failed")]
    ToolExecution {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    /// The model-completion collaborator failed or returned unusable content.
    #[error("model completion failed")]
    Completion(#[source] anyhow::Error),

    /// The outbound send to a provider's API failed.
    #[error("delivery via '{provider}' failed")]
    Delivery {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    /// The persistence collaborator failed.
    #[error("conversation store error")]
    Storage(#[source] anyhow::Error),
}

impl BridgeError {
    /// True for failures that happen before any channel was identified.
    /// These get a plain 4xx rejection with no channel-specific formatting.
    pub fn is_pre_detection(&self) -> bool {
        matches!(self, Self::UnknownChannel)
    }
}
