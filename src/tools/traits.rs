use async_trait::async_trait;
use std::collections::BTreeMap;

/// One declared parameter of a tool.
///
/// The textual calling convention carries no typing richer than strings,
/// so `kind` is documentation for the model, not a validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
}

/// A model-callable capability. Definitions are immutable and enumerable at
/// process start; the full set renders into the system prompt's capability
/// listing.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &'static str;

    /// One-line description rendered into the capability listing.
    fn description(&self) -> &'static str;

    fn parameters(&self) -> &'static [ParamSpec];

    /// Names of parameters that must be present after identity injection.
    fn required(&self) -> &'static [&'static str] {
        &[]
    }

    /// Execute with string-valued parameters. A failure here surfaces as
    /// `ToolExecution` for this round; no automatic retry.
    async fn execute(&self, params: &BTreeMap<String, String>) -> anyhow::Result<String>;

    /// Whether the tool's schema declares `name` as a parameter.
    fn declares_parameter(&self, name: &str) -> bool {
        self.parameters().iter().any(|p| p.name == name)
    }
}
