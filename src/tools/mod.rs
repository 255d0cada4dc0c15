//! Tool subsystem: the closed set of model-callable capabilities.
//!
//! Each tool implements the [`Tool`] trait in [`traits`]: a name, a
//! description, a declared parameter schema, and an async `execute` over a
//! string-valued parameter map. [`parser`] recognizes the textual marker
//! protocol the model uses to request a call. The registry is assembled
//! once at startup by [`default_tools`] and is immutable afterwards.

pub mod get_status;
pub mod get_weather;
pub mod parser;
pub mod traits;

pub use get_status::GetStatusTool;
pub use get_weather::GetWeatherTool;
pub use parser::{parse_tool_call, ToolCall, TOOL_CALL_MARKER};
pub use traits::{ParamSpec, Tool};

use crate::store::DebtSource;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Schema parameter name reserved for the caller's own identifier. The
/// orchestrator injects the resolved caller identity under this key for any
/// tool that declares it; a model-supplied value never wins.
pub const IDENTITY_PARAM: &str = "externalId";

/// Closed name→tool mapping, immutable after construction.
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        Self {
            tools: tools.into_iter().map(|t| (t.name(), t)).collect(),
        }
    }

    /// Explicit not-found result so the caller can surface `ToolNotFound`.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    /// All registered tools, in stable name order (used to render the
    /// capability listing).
    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.values().map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Build the default registry: debt status + weather.
pub fn default_tools(debts: Arc<dyn DebtSource>) -> ToolRegistry {
    ToolRegistry::new(vec![
        Box::new(GetStatusTool::new(debts)),
        Box::new(GetWeatherTool),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DebtRecord;
    use async_trait::async_trait;

    struct NoDebts;

    #[async_trait]
    impl DebtSource for NoDebts {
        async fn debt_for(&self, _external_id: &str) -> anyhow::Result<Option<DebtRecord>> {
            Ok(None)
        }
    }

    #[test]
    fn default_registry_contents() {
        let registry = default_tools(Arc::new(NoDebts));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("get_status").is_some());
        assert!(registry.get("get_weather").is_some());
        assert!(registry.get("get_places").is_none());
    }

    #[test]
    fn iteration_is_name_ordered() {
        let registry = default_tools(Arc::new(NoDebts));
        let names: Vec<_> = registry.iter().map(Tool::name).collect();
        assert_eq!(names, ["get_status", "get_weather"]);
    }
}
