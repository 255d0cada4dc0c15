use super::traits::{ParamSpec, Tool};
use super::IDENTITY_PARAM;
use crate::store::DebtSource;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Debt-status lookup for the asking user.
///
/// Declares the identity placeholder (`externalId`) as its only parameter.
/// It is not in `required`: the orchestrator injects the caller's resolved
/// identifier after parsing, and a model-supplied value never survives that
/// injection, so one user cannot query another user's debt.
pub struct GetStatusTool {
    debts: Arc<dyn DebtSource>,
}

const PARAMS: &[ParamSpec] = &[ParamSpec {
    name: IDENTITY_PARAM,
    kind: "string",
    description: "El número de teléfono del usuario (se maneja automáticamente, no necesitas proporcionarlo)",
}];

impl GetStatusTool {
    pub fn new(debts: Arc<dyn DebtSource>) -> Self {
        Self { debts }
    }
}

#[async_trait]
impl Tool for GetStatusTool {
    fn name(&self) -> &'static str {
        "get_status"
    }

    fn description(&self) -> &'static str {
        "Obtiene el estatus de la deuda del usuario (el número de teléfono se maneja automáticamente)"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    async fn execute(&self, params: &BTreeMap<String, String>) -> anyhow::Result<String> {
        let external_id = params
            .get(IDENTITY_PARAM)
            .map(String::as_str)
            .unwrap_or_default();

        let Some(debt) = self.debts.debt_for(external_id).await? else {
            return Ok("No tienes deuda pendiente.".to_string());
        };

        let due = debt.due_date.format("%d-%m-%Y");
        let days_overdue = (Utc::now().date_naive() - debt.due_date).num_days();
        if days_overdue > 0 {
            Ok(format!(
                "Tienes una deuda de ${:.2} que venció el {due} con {days_overdue} días de atraso.",
                debt.amount
            ))
        } else {
            Ok(format!(
                "Tienes una deuda de ${:.2} que vence el {due}.",
                debt.amount
            ))
        }
    }
}
