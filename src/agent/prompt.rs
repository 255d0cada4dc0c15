//! System-prompt construction.
//!
//! The prompt is rebuilt per request from the immutable tool registry, so
//! the capability listing always reflects exactly what is callable.

use crate::tools::{ToolRegistry, IDENTITY_PARAM, TOOL_CALL_MARKER};
use std::fmt::Write;

/// Render the capability listing, one `- name : description` line per tool,
/// in stable registry order.
pub fn capability_listing(tools: &ToolRegistry) -> String {
    let mut listing = String::new();
    for tool in tools.iter() {
        let _ = writeln!(listing, "- {} : {}", tool.name(), tool.description());
    }
    listing
}

/// Build the full system prompt: assistant persona, the marker calling
/// convention, and the capability listing.
pub fn system_prompt(tools: &ToolRegistry) -> String {
    format!(
        r#"Eres un asistente que da información precisa sobre deudas pendientes asociadas al usuario que te pregunta, y sobre consultas generales como el clima.

Rasgos de personalidad:
- Preciso y técnico: te comunicas con precisión y sin rodeos.
- Consciente del contexto: mantienes presente el historial de la conversación.
- Consciente de la seguridad: nunca entregues ni solicites información personal.

Capacidades:
{listing}
Convención de llamada a herramientas:
- Cuando necesites ejecutar una herramienta, responde SOLO con una línea en el formato:
  {marker} nombre_herramienta(param1="valor1", param2="valor2")
- La línea debe comenzar exactamente con {marker} y no llevar ningún texto adicional antes ni después.
- Usa SOLO los parámetros definidos por la herramienta; no inventes parámetros ni uses nombres distintos.
- El parámetro {identity} se maneja automáticamente por el sistema: NUNCA lo solicites al usuario ni inventes su valor.
- Tras la llamada recibirás un mensaje con el prefijo [TOOL_RESULT] y el resultado de la herramienta. Responde entonces al usuario en lenguaje natural, sin mostrar jamás el formato {marker} ni ninguna referencia técnica.

Reglas generales:
- Cuando el usuario pregunte por el estado de su deuda, usa directamente la herramienta get_status sin solicitar ningún dato adicional.
- Si falta un dato obligatorio para otra herramienta (por ejemplo la ciudad para get_weather), pídelo al usuario de forma natural en lugar de llamar la herramienta.
- Responde siempre en el idioma que el usuario esté usando en la conversación.
- Si el usuario agradece o se despide, responde cordialmente.

Ejemplos:
Usuario: "¿Cuánto debo?"
Asistente: {marker} get_status()

Usuario: "¿Cómo estará el clima en Temuco en 3 semanas?"
Asistente: {marker} get_weather(city="Temuco", date="3 semanas")

Usuario: "¿Qué clima hace?"
Asistente: ¿Para qué ciudad te gustaría saber el clima?
"#,
        listing = capability_listing(tools),
        marker = TOOL_CALL_MARKER,
        identity = IDENTITY_PARAM,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DebtRecord, DebtSource};
    use crate::tools::default_tools;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoDebts;

    #[async_trait]
    impl DebtSource for NoDebts {
        async fn debt_for(&self, _external_id: &str) -> anyhow::Result<Option<DebtRecord>> {
            Ok(None)
        }
    }

    #[test]
    fn listing_has_one_line_per_tool() {
        let registry = default_tools(Arc::new(NoDebts));
        let listing = capability_listing(&registry);
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("- get_status : "));
        assert!(lines[1].starts_with("- get_weather : "));
    }

    #[test]
    fn prompt_carries_marker_and_capabilities() {
        let registry = default_tools(Arc::new(NoDebts));
        let prompt = system_prompt(&registry);
        assert!(prompt.contains("[TOOL_CALL]"));
        assert!(prompt.contains("[TOOL_RESULT]"));
        assert!(prompt.contains("- get_status : "));
        assert!(prompt.contains("- get_weather : "));
        assert!(prompt.contains("externalId"));
    }
}
