use super::traits::{ParamSpec, Tool};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Weather lookup for a city and optional date.
///
/// The response is simulated; the tool exists to exercise the
/// required-parameter path of the calling convention.
pub struct GetWeatherTool;

const PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "city",
        kind: "string",
        description: "Ciudad a consultar",
    },
    ParamSpec {
        name: "date",
        kind: "string",
        description: "Fecha (opcional)",
    },
];

const REQUIRED: &[&str] = &["city"];

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> &'static str {
        "Obtiene el clima para una ciudad y fecha dada."
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn required(&self) -> &'static [&'static str] {
        REQUIRED
    }

    async fn execute(&self, params: &BTreeMap<String, String>) -> anyhow::Result<String> {
        let city = params
            .get("city")
            .ok_or_else(|| anyhow::anyhow!("city parameter missing"))?;
        let date = params.get("date").map(String::as_str).unwrap_or("hoy");
        Ok(format!("El clima en {city} para {date} es soleado."))
    }
}
