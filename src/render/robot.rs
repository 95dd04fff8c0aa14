//! Robot-mode output.
//!
//! Every payload is wrapped in a [`RobotOutput`] envelope so consumers can key on
//! `schemaVersion` and `command`.

use serde::Serialize;

use crate::core::models::{ModelIdentifier, RobotOutput};
use crate::core::pricing::TieredModelPricing;
use crate::error::Result;

/// Render any serializable value as JSON.
pub fn render_json<T: Serialize>(output: &T) -> Result<String> {
    Ok(serde_json::to_string(output)?)
}

/// Render any serializable value as pretty JSON.
pub fn render_json_pretty<T: Serialize>(output: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(output)?)
}

/// Wrap `data` in the envelope for `command` and serialize it.
pub fn render_envelope<T: Serialize>(command: &str, data: T, pretty: bool) -> Result<String> {
    let output = RobotOutput::new(command, data);
    if pretty {
        render_json_pretty(&output)
    } else {
        render_json(&output)
    }
}

/// Payload of `pricing show`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingShow<'a> {
    pub model: &'a ModelIdentifier,
    pub pricing: &'a TieredModelPricing,
}
