//! Per-provider allow-lists of forwarded generation parameters.
//!
//! Each table maps an option key to the key written into the request body.
//! Options missing from a provider's table are dropped.

use log::debug;
use serde_json::{Map, Value};
use unillm_core::GenerationParams;

/// Option key and the body key it is sent as
pub type ParamTable = &'static [(&'static str, &'static str)];

pub const BEDROCK_MISTRAL_PARAMS: ParamTable = &[
    ("max_tokens", "max_tokens"),
    ("top_k", "top_k"),
    ("top_p", "top_p"),
    ("temperature", "temperature"),
    ("stop", "stop"),
];

pub const ANTHROPIC_PARAMS: ParamTable = &[
    ("max_tokens", "max_tokens"),
    ("top_k", "top_k"),
    ("top_p", "top_p"),
    ("temperature", "temperature"),
    ("stop", "stop_sequences"),
];

/// Copy the allowed entries of `params` into `body`, overwriting existing keys
pub fn apply_params(body: &mut Map<String, Value>, params: &GenerationParams, table: ParamTable) {
    for (key, value) in params.iter() {
        match table.iter().find(|(option, _)| option == key) {
            Some((_, wire)) => {
                body.insert((*wire).to_string(), value.clone());
            }
            None => debug!("Dropping unsupported option '{}'", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> GenerationParams {
        let mut params = GenerationParams::new();
        params.set("max_tokens", 200);
        params.set("temperature", 0.5);
        params.set("seed", 7);
        params.set("stop", json!(["\n\n"]));
        params
    }

    #[test]
    fn test_bedrock_drops_unknown_keys() {
        let mut body = Map::new();
        apply_params(&mut body, &params(), BEDROCK_MISTRAL_PARAMS);
        assert_eq!(
            Value::Object(body),
            json!({"max_tokens": 200, "temperature": 0.5, "stop": ["\n\n"]})
        );
    }

    #[test]
    fn test_anthropic_renames_stop() {
        let mut body = Map::new();
        body.insert("max_tokens".into(), json!(1024));
        apply_params(&mut body, &params(), ANTHROPIC_PARAMS);
        assert_eq!(body["max_tokens"], json!(200));
        assert_eq!(body["stop_sequences"], json!(["\n\n"]));
        assert!(!body.contains_key("stop"));
        assert!(!body.contains_key("seed"));
    }
}
