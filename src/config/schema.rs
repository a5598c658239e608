use serde_json::{json, Value};
use std::sync::LazyLock;

/// Schema for `dangerous_patterns.json`: a map from a recognized group name
/// to an ordered, non-empty list of regex strings. Unknown groups are
/// rejected structurally before the semantic check even runs.
pub static PATTERNS_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "command_injection": { "$ref": "#/$defs/pattern_list" },
            "path_traversal": { "$ref": "#/$defs/pattern_list" },
            "code_execution": { "$ref": "#/$defs/pattern_list" }
        },
        "additionalProperties": false,
        "minProperties": 1,
        "$defs": {
            "pattern_list": {
                "type": "array",
                "items": { "type": "string", "minLength": 1 },
                "minItems": 1
            }
        }
    })
});
