//! 内置浏览器工具目录

use serde_json::json;

use crate::tools::registry::ToolSpec;

fn spec(name: &str, description: &str, tags: &[&str], json_schema: serde_json::Value) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        json_schema,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

/// navigate / click / type_text / select_option / press_key / scroll / wait
pub fn builtin_specs() -> Vec<ToolSpec> {
    vec![
        spec(
            "navigate",
            "Open a URL in the current tab",
            &["navigation"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["url"],
                "properties": {
                    "url": {"type": "string", "minLength": 1}
                }
            }),
        ),
        spec(
            "click",
            "Click an element. target is a versioned reference such as e12@7",
            &["interaction", "dismiss"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["target"],
                "properties": {
                    "target": {"type": "string", "pattern": "^\\S+@\\d+$", "x-element-ref": true}
                }
            }),
        ),
        spec(
            "type_text",
            "Type text into a field; clear replaces the existing value, submit presses Enter afterwards",
            &["interaction", "input"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["target", "text", "clear"],
                "properties": {
                    "target": {"type": "string", "pattern": "^\\S+@\\d+$", "x-element-ref": true},
                    "text": {"type": "string"},
                    "clear": {"type": "boolean", "default": true},
                    "submit": {"type": "boolean", "default": false}
                }
            }),
        ),
        spec(
            "select_option",
            "Choose one or more options in a select, combobox or listbox",
            &["interaction", "input"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["target", "values"],
                "properties": {
                    "target": {"type": "string", "pattern": "^\\S+@\\d+$", "x-element-ref": true},
                    "values": {"type": "array", "items": {"type": "string"}, "minItems": 1}
                }
            }),
        ),
        spec(
            "press_key",
            "Press a keyboard key, optionally focused on an element",
            &["interaction", "dismiss"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["key"],
                "properties": {
                    "key": {"type": "string", "minLength": 1},
                    "target": {"type": "string", "pattern": "^\\S+@\\d+$", "x-element-ref": true}
                }
            }),
        ),
        spec(
            "scroll",
            "Scroll the page",
            &["navigation"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["direction", "amount"],
                "properties": {
                    "direction": {"type": "string", "enum": ["up", "down"], "default": "down"},
                    "amount": {"type": "integer", "minimum": 1, "default": 600}
                }
            }),
        ),
        spec(
            "wait",
            "Wait for the page to settle",
            &["timing"],
            json!({
                "type": "object",
                "additionalProperties": false,
                "required": ["ms"],
                "properties": {
                    "ms": {"type": "integer", "minimum": 0, "maximum": 10000, "default": 500}
                }
            }),
        ),
    ]
}
