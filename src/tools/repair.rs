//! 参数修复：只做结构修正，不引入新的语义意图
//!
//! 规则（按顺序）：
//! 1. schema 期望对象而参数不是对象：字符串若能解析为 JSON 对象则用之，否则替换为 `{}`
//! 2. `additionalProperties: false` 时丢弃未声明字段
//! 3. 标量类型转换："3" -> 3、"true" -> true、数字/布尔 -> 字符串、单值 -> 单元素数组
//! 4. 字符串枚举按大小写不敏感匹配到声明值
//! 5. 缺失的必填字段仅在属性声明了 `default` 时填充
//!
//! 元素引用参数只去除首尾空白，绝不改写。

use serde_json::{Map, Value};

use crate::tools::registry::ELEMENT_REF_KEYWORD;

fn declared_type(schema: &Value) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

fn is_element_ref(schema: &Value) -> bool {
    schema.get(ELEMENT_REF_KEYWORD).and_then(Value::as_bool) == Some(true)
}

/// 按 schema 修复一组参数
pub fn repair_arguments(schema: &Value, args: &Value) -> Value {
    if declared_type(schema) != Some("object") {
        return coerce_value(schema, args);
    }

    let mut obj = match args {
        Value::Object(map) => map.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    };

    let empty = Map::new();
    let props = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    if closed {
        obj.retain(|k, _| props.contains_key(k));
    }

    for (key, prop) in props {
        if let Some(v) = obj.get_mut(key) {
            *v = coerce_value(prop, v);
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if obj.contains_key(key) {
                continue;
            }
            if let Some(default) = props.get(key).and_then(|p| p.get("default")) {
                obj.insert(key.to_string(), default.clone());
            }
        }
    }

    Value::Object(obj)
}

/// 单个值的类型转换；无法安全转换时原样返回
fn coerce_value(schema: &Value, value: &Value) -> Value {
    if is_element_ref(schema) {
        return match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other.clone(),
        };
    }

    let coerced = match (declared_type(schema), value) {
        (Some("integer"), Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        (Some("integer"), Value::Number(n)) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 => Value::from(f as i64),
            _ => value.clone(),
        },
        (Some("number"), Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        (Some("boolean"), Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        (Some("string"), Value::Number(n)) => Value::String(n.to_string()),
        (Some("string"), Value::Bool(b)) => Value::String(b.to_string()),
        (Some("array"), Value::Array(items)) => {
            let item_schema = schema.get("items").cloned().unwrap_or(Value::Null);
            Value::Array(items.iter().map(|v| coerce_value(&item_schema, v)).collect())
        }
        (Some("array"), Value::Null) => value.clone(),
        (Some("array"), single) => {
            let item_schema = schema.get("items").cloned().unwrap_or(Value::Null);
            Value::Array(vec![coerce_value(&item_schema, single)])
        }
        (Some("object"), _) => repair_arguments(schema, value),
        _ => value.clone(),
    };

    fold_enum(schema, coerced)
}

fn fold_enum(schema: &Value, value: Value) -> Value {
    let Some(variants) = schema.get("enum").and_then(Value::as_array) else {
        return value;
    };
    let folded = match &value {
        Value::String(s) if !variants.iter().any(|v| v.as_str() == Some(s.as_str())) => variants
            .iter()
            .filter_map(Value::as_str)
            .find(|v| v.eq_ignore_ascii_case(s.trim()))
            .map(|v| Value::String(v.to_string())),
        _ => None,
    };
    folded.unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["target", "text", "clear"],
            "properties": {
                "target": {"type": "string", "x-element-ref": true},
                "text": {"type": "string"},
                "clear": {"type": "boolean", "default": true},
                "delay_ms": {"type": "integer"},
                "keys": {"type": "array", "items": {"type": "string"}},
                "mode": {"type": "string", "enum": ["append", "replace"]}
            }
        })
    }

    #[test]
    fn test_repair_fills_declared_default_only() {
        let out = repair_arguments(&schema(), &json!({"target": "e1@2"}));
        assert_eq!(out["clear"], json!(true));
        // text 没有 default，不会被编造
        assert!(out.get("text").is_none());
    }

    #[test]
    fn test_repair_drops_unknown_and_coerces() {
        let out = repair_arguments(
            &schema(),
            &json!({
                "target": "  e4@9 ",
                "text": 42,
                "clear": "FALSE",
                "delay_ms": "150",
                "keys": "Enter",
                "mode": "Replace",
                "confidence": 0.9
            }),
        );
        assert_eq!(
            out,
            json!({
                "target": "e4@9",
                "text": "42",
                "clear": false,
                "delay_ms": 150,
                "keys": ["Enter"],
                "mode": "replace"
            })
        );
    }

    #[test]
    fn test_repair_non_object_arguments() {
        let out = repair_arguments(&schema(), &json!("{\"target\": \"e1@1\", \"text\": \"hi\"}"));
        assert_eq!(out, json!({"target": "e1@1", "text": "hi", "clear": true}));
        let out = repair_arguments(&schema(), &json!([1, 2]));
        assert_eq!(out, json!({"clear": true}));
    }

    #[test]
    fn test_repair_is_deterministic_and_keeps_bad_values() {
        let args = json!({"target": "e1@1", "text": "x", "delay_ms": "soon"});
        let a = repair_arguments(&schema(), &args);
        let b = repair_arguments(&schema(), &args);
        assert_eq!(a, b);
        assert_eq!(a["delay_ms"], json!("soon"));
    }
}
