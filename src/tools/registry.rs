//! 工具注册表
//!
//! 启动时一次性构建（内置浏览器目录或目录文件），之后只读：没有 register，也没有热加载。
//! 每个工具的 JSON Schema 在构建时编译（Draft 7），`validate` 只做 schema 校验，`repair` 委托给 repair 模块。
//! 标记了 `"x-element-ref": true` 的属性是元素引用参数。

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::builtin::builtin_specs;
use crate::tools::repair;

/// 元素引用参数的 schema 标记
pub const ELEMENT_REF_KEYWORD: &str = "x-element-ref";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("invalid schema for tool '{tool}': {message}")]
    InvalidSchema { tool: String, message: String },

    #[error("catalog contains no tools")]
    Empty,
}

/// 目录中的一个工具
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub json_schema: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 目录文件中的条目（名称来自表键）
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    description: String,
    json_schema: Value,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    tools: BTreeMap<String, CatalogEntry>,
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    fn failed(errors: Vec<String>) -> Self {
        Self { ok: false, errors }
    }
}

struct CompiledTool {
    schema: JSONSchema,
    ref_args: Vec<String>,
}

/// 只读工具目录
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    compiled: HashMap<String, CompiledTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    /// 从规格列表构建并编译全部 schema
    pub fn from_specs(specs: Vec<ToolSpec>) -> Result<Self, RegistryError> {
        if specs.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut compiled = HashMap::with_capacity(specs.len());
        for spec in &specs {
            let schema = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&spec.json_schema)
                .map_err(|e| RegistryError::InvalidSchema {
                    tool: spec.name.clone(),
                    message: e.to_string(),
                })?;
            compiled.insert(
                spec.name.clone(),
                CompiledTool {
                    schema,
                    ref_args: element_ref_properties(&spec.json_schema),
                },
            );
        }
        tracing::info!(tools = specs.len(), "tool registry initialised");
        Ok(Self { specs, compiled })
    }

    /// 内置浏览器工具目录
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_specs(builtin_specs())
    }

    /// 从目录文件加载（.json 按 JSON 解析，其余按 TOML）
    pub fn from_catalog_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("json"));
        let file: CatalogFile = if is_json {
            serde_json::from_str(&content).map_err(|e| RegistryError::Parse(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| RegistryError::Parse(e.to_string()))?
        };
        let specs = file
            .tools
            .into_iter()
            .map(|(name, entry)| ToolSpec {
                name,
                description: entry.description,
                json_schema: entry.json_schema,
                tags: entry.tags,
            })
            .collect();
        Self::from_specs(specs)
    }

    /// 目录文件路径为 None 时使用内置目录
    pub fn load(catalog_path: Option<&Path>) -> Result<Self, RegistryError> {
        match catalog_path {
            Some(p) => Self::from_catalog_file(p),
            None => Self::builtin(),
        }
    }

    pub fn list(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    /// 该工具中属于元素引用的参数名
    pub fn ref_args(&self, name: &str) -> &[String] {
        self.compiled
            .get(name)
            .map(|c| c.ref_args.as_slice())
            .unwrap_or(&[])
    }

    /// 按声明的 schema 校验参数；未知工具视为校验失败
    pub fn validate(&self, name: &str, args: &Value) -> ValidationResult {
        let Some(tool) = self.compiled.get(name) else {
            return ValidationResult::failed(vec![format!("unknown tool '{name}'")]);
        };
        match tool.schema.validate(args) {
            Ok(()) => ValidationResult::ok(),
            Err(errors) => ValidationResult::failed(
                errors
                    .map(|e| {
                        let path = e.instance_path.to_string();
                        if path.is_empty() {
                            e.to_string()
                        } else {
                            format!("{path}: {e}")
                        }
                    })
                    .collect(),
            ),
        }
    }

    /// 确定性的结构修复；未知工具原样返回
    pub fn repair(&self, name: &str, args: &Value, errors: &[String]) -> Value {
        let Some(spec) = self.get(name) else {
            return args.clone();
        };
        tracing::debug!(tool = name, errors = errors.len(), "repairing tool arguments");
        repair::repair_arguments(&spec.json_schema, args)
    }

    /// 工具目录 JSON（拼入 oracle 的 prompt）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .specs
            .iter()
            .map(|spec| {
                serde_json::json!({
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.json_schema,
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

fn element_ref_properties(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter(|(_, p)| p.get(ELEMENT_REF_KEYWORD).and_then(Value::as_bool) == Some(true))
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog_lists_browser_tools() {
        let registry = ToolRegistry::builtin().unwrap();
        let names = registry.tool_names();
        for expected in ["navigate", "click", "type_text", "press_key"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(registry.ref_args("click"), &["target".to_string()]);
        assert!(registry.ref_args("navigate").is_empty());
        assert!(registry.ref_args("no_such_tool").is_empty());
    }

    #[test]
    fn test_validate_reports_errors() {
        let registry = ToolRegistry::builtin().unwrap();
        assert!(registry.validate("click", &json!({"target": "e1@3"})).ok);

        let missing = registry.validate("click", &json!({}));
        assert!(!missing.ok);
        assert!(missing.errors.iter().any(|e| e.contains("target")));

        let unknown = registry.validate("teleport", &json!({}));
        assert!(!unknown.ok);
        assert!(unknown.errors[0].contains("unknown tool"));
    }

    #[test]
    fn test_schema_json_contains_parameters() {
        let registry = ToolRegistry::builtin().unwrap();
        let s = registry.to_schema_json();
        assert!(s.contains("\"click\""));
        assert!(s.contains("x-element-ref"));
    }

    #[test]
    fn test_catalog_file_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[tools.hover]
description = "Hover over an element"
tags = ["pointer"]

[tools.hover.json_schema]
type = "object"
required = ["target"]
additionalProperties = false

[tools.hover.json_schema.properties.target]
type = "string"
x-element-ref = true
"#
        )
        .unwrap();
        let registry = ToolRegistry::from_catalog_file(file.path()).unwrap();
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].tags, vec!["pointer".to_string()]);
        assert_eq!(registry.ref_args("hover"), &["target".to_string()]);
        assert!(!registry.validate("hover", &json!({"target": "e1@1", "x": 1})).ok);
    }

    #[test]
    fn test_catalog_file_json_and_invalid_schema() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"tools": {{"bad": {{"description": "x", "json_schema": {{"type": 12}}}}}}}}"#
        )
        .unwrap();
        assert!(matches!(
            ToolRegistry::from_catalog_file(file.path()),
            Err(RegistryError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(ToolRegistry::from_specs(vec![]), Err(RegistryError::Empty)));
    }
}
