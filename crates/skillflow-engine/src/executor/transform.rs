use serde_json::{Map, Value};

use crate::condition::Condition;
use crate::error::{json_type, ExecError, ValidationError};
use crate::graph::TransformConfig;
use crate::resolver;
use crate::scope::{Layered, Lookup};

/// Scope key bound to the current element in `filter_array` / `map_array`.
pub const ITEM: &str = "item";
/// Scope key bound to the current position in `filter_array` / `map_array`.
pub const INDEX: &str = "index";

#[derive(Debug, Clone)]
pub enum TransformOp {
    ExtractFields(Vec<String>),
    FormatText(String),
    FilterArray(Condition),
    MapArray(Value),
}

impl TransformOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExtractFields(_) => "extract_fields",
            Self::FormatText(_) => "format_text",
            Self::FilterArray(_) => "filter_array",
            Self::MapArray(_) => "map_array",
        }
    }
}

/// Reshapes data already in the context.
#[derive(Debug, Clone)]
pub struct TransformExecutor {
    op: TransformOp,
    source: Option<Value>,
    fallback: Option<Value>,
}

impl TransformExecutor {
    pub fn build(node_id: &str, cfg: &TransformConfig) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidConfig {
            node: node_id.to_string(),
            reason,
        };
        let require = |field: &str| invalid(format!("{} requires '{}'", cfg.operation, field));

        let op = match cfg.operation.as_str() {
            "extract_fields" => {
                if cfg.fields.is_empty() {
                    return Err(require("fields"));
                }
                TransformOp::ExtractFields(cfg.fields.clone())
            }
            "format_text" => {
                let template = cfg.template.clone().ok_or_else(|| require("template"))?;
                resolver::parse_template(&template).map_err(|e| invalid(e.to_string()))?;
                TransformOp::FormatText(template)
            }
            "filter_array" => {
                let predicate = cfg.predicate.as_deref().ok_or_else(|| require("predicate"))?;
                TransformOp::FilterArray(
                    Condition::parse(predicate).map_err(|e| invalid(e.to_string()))?,
                )
            }
            "map_array" => {
                let expression = cfg.expression.clone().ok_or_else(|| require("expression"))?;
                resolver::check_template(&expression).map_err(|e| invalid(e.to_string()))?;
                TransformOp::MapArray(expression)
            }
            other => return Err(invalid(format!("unknown transform operation '{}'", other))),
        };

        if !matches!(op, TransformOp::FormatText(_)) {
            let source = cfg.source.as_ref().ok_or_else(|| require("source"))?;
            resolver::check_template(source).map_err(|e| invalid(e.to_string()))?;
        }

        Ok(Self {
            op,
            source: cfg.source.clone(),
            fallback: cfg.fallback.clone(),
        })
    }

    pub fn op(&self) -> &TransformOp {
        &self.op
    }

    /// Value stored when the operation fails, if any.
    pub fn fallback(&self) -> Option<&Value> {
        self.fallback.as_ref()
    }

    pub fn execute(&self, scope: &dyn Lookup) -> Result<Value, ExecError> {
        match &self.op {
            TransformOp::FormatText(template) => resolver::resolve_str(template, scope)
                .map(|v| Value::String(resolver::to_text(&v))),
            TransformOp::ExtractFields(fields) => match self.source(scope)? {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        project(item, fields).ok_or_else(|| {
                            ExecError::Transform(format!(
                                "extract_fields element #{} is {}, expected an object",
                                i,
                                json_type(item)
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => project(&other, fields).ok_or_else(|| {
                    ExecError::Transform(format!(
                        "extract_fields source is {}, expected an object or array",
                        json_type(&other)
                    ))
                }),
            },
            TransformOp::FilterArray(predicate) => {
                let items = self.source_array(scope)?;
                let mut kept = Vec::new();
                for (i, item) in items.into_iter().enumerate() {
                    let element = Layered::new(scope)
                        .bind(ITEM, item.clone())
                        .bind(INDEX, Value::from(i));
                    if predicate.evaluate(&element)? {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            TransformOp::MapArray(expression) => self
                .source_array(scope)?
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    let element = Layered::new(scope).bind(ITEM, item).bind(INDEX, Value::from(i));
                    resolver::resolve(expression, &element)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    fn source(&self, scope: &dyn Lookup) -> Result<Value, ExecError> {
        match &self.source {
            Some(template) => resolver::resolve(template, scope),
            None => Ok(Value::Null),
        }
    }

    fn source_array(&self, scope: &dyn Lookup) -> Result<Vec<Value>, ExecError> {
        match self.source(scope)? {
            Value::Array(items) => Ok(items),
            other => Err(ExecError::NotAnArray {
                path: self.source.as_ref().map(resolver::to_text).unwrap_or_default(),
                found: json_type(&other).to_string(),
            }),
        }
    }
}

/// Keep only `fields` of an object; missing fields become null.
fn project(value: &Value, fields: &[String]) -> Option<Value> {
    let obj = value.as_object()?;
    let mut out = Map::new();
    for field in fields {
        out.insert(field.clone(), obj.get(field).cloned().unwrap_or(Value::Null));
    }
    Some(Value::Object(out))
}
