use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{json_type, ExecError, ValidationError};
use crate::graph::MergeConfig;
use crate::resolver;
use crate::scope::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Join inputs as text.
    Concatenate,
    /// Shallow union of objects, rightmost key wins.
    MergeObjects,
    /// Flatten inputs one level into a single array.
    CombineArrays,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concatenate" => Ok(Self::Concatenate),
            "merge_objects" => Ok(Self::MergeObjects),
            "combine_arrays" => Ok(Self::CombineArrays),
            other => Err(format!("unknown merge strategy '{}'", other)),
        }
    }
}

/// Combines several resolved inputs into one value.
#[derive(Debug, Clone)]
pub struct MergeExecutor {
    inputs: Vec<Value>,
    strategy: MergeStrategy,
    separator: String,
}

impl MergeExecutor {
    pub fn build(node_id: &str, cfg: &MergeConfig) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidConfig {
            node: node_id.to_string(),
            reason,
        };
        let strategy = cfg.strategy.parse::<MergeStrategy>().map_err(invalid)?;
        if cfg.inputs.is_empty() {
            return Err(invalid("merge needs at least one input".to_string()));
        }
        for input in &cfg.inputs {
            resolver::check_template(input).map_err(|e| invalid(format!("inputs: {}", e)))?;
        }
        Ok(Self {
            inputs: cfg.inputs.clone(),
            strategy,
            separator: cfg.separator.clone(),
        })
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn execute(&self, scope: &dyn Lookup) -> Result<Value, ExecError> {
        let values = self
            .inputs
            .iter()
            .map(|t| resolver::resolve(t, scope))
            .collect::<Result<Vec<_>, _>>()?;
        combine(self.strategy, values, &self.separator)
    }
}

/// Apply a strategy to already-resolved values.
pub fn combine(
    strategy: MergeStrategy,
    values: Vec<Value>,
    separator: &str,
) -> Result<Value, ExecError> {
    match strategy {
        MergeStrategy::Concatenate => Ok(Value::String(
            values
                .iter()
                .map(resolver::to_text)
                .collect::<Vec<_>>()
                .join(separator),
        )),
        MergeStrategy::MergeObjects => {
            let mut merged = Map::new();
            for (i, value) in values.into_iter().enumerate() {
                match value {
                    Value::Object(map) => merged.extend(map),
                    other => {
                        return Err(ExecError::Merge(format!(
                            "merge_objects input #{} is {}, expected an object",
                            i,
                            json_type(&other)
                        )))
                    }
                }
            }
            Ok(Value::Object(merged))
        }
        MergeStrategy::CombineArrays => {
            let mut combined = Vec::new();
            for value in values {
                match value {
                    Value::Array(items) => combined.extend(items),
                    other => combined.push(other),
                }
            }
            Ok(Value::Array(combined))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn combine_arrays_flattens_one_level() {
        let out = combine(
            MergeStrategy::CombineArrays,
            vec![json!([1, 2]), json!([3, [4]]), json!(5)],
            "",
        )
        .unwrap();
        assert_eq!(out, json!([1, 2, 3, [4], 5]));
    }

    #[test]
    fn merge_objects_rightmost_wins() {
        let out = combine(
            MergeStrategy::MergeObjects,
            vec![json!({"a": 1, "b": 1}), json!({"b": 2, "c": {"d": 3}})],
            "",
        )
        .unwrap();
        assert_eq!(out, json!({"a": 1, "b": 2, "c": {"d": 3}}));

        let err = combine(MergeStrategy::MergeObjects, vec![json!({}), json!([1])], "").unwrap_err();
        assert_eq!(err.kind(), "merge");
    }

    #[test]
    fn concatenate_joins_text() {
        let out = combine(
            MergeStrategy::Concatenate,
            vec![json!("a"), json!(1), json!({"k": true})],
            ", ",
        )
        .unwrap();
        assert_eq!(out, json!(r#"a, 1, {"k":true}"#));
    }

    #[test]
    fn execute_resolves_inputs() {
        let mut scope = Map::new();
        scope.insert("x".into(), json!([1, 2]));
        scope.insert("y".into(), json!([3, 4]));
        let exec = MergeExecutor::build(
            "m",
            &MergeConfig {
                inputs: vec![json!("${x}"), json!("${y}")],
                strategy: "combine_arrays".into(),
                separator: String::new(),
            },
        )
        .unwrap();
        assert_eq!(exec.execute(&scope).unwrap(), json!([1, 2, 3, 4]));
    }

    #[test]
    fn unknown_strategy_rejected_at_build() {
        let err = MergeExecutor::build(
            "m",
            &MergeConfig {
                inputs: vec![json!("a")],
                strategy: "zip".into(),
                separator: String::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
        assert!(err.to_string().contains("zip"));
    }
}
