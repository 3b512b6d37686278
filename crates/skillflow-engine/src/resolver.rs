//! `${...}` reference resolution.
//!
//! A reference is a dot path whose first segment names a context key (a node
//! id, `input`, `loop_var`, `loop_index`, ...) and whose remaining segments
//! index into objects by key and arrays by position. A string consisting of
//! exactly one reference resolves to the referenced value itself; a string
//! mixing text and references interpolates. Unresolvable segments are errors,
//! never defaults.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ExecError;
use crate::scope::Lookup;

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("static regex"))
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").expect("static regex"))
}

/// A parsed `${a.b.0}` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRef {
    raw: String,
    segments: Vec<String>,
}

impl PathRef {
    /// Parse the inside of a `${...}` token.
    pub fn parse(path: &str) -> Result<Self, ExecError> {
        let path = path.trim();
        if !path_re().is_match(path) {
            return Err(ExecError::Syntax(format!("invalid path '{}'", path)));
        }
        Ok(Self {
            raw: path.to_string(),
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The context key the path starts from.
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path through `scope`.
    pub fn resolve(&self, scope: &dyn Lookup) -> Result<Value, ExecError> {
        let not_found = |segment: &str| ExecError::PathNotFound {
            path: self.raw.clone(),
            segment: segment.to_string(),
        };
        let mut current = scope.lookup(self.root()).ok_or_else(|| not_found(self.root()))?;
        for segment in &self.segments[1..] {
            current = match current {
                Value::Object(map) => map.get(segment.as_str()),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| not_found(segment))?;
        }
        Ok(current.clone())
    }
}

impl std::fmt::Display for PathRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}}}", self.raw)
    }
}

/// A piece of a string template.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text(String),
    Ref(PathRef),
}

/// Split a string into literal text and references.
pub fn parse_template(s: &str) -> Result<Vec<Piece>, ExecError> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in reference_re().captures_iter(s) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            push_text(&mut pieces, &s[last..whole.start()])?;
        }
        pieces.push(Piece::Ref(PathRef::parse(inner.as_str())?));
        last = whole.end();
    }
    if last < s.len() {
        push_text(&mut pieces, &s[last..])?;
    }
    Ok(pieces)
}

fn push_text(pieces: &mut Vec<Piece>, text: &str) -> Result<(), ExecError> {
    if text.contains("${") {
        return Err(ExecError::Syntax(format!("unclosed reference in '{}'", text)));
    }
    pieces.push(Piece::Text(text.to_string()));
    Ok(())
}

/// Parse a string that must be exactly one `${path}` reference.
pub fn parse_reference(s: &str) -> Result<PathRef, ExecError> {
    match parse_template(s.trim())?.as_slice() {
        [Piece::Ref(path)] => Ok(path.clone()),
        [] => Err(ExecError::Syntax("empty reference".to_string())),
        _ => Err(ExecError::Syntax(format!(
            "'{}' is not a single ${{...}} reference",
            s
        ))),
    }
}

/// Check every string in a template for malformed references.
pub fn check_template(template: &Value) -> Result<(), ExecError> {
    match template {
        Value::String(s) => parse_template(s).map(|_| ()),
        Value::Array(items) => items.iter().try_for_each(check_template),
        Value::Object(map) => map.values().try_for_each(check_template),
        _ => Ok(()),
    }
}

/// Resolve every reference in a JSON template.
pub fn resolve(template: &Value, scope: &dyn Lookup) -> Result<Value, ExecError> {
    match template {
        Value::String(s) => resolve_str(s, scope),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve(v, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve(v, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve a single string. One bare reference keeps the referenced type.
pub fn resolve_str(s: &str, scope: &dyn Lookup) -> Result<Value, ExecError> {
    let pieces = parse_template(s)?;
    if let [Piece::Ref(path)] = pieces.as_slice() {
        return path.resolve(scope);
    }
    let mut out = String::with_capacity(s.len());
    for piece in &pieces {
        match piece {
            Piece::Text(t) => out.push_str(t),
            Piece::Ref(path) => out.push_str(&to_text(&path.resolve(scope)?)),
        }
    }
    Ok(Value::String(out))
}

/// Text form of a value: strings verbatim, everything else as compact JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn ctx() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("input".into(), json!({"query": "cats", "limit": 3}));
        m.insert(
            "search".into(),
            json!({"results": [{"title": "A"}, {"title": "B"}], "total": 2}),
        );
        m.insert("loop_var".into(), json!({"url": "http://x"}));
        m
    }

    #[test]
    fn single_reference_keeps_type() {
        assert_eq!(resolve_str("${input.limit}", &ctx()).unwrap(), json!(3));
        assert_eq!(
            resolve_str("${search.results}", &ctx()).unwrap(),
            json!([{"title": "A"}, {"title": "B"}])
        );
    }

    #[test]
    fn array_index_segments() {
        assert_eq!(resolve_str("${search.results.1.title}", &ctx()).unwrap(), json!("B"));
    }

    #[test]
    fn mixed_text_interpolates() {
        assert_eq!(
            resolve_str("q=${input.query} n=${search.total}", &ctx()).unwrap(),
            json!("q=cats n=2")
        );
        assert_eq!(
            resolve_str("got ${search.results.0}", &ctx()).unwrap(),
            json!(r#"got {"title":"A"}"#)
        );
    }

    #[test]
    fn nested_templates_resolve_recursively() {
        let template = json!({
            "q": "${input.query}",
            "opts": [1, "${loop_var.url}", {"deep": "${search.total}"}],
            "flag": true
        });
        assert_eq!(
            resolve(&template, &ctx()).unwrap(),
            json!({"q": "cats", "opts": [1, "http://x", {"deep": 2}], "flag": true})
        );
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(resolve(&json!("no refs here"), &ctx()).unwrap(), json!("no refs here"));
        assert_eq!(resolve(&json!(4.5), &ctx()).unwrap(), json!(4.5));
        assert_eq!(resolve_str("cost: $5", &ctx()).unwrap(), json!("cost: $5"));
    }

    #[test]
    fn missing_segment_is_path_not_found() {
        let err = resolve_str("${search.results.7.title}", &ctx()).unwrap_err();
        assert_eq!(
            err,
            ExecError::PathNotFound {
                path: "search.results.7.title".into(),
                segment: "7".into()
            }
        );

        let err = resolve_str("${nobody.knows}", &ctx()).unwrap_err();
        assert!(matches!(err, ExecError::PathNotFound { ref segment, .. } if segment == "nobody"));

        let err = resolve_str("${input.query.len}", &ctx()).unwrap_err();
        assert!(matches!(err, ExecError::PathNotFound { ref segment, .. } if segment == "len"));
    }

    #[test]
    fn malformed_references() {
        assert!(matches!(parse_template("${}"), Err(ExecError::Syntax(_))));
        assert!(matches!(parse_template("${a..b}"), Err(ExecError::Syntax(_))));
        assert!(matches!(parse_template("${a b}"), Err(ExecError::Syntax(_))));
        assert!(matches!(parse_template("x ${open"), Err(ExecError::Syntax(_))));
        assert!(check_template(&json!({"a": ["${ok.path}", "${bad path}"]})).is_err());
        assert!(check_template(&json!({"a": ["${ok.path}", 1]})).is_ok());
    }

    #[test]
    fn single_reference_parsing() {
        let path = parse_reference("${search.results}").unwrap();
        assert_eq!(path.root(), "search");
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.to_string(), "${search.results}");
        assert!(parse_reference("search.results").is_err());
        assert!(parse_reference("${a} and ${b}").is_err());
        assert!(parse_reference("").is_err());
    }
}
