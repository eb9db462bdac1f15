//! JSON file ranges.
//!
//! A range's optional filter is a small JSONPath subset: `$`, `.key`,
//! `['key']`, `[n]`, `[*]` and `.*`. Selected arrays are expanded into their
//! elements, and each element becomes one row with columns named
//! `alias.key[.sub]`. Scalars land in `alias.value`.

use crate::ast::RangeJsonSource;
use crate::error::{Error, Result};
use objectquel_api::{Row, Value};
use serde_json::Value as Json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(usize),
    Wildcard,
}

fn parse_path(path: &str) -> std::result::Result<Vec<Step>, String> {
    let path = path.trim();
    let rest = path.strip_prefix('$').unwrap_or(path);
    let chars: Vec<char> = rest.chars().collect();
    let mut steps = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                if chars.get(i) == Some(&'*') {
                    steps.push(Step::Wildcard);
                    i += 1;
                    continue;
                }
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                if start == i {
                    return Err(format!("empty key at offset {start}"));
                }
                steps.push(Step::Key(chars[start..i].iter().collect()));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| "unterminated '['".to_string())?;
                let inner: String = chars[i + 1..close].iter().collect();
                let inner = inner.trim();
                if inner == "*" {
                    steps.push(Step::Wildcard);
                } else if let Some(key) = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
                {
                    steps.push(Step::Key(key.to_string()));
                } else {
                    let index = inner
                        .parse::<usize>()
                        .map_err(|_| format!("invalid index '{inner}'"))?;
                    steps.push(Step::Index(index));
                }
                i = close + 1;
            }
            c => return Err(format!("unexpected '{c}' in path")),
        }
    }
    Ok(steps)
}

fn select<'a>(root: &'a Json, steps: &[Step]) -> Vec<&'a Json> {
    let mut current = vec![root];
    for step in steps {
        let mut next = Vec::new();
        for node in current {
            match step {
                Step::Key(key) => next.extend(node.get(key.as_str())),
                Step::Index(index) => next.extend(node.get(*index)),
                Step::Wildcard => match node {
                    Json::Array(items) => next.extend(items.iter()),
                    Json::Object(map) => next.extend(map.values()),
                    _ => {}
                },
            }
        }
        current = next;
    }
    current
}

fn flatten_into(row: &mut Row, prefix: &str, value: &Json) {
    match value {
        Json::Object(map) => {
            for (key, child) in map {
                flatten_into(row, &format!("{prefix}.{key}"), child);
            }
        }
        other => row.insert(prefix, Value::from(other.clone())),
    }
}

/// One row per element, columns prefixed by `alias`.
pub fn rows_from_json(alias: &str, document: &Json, filter: Option<&str>) -> Result<Vec<Row>> {
    let steps = match filter {
        Some(path) => parse_path(path).map_err(|message| Error::JsonSource {
            path: path.to_string(),
            message,
        })?,
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for node in select(document, &steps) {
        let elements: Vec<&Json> = match node {
            Json::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for element in elements {
            let mut row = Row::default();
            match element {
                Json::Object(_) => flatten_into(&mut row, alias, element),
                scalar => row.insert(format!("{alias}.value"), Value::from(scalar.clone())),
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

fn resolve(path: &str, base_dir: Option<&Path>) -> PathBuf {
    let candidate = Path::new(path);
    match base_dir {
        Some(dir) if candidate.is_relative() => dir.join(candidate),
        _ => candidate.to_path_buf(),
    }
}

/// Reads and flattens the file behind a JSON range. Relative paths are
/// resolved against `base_dir` when one is configured.
pub fn load(range: &RangeJsonSource, base_dir: Option<&Path>) -> Result<Vec<Row>> {
    let path = resolve(&range.path, base_dir);
    let shown = path.display().to_string();
    let text = fs::read_to_string(&path).map_err(|e| Error::JsonSource {
        path: shown.clone(),
        message: e.to_string(),
    })?;
    let document: Json = serde_json::from_str(&text).map_err(|e| Error::JsonSource {
        path: shown.clone(),
        message: e.to_string(),
    })?;
    let rows = rows_from_json(&range.alias, &document, range.filter.as_deref())?;
    debug!(path = %shown, alias = %range.alias, rows = rows.len(), "loaded JSON source");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_path_subset() {
        assert_eq!(
            parse_path("$.data['items'][0].*").unwrap(),
            vec![
                Step::Key("data".into()),
                Step::Key("items".into()),
                Step::Index(0),
                Step::Wildcard
            ]
        );
        assert_eq!(parse_path("$").unwrap(), vec![]);
        assert!(parse_path("$.a[").is_err());
        assert!(parse_path("$.a[x]").is_err());
    }

    #[test]
    fn arrays_expand_and_objects_flatten() {
        let doc = json!({"items": [
            {"sku": "A1", "stock": {"count": 3}},
            {"sku": "B2", "stock": {"count": 0}}
        ]});
        let rows = rows_from_json("j", &doc, Some("$.items")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("j.sku"), Some(&Value::String("A1".into())));
        assert_eq!(rows[1].get("j.stock.count"), Some(&Value::Int(0)));
    }

    #[test]
    fn wildcard_over_object_values() {
        let doc = json!({"a": {"n": 1}, "b": {"n": 2}});
        let rows = rows_from_json("j", &doc, Some("$.*")).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn scalars_become_value_column() {
        let doc = json!([1, 2, 3]);
        let rows = rows_from_json("n", &doc, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("n.value"), Some(&Value::Int(3)));
    }

    #[test]
    fn missing_file_is_a_json_source_error() {
        let range = RangeJsonSource {
            alias: "j".into(),
            path: "does/not/exist.json".into(),
            filter: None,
            via: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let err = load(&range, Some(dir.path())).unwrap_err();
        assert!(matches!(err, Error::JsonSource { .. }));
    }

    #[test]
    fn loads_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stock.json"), r#"[{"sku":"A1"}]"#).unwrap();
        let range = RangeJsonSource {
            alias: "s".into(),
            path: "stock.json".into(),
            filter: None,
            via: None,
        };
        let rows = load(&range, Some(dir.path())).unwrap();
        assert_eq!(rows[0].get("s.sku"), Some(&Value::String("A1".into())));
    }
}
