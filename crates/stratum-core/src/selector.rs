//! Path selectors for post-load property rewriting
//!
//! A [`PathSelector`] finds property occurrences in a parsed document. The
//! built-in [`JsonPathSelector`] understands the JSONPath subset that
//! configuration specs use in practice:
//!
//! | Syntax | Meaning |
//! |---|---|
//! | `$` | document root |
//! | `.name`, `['name']` | child property |
//! | `[2]`, `[-1]` | array element |
//! | `.*`, `[*]` | every child |
//! | `..name`, `..*`, `..[0]` | descendants at any depth |

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Key of a matched value within its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKey {
    Name(String),
    Index(usize),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Name(name) => f.write_str(name),
            PropertyKey::Index(index) => write!(f, "{index}"),
        }
    }
}

/// One selected occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorMatch {
    /// Normalized path, e.g. `$['paths'][0]`
    pub path: String,
    /// JSON pointer usable with [`Value::pointer_mut`]
    pub pointer: String,
    /// Key within the parent; `None` when the match is the root itself
    pub property_key: Option<PropertyKey>,
    pub value: Value,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid selector \"{selector}\" at offset {position}: {message}")]
pub struct SelectorError {
    pub selector: String,
    pub position: usize,
    pub message: String,
}

/// Finds property occurrences in a document
pub trait PathSelector: Send + Sync {
    fn select(&self, selector: &str, root: &Value) -> Result<Vec<SelectorMatch>, SelectorError>;
}

/// JSONPath subset evaluator, returns matches in document order
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathSelector;

impl PathSelector for JsonPathSelector {
    fn select(&self, selector: &str, root: &Value) -> Result<Vec<SelectorMatch>, SelectorError> {
        let segments = parse(selector)?;

        let mut current = vec![Node {
            path: "$".to_string(),
            pointer: String::new(),
            key: None,
            value: root,
        }];
        for segment in &segments {
            let mut next = Vec::new();
            for node in &current {
                match segment {
                    Segment::Child(step) => apply_step(step, node, &mut next),
                    Segment::Descendant(step) => {
                        for_each_descendant_or_self(node, &mut |n| apply_step(step, n, &mut next))
                    }
                }
            }
            current = next;
        }

        Ok(current
            .into_iter()
            .map(|node| SelectorMatch {
                path: node.path,
                pointer: node.pointer,
                property_key: node.key,
                value: node.value.clone(),
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Name(String),
    Index(i64),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(Step),
    Descendant(Step),
}

struct Node<'a> {
    path: String,
    pointer: String,
    key: Option<PropertyKey>,
    value: &'a Value,
}

impl<'a> Node<'a> {
    fn child(&self, key: PropertyKey, value: &'a Value) -> Node<'a> {
        let (path, token) = match &key {
            PropertyKey::Name(name) => (
                format!("{}['{}']", self.path, name.replace('\'', "\\'")),
                name.replace('~', "~0").replace('/', "~1"),
            ),
            PropertyKey::Index(index) => (format!("{}[{index}]", self.path), index.to_string()),
        };
        Node {
            path,
            pointer: format!("{}/{token}", self.pointer),
            key: Some(key),
            value,
        }
    }
}

fn apply_step<'a>(step: &Step, node: &Node<'a>, out: &mut Vec<Node<'a>>) {
    match (step, node.value) {
        (Step::Name(name), Value::Object(map)) => {
            if let Some(value) = map.get(name) {
                out.push(node.child(PropertyKey::Name(name.clone()), value));
            }
        }
        (Step::Index(index), Value::Array(items)) => {
            let resolved = if *index < 0 {
                items.len().checked_sub(index.unsigned_abs() as usize)
            } else {
                Some(*index as usize)
            };
            if let Some(value) = resolved.and_then(|i| items.get(i).map(|v| (i, v))) {
                out.push(node.child(PropertyKey::Index(value.0), value.1));
            }
        }
        (Step::Wildcard, Value::Object(map)) => {
            for (name, value) in map {
                out.push(node.child(PropertyKey::Name(name.clone()), value));
            }
        }
        (Step::Wildcard, Value::Array(items)) => {
            for (index, value) in items.iter().enumerate() {
                out.push(node.child(PropertyKey::Index(index), value));
            }
        }
        _ => {}
    }
}

fn for_each_descendant_or_self<'a>(node: &Node<'a>, visit: &mut dyn FnMut(&Node<'a>)) {
    visit(node);
    let children: Vec<Node<'a>> = match node.value {
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| node.child(PropertyKey::Name(name.clone()), value))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, value)| node.child(PropertyKey::Index(index), value))
            .collect(),
        _ => Vec::new(),
    };
    for child in &children {
        for_each_descendant_or_self(child, visit);
    }
}

fn parse(selector: &str) -> Result<Vec<Segment>, SelectorError> {
    let error = |position: usize, message: &str| SelectorError {
        selector: selector.to_string(),
        position,
        message: message.to_string(),
    };

    let bytes = selector.as_bytes();
    if bytes.first() != Some(&b'$') {
        return Err(error(0, "selector must start with '$'"));
    }

    let mut segments = Vec::new();
    let mut pos = 1;
    while pos < bytes.len() {
        let descendant = selector[pos..].starts_with("..");
        match bytes[pos] {
            b'.' => {
                pos += if descendant { 2 } else { 1 };
                let step = if bytes.get(pos) == Some(&b'[') {
                    if !descendant {
                        return Err(error(pos, "unexpected '[' after '.'"));
                    }
                    let (step, end) = parse_bracket(selector, pos)?;
                    pos = end;
                    step
                } else if bytes.get(pos) == Some(&b'*') {
                    pos += 1;
                    Step::Wildcard
                } else {
                    let start = pos;
                    while pos < bytes.len() && !matches!(bytes[pos], b'.' | b'[') {
                        pos += 1;
                    }
                    if start == pos {
                        return Err(error(start, "expected a property name"));
                    }
                    Step::Name(selector[start..pos].to_string())
                };
                segments.push(if descendant {
                    Segment::Descendant(step)
                } else {
                    Segment::Child(step)
                });
            }
            b'[' => {
                let (step, end) = parse_bracket(selector, pos)?;
                pos = end;
                segments.push(Segment::Child(step));
            }
            _ => return Err(error(pos, "expected '.' or '['")),
        }
    }
    Ok(segments)
}

/// Parse `[...]` starting at `start`; returns the step and the offset after `]`
fn parse_bracket(selector: &str, start: usize) -> Result<(Step, usize), SelectorError> {
    let error = |position: usize, message: &str| SelectorError {
        selector: selector.to_string(),
        position,
        message: message.to_string(),
    };

    let rest = &selector[start + 1..];
    let first = rest.chars().next();
    match first {
        Some(quote @ ('\'' | '"')) => {
            let mut name = String::new();
            let mut escaped = false;
            for (offset, c) in rest[1..].char_indices() {
                if escaped {
                    name.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    let after = start + 2 + offset + c.len_utf8();
                    if selector[after..].starts_with(']') {
                        return Ok((Step::Name(name), after + 1));
                    }
                    return Err(error(after, "expected ']' after quoted name"));
                } else {
                    name.push(c);
                }
            }
            Err(error(start, "unterminated quoted name"))
        }
        Some(_) => {
            let close = rest
                .find(']')
                .ok_or_else(|| error(start, "missing closing ']'"))?;
            let inner = rest[..close].trim();
            let step = if inner == "*" {
                Step::Wildcard
            } else {
                inner
                    .parse::<i64>()
                    .map(Step::Index)
                    .map_err(|_| error(start + 1, "expected an index, '*' or a quoted name"))?
            };
            Ok((step, start + 1 + close + 1))
        }
        None => Err(error(start, "missing closing ']'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(selector: &str, doc: &Value) -> Vec<String> {
        JsonPathSelector
            .select(selector, doc)
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect()
    }

    #[test]
    fn test_child_and_index_steps() {
        let doc = json!({"a": {"b": ["x", "y", "z"]}, "c.d": 1});
        assert_eq!(paths("$.a.b[1]", &doc), vec!["$['a']['b'][1]"]);
        assert_eq!(paths("$.a.b[-1]", &doc), vec!["$['a']['b'][2]"]);
        assert_eq!(paths("$['c.d']", &doc), vec!["$['c.d']"]);
        assert!(paths("$.a.missing", &doc).is_empty());
        assert!(paths("$.a.b[7]", &doc).is_empty());
    }

    #[test]
    fn test_wildcards() {
        let doc = json!({"paths": ["a", "b"], "other": {"x": 1, "y": 2}});
        assert_eq!(
            paths("$.paths[*]", &doc),
            vec!["$['paths'][0]", "$['paths'][1]"]
        );
        assert_eq!(
            paths("$.other.*", &doc),
            vec!["$['other']['x']", "$['other']['y']"]
        );
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = json!({
            "outDir": "lib",
            "tasks": [{"outDir": "a"}, {"nested": {"outDir": "b"}}]
        });
        assert_eq!(
            paths("$..outDir", &doc),
            vec![
                "$['outDir']",
                "$['tasks'][0]['outDir']",
                "$['tasks'][1]['nested']['outDir']"
            ]
        );
    }

    #[test]
    fn test_match_details() {
        let doc = json!({"a/b": {"list": ["v"]}});
        let matches = JsonPathSelector.select("$['a/b'].list[0]", &doc).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pointer, "/a~1b/list/0");
        assert_eq!(matches[0].property_key, Some(PropertyKey::Index(0)));
        assert_eq!(matches[0].value, json!("v"));
        assert_eq!(doc.pointer(&matches[0].pointer), Some(&json!("v")));

        let root = JsonPathSelector.select("$", &doc).unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].property_key.is_none());
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in ["a.b", "$.", "$[", "$[abc]", "$['x'", "$.a[0"] {
            assert!(
                JsonPathSelector.select(bad, &json!({})).is_err(),
                "{bad} should be rejected"
            );
        }
    }
}
