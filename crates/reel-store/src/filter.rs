//! Record predicates and partial updates over JSON documents.
//!
//! Field paths may be dotted (`metadata.content_type`) to reach into nested
//! objects. A missing field reads as `null`.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// A stored record.
pub type Document = Map<String, Value>;

/// Predicate over a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Lt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    /// Conjunction; an empty list matches everything.
    And(Vec<Filter>),
}

impl Filter {
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::NotIn(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Self {
        let mut parts = match self {
            Filter::And(parts) => parts,
            f => vec![f],
        };
        match other {
            Filter::And(more) => parts.extend(more),
            f => parts.push(f),
        }
        Filter::And(parts)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, v) => lookup(doc, field) == v,
            Filter::Lt(field, v) => compare(lookup(doc, field), v) == Some(Ordering::Less),
            Filter::Gte(field, v) => matches!(
                compare(lookup(doc, field), v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::In(field, vs) => vs.contains(lookup(doc, field)),
            Filter::NotIn(field, vs) => !vs.contains(lookup(doc, field)),
            Filter::And(parts) => parts.iter().all(|f| f.matches(doc)),
        }
    }

    /// Top-level equality terms, which every backend can evaluate natively.
    pub fn equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            Filter::Eq(field, v) => vec![(field.as_str(), v)],
            Filter::And(parts) => parts.iter().flat_map(|f| f.equalities()).collect(),
            _ => Vec::new(),
        }
    }
}

static NULL: Value = Value::Null;

/// Resolve a dotted path.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> &'a Value {
    let mut parts = path.split('.');
    let first = parts.next().unwrap_or_default();
    let mut current = match doc.get(first) {
        Some(v) => v,
        None => return &NULL,
    };
    for part in parts {
        current = match current.get(part) {
            Some(v) => v,
            None => return &NULL,
        };
    }
    current
}

/// Numbers compare numerically, strings lexically; anything else is unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A partial update: field assignments plus integer increments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub set: Vec<(String, Value)>,
    pub increment: Vec<(String, i64)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((field.into(), value.into()));
        self
    }

    /// Set a field from any serializable value.
    pub fn set_json<T: serde::Serialize>(self, field: impl Into<String>, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.set(field, value)
    }

    pub fn clear(self, field: impl Into<String>) -> Self {
        self.set(field, Value::Null)
    }

    pub fn inc(mut self, field: impl Into<String>, by: i64) -> Self {
        self.increment.push((field.into(), by));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.increment.is_empty()
    }

    /// Top-level fields this patch writes.
    pub fn touched_roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = Vec::new();
        let paths = self
            .set
            .iter()
            .map(|(p, _)| p)
            .chain(self.increment.iter().map(|(p, _)| p));
        for path in paths {
            let root = path.split('.').next().unwrap_or(path).to_string();
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        roots
    }

    /// Apply in place. Assignments run before increments; a missing or
    /// non-integer counter starts from zero.
    pub fn apply(&self, doc: &mut Document) {
        for (path, value) in &self.set {
            assign(doc, path, value.clone());
        }
        for (path, by) in &self.increment {
            let current = lookup(doc, path).as_i64().unwrap_or(0);
            assign(doc, path, Value::from(current + by));
        }
    }
}

fn assign(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                assign(map, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_eligibility_filter() {
        let filter = Filter::eq("status", "requested")
            .and(Filter::lt("script_generation_attempts", 3))
            .and(Filter::not_in("request_id", ["blocked"]));

        let ok = doc(json!({"status": "requested", "script_generation_attempts": 2, "request_id": "r1"}));
        let exhausted = doc(json!({"status": "requested", "script_generation_attempts": 3, "request_id": "r1"}));
        let blocked = doc(json!({"status": "requested", "script_generation_attempts": 0, "request_id": "blocked"}));

        assert!(filter.matches(&ok));
        assert!(!filter.matches(&exhausted));
        assert!(!filter.matches(&blocked));
    }

    #[test]
    fn test_dotted_paths() {
        let d = doc(json!({"metadata": {"content_type": "video", "duration": 12.0}}));
        assert!(Filter::eq("metadata.content_type", "video").matches(&d));
        assert!(Filter::gte("metadata.duration", 12).matches(&d));
        assert!(!Filter::eq("metadata.missing", "x").matches(&d));
        assert!(Filter::eq("metadata.missing", Value::Null).matches(&d));
    }

    #[test]
    fn test_lt_on_missing_field_is_false() {
        assert!(!Filter::lt("lease_expires_at_ms", 100).matches(&doc(json!({}))));
        assert!(!Filter::lt("lease_expires_at_ms", 100).matches(&doc(json!({"lease_expires_at_ms": null}))));
    }

    #[test]
    fn test_equalities_collects_top_level_terms() {
        let filter = Filter::eq("status", "generated")
            .and(Filter::lt("scene_narration_attempts", 3))
            .and(Filter::eq("video_id", "v1"));
        let eqs = filter.equalities();
        assert_eq!(eqs.len(), 2);
        assert_eq!(eqs[0], ("status", &json!("generated")));
    }

    #[test]
    fn test_patch_apply() {
        let mut d = doc(json!({"status": "requested", "attempts": 1}));
        Patch::new()
            .set("status", "started")
            .set("metadata.has_speech", true)
            .inc("attempts", 1)
            .inc("render_attempts", 1)
            .clear("lease_expires_at_ms")
            .apply(&mut d);

        assert_eq!(d["status"], "started");
        assert_eq!(d["attempts"], 2);
        assert_eq!(d["render_attempts"], 1);
        assert_eq!(d["metadata"]["has_speech"], true);
        assert_eq!(d["lease_expires_at_ms"], Value::Null);
    }

    #[test]
    fn test_touched_roots() {
        let patch = Patch::new()
            .set("metadata.width", 10)
            .set("metadata.height", 20)
            .inc("attempts", 1);
        assert_eq!(patch.touched_roots(), vec!["metadata", "attempts"]);
    }
}
