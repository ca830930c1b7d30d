//! Field paths for addressing within documents
//!
//! Provides [`FieldPath`] for hierarchical addressing of nested fields.

use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Path to a nested field
///
/// Array elements do not contribute a segment: `goals.kpis` names the
/// `kpis` array inside every element of `goals`.
///
/// # Examples
/// - `["stateMetadata", "updatedAt"]` → `stateMetadata.updatedAt`
/// - `["goals", "kpis"]` → `goals.kpis`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    #[inline]
    #[must_use]
    pub fn single(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Empty path (document root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Value at this path, without descending into arrays
    #[must_use]
    pub fn lookup<'a>(&self, map: &'a Map<String, Value>) -> Option<&'a Value> {
        let (last, parents) = self.0.split_last()?;
        let mut current = map;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(last)
    }

    /// Visit every object that holds the final segment, descending into
    /// arrays element by element.
    ///
    /// Missing or null intermediate segments are skipped, never created: an
    /// absent optional array must stay absent rather than become an object.
    ///
    /// The visitor receives the parent object and the final key.
    pub fn visit_parents_mut<F>(&self, map: &mut Map<String, Value>, visitor: &mut F)
    where
        F: FnMut(&mut Map<String, Value>, &str),
    {
        visit_mut(map, &self.0, visitor);
    }
}

fn visit_mut<F>(map: &mut Map<String, Value>, segments: &[String], visitor: &mut F)
where
    F: FnMut(&mut Map<String, Value>, &str),
{
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        visitor(map, head);
        return;
    }
    match map.get_mut(head.as_str()) {
        Some(Value::Object(child)) => visit_mut(child, rest, visitor),
        Some(Value::Array(items)) => {
            for item in items.iter_mut() {
                if let Value::Object(child) = item {
                    visit_mut(child, rest, visitor);
                }
            }
        }
        _ => {}
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = s
            .split('.')
            .map(|seg| {
                if seg.is_empty() {
                    Err(PathError::EmptySegment)
                } else if seg.contains(|c: char| !c.is_alphanumeric() && c != '_') {
                    Err(PathError::InvalidSegment(seg.to_string()))
                } else {
                    Ok(seg.to_string())
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl Default for FieldPath {
    fn default() -> Self {
        Self::root()
    }
}

/// Errors related to field paths
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path contains empty segment")]
    EmptySegment,

    #[error("invalid segment: {0} (must be alphanumeric or underscore)")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn path_child_and_display() {
        let path = FieldPath::single("goals").child("kpis");
        assert_eq!(path.segments(), &["goals", "kpis"]);
        assert_eq!(path.to_string(), "goals.kpis");
        assert_eq!(path.last(), Some("kpis"));
    }

    #[test]
    fn path_from_str_valid() {
        let path: FieldPath = "stateMetadata.updatedAt".parse().unwrap();
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn path_from_str_empty_is_root() {
        let path: FieldPath = "".parse().unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn path_from_str_rejects_empty_segment() {
        let result: Result<FieldPath, _> = "a..b".parse();
        assert!(matches!(result, Err(PathError::EmptySegment)));
    }

    #[test]
    fn path_from_str_rejects_invalid_chars() {
        let result: Result<FieldPath, _> = "goals[].type".parse();
        assert!(matches!(result, Err(PathError::InvalidSegment(_))));
    }

    #[test]
    fn lookup_nested_field() {
        let map = object(json!({"guidelines": {"tone": "warm"}}));
        let path: FieldPath = "guidelines.tone".parse().unwrap();
        assert_eq!(path.lookup(&map), Some(&json!("warm")));
        assert_eq!(FieldPath::single("missing").lookup(&map), None);
    }

    #[test]
    fn visit_descends_into_arrays() {
        let mut map = object(json!({
            "majorMilestones": [{"description": "a"}, {"description": "b", "date": "x"}]
        }));
        let path: FieldPath = "majorMilestones.date".parse().unwrap();
        let mut visited = 0;
        path.visit_parents_mut(&mut map, &mut |parent, key| {
            visited += 1;
            parent.entry(key.to_string()).or_insert(json!("filled"));
        });
        assert_eq!(visited, 2);
        assert_eq!(map["majorMilestones"][0]["date"], json!("filled"));
        assert_eq!(map["majorMilestones"][1]["date"], json!("x"));
    }

    #[test]
    fn visit_skips_missing_parents() {
        let mut map = object(json!({"timeline": null}));
        let mut visited = 0;
        for raw in ["stateMetadata.updatedAt", "timeline.date", "majorMilestones.date"] {
            let path: FieldPath = raw.parse().unwrap();
            path.visit_parents_mut(&mut map, &mut |parent, key| {
                visited += 1;
                parent.insert(key.to_string(), json!(1));
            });
        }
        assert_eq!(visited, 0);
        assert_eq!(Value::Object(map), json!({"timeline": null}));
    }

    #[test]
    fn visit_fills_existing_parents() {
        let mut map = object(json!({"stateMetadata": {"version": 1}}));
        let path: FieldPath = "stateMetadata.updatedAt".parse().unwrap();
        path.visit_parents_mut(&mut map, &mut |parent, key| {
            parent.insert(key.to_string(), json!(1));
        });
        assert_eq!(map["stateMetadata"]["updatedAt"], json!(1));
    }
}
