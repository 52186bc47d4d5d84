//! Field path resolution.
use serde_json::Value;

use crate::config::FieldPath;
use crate::error::MissingField;

/// Resolves `path` inside `document`.
///
/// Each segment is looked up as a member of the current object. Traversal stops with
/// [`MissingField`] as soon as a segment is absent or the value being traversed is not an object.
/// An empty path never resolves: it is rejected as configuration long before it gets here.
///
/// ```rust
/// # use metricrule::{extract, FieldPath};
/// let document = serde_json::json!({ "outputs": { "score": 0.9 } });
///
/// let score = extract(&document, &FieldPath::new(["outputs", "score"])).unwrap();
/// assert_eq!(score, &serde_json::json!(0.9));
///
/// assert!(extract(&document, &FieldPath::new(["outputs", "label"])).is_err());
/// ```
pub fn extract<'a>(document: &'a Value, path: &FieldPath) -> Result<&'a Value, MissingField> {
    if path.is_empty() {
        return Err(MissingField { path: path.clone(), position: 0 });
    }

    let mut current = document;
    for (position, segment) in path.segments().iter().enumerate() {
        current = current
            .as_object()
            .and_then(|object| object.get(segment))
            .ok_or_else(|| MissingField { path: path.clone(), position })?;
    }
    Ok(current)
}
