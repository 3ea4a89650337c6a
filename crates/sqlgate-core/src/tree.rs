//! Iterative traversal of structural trees.

use serde_json::{Map, Value};

/// Depth-first iterator over every object in a tree, root first.
///
/// Uses an explicit stack, so traversal depth is bounded by heap, not by the
/// call stack.
pub(crate) struct Objects<'a> {
    stack: Vec<&'a Value>,
}

impl<'a> Objects<'a> {
    pub(crate) fn new(root: &'a Value) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for Objects<'a> {
    type Item = &'a Map<String, Value>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(value) = self.stack.pop() {
            match value {
                Value::Object(map) => {
                    self.stack.extend(map.values().rev());
                    return Some(map);
                }
                Value::Array(items) => self.stack.extend(items.iter().rev()),
                _ => {}
            }
        }
        None
    }
}

/// Drops a tree one container at a time. `Value`'s own drop recurses once
/// per nesting level.
pub(crate) fn dismantle(root: Value) {
    let mut stack = vec![root];
    while let Some(value) = stack.pop() {
        match value {
            Value::Array(items) => stack.extend(items),
            Value::Object(map) => stack.extend(map.into_iter().map(|(_, child)| child)),
            _ => {}
        }
    }
}

/// If `map` is an externally tagged enum value (`{"Variant": payload}`),
/// returns the variant name and payload.
pub(crate) fn variant(map: &Map<String, Value>) -> Option<(&str, &Value)> {
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(tag, payload)| (tag.as_str(), payload))
}
