//! Search compilation into CouchDB map queries.
//!
//! A search for values of one kind matching dotted-path criteria becomes a
//! map function that skips documents of other kinds, emits the values found at
//! each criterion's path as the row key, and a query key holding the required
//! values in the same order. The backend then does an exact key match.

use crate::key::kind_prefix;
use docbank_storage::{lookup_path, Criteria};
use serde_json::Value;

/// A compiled search over the documents of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    prefix: String,
    paths: Vec<String>,
}

impl ViewQuery {
    /// Compile the map side of a search.
    pub fn new(kind: &str, criteria: &Criteria) -> Self {
        Self {
            prefix: kind_prefix(kind),
            paths: criteria.keys().cloned().collect(),
        }
    }

    /// The key a row must carry to match `criteria`.
    pub fn key_for(criteria: &Criteria) -> Value {
        Value::Array(criteria.values().cloned().collect())
    }

    /// Document id prefix the query is restricted to.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Dotted paths whose values form the emitted key, in key order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Render the JavaScript map function CouchDB evaluates.
    pub fn map_source(&self) -> String {
        let prefix = Value::String(self.prefix.clone()).to_string();
        let paths = Value::Array(
            self.paths
                .iter()
                .map(|path| Value::Array(path.split('.').map(Value::from).collect()))
                .collect(),
        )
        .to_string();

        format!(
            r#"function (doc) {{
    var lookup = function (node, path) {{
        for (var i = 0; i < path.length; i++) {{
            if (!path[i]) return node;
            if (node === null || typeof node !== "object") return undefined;
            if (!Object.prototype.hasOwnProperty.call(node, path[i])) return undefined;
            node = node[path[i]];
        }}
        return node;
    }};
    var prefix = {prefix};
    if (doc._id.substr(0, prefix.length) !== prefix) return;
    var paths = {paths};
    var key = [];
    for (var i = 0; i < paths.length; i++) {{
        var value = lookup(doc.data, paths[i]);
        if (value === undefined) return;
        key.push(value);
    }}
    emit(key, doc);
}}"#
        )
    }

    /// Evaluate the map function against a raw document.
    ///
    /// Returns the emitted key, or `None` when the document is skipped.
    pub fn emit(&self, doc: &Value) -> Option<Value> {
        let id = doc.get("_id")?.as_str()?;
        if !id.starts_with(&self.prefix) {
            return None;
        }

        let mut key = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let value = doc.get("data").and_then(|data| lookup_path(data, path))?;
            key.push(value.clone());
        }
        Some(Value::Array(key))
    }
}
