//! Mapping from `(kind, id)` pairs to CouchDB document ids.

/// Separates the kind from the id inside a document id.
///
/// Kinds must not contain it; ids may.
pub const SEPARATOR: char = ':';

/// The CouchDB document id for a stored value.
pub fn document_key(kind: &str, id: &str) -> String {
    let mut key = String::with_capacity(kind.len() + 1 + id.len());
    key.push_str(kind);
    key.push(SEPARATOR);
    key.push_str(id);
    key
}

/// The document id prefix shared by every value of `kind`.
pub fn kind_prefix(kind: &str) -> String {
    document_key(kind, "")
}
