use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::storage::types::graph_node::EntityType;

/// Normalize an entity name into a stable slug: lowercase, NFD with combining
/// marks stripped, runs of non-alphanumerics collapsed into `_`, trimmed.
/// Idempotent and ASCII-only by construction.
pub fn slug(name: &str) -> String {
    let stripped: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let mut out = String::with_capacity(stripped.len());
    let mut last_was_separator = false;
    for c in stripped.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_separator = false;
        } else if !last_was_separator {
            out.push('_');
            last_was_separator = true;
        }
    }

    out.trim_matches('_').to_string()
}

/// Stable entity id: `<type>:<slug>`, derived deterministically from the
/// entity name and type.
pub fn entity_id(name: &str, entity_type: EntityType) -> String {
    format!("{}:{}", entity_type.as_str().to_lowercase(), slug(name))
}
