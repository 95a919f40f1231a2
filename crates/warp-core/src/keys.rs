//! Reserved-separator key codecs for edges and properties.
//!
//! Composite map keys are encoded with `\x00` as the field separator.
//! Edge-property keys carry a `\x01` namespace prefix, which keeps the
//! node-property and edge-property namespaces disjoint no matter what the
//! user strings look like. In exchange, user strings must never contain
//! either reserved byte; encoding rejects them up front.
//!
//! Shapes:
//!
//! ```text
//! edge key       = from \x00 to \x00 label
//! node prop key  = nodeId \x00 propKey
//! edge prop key  = \x01 from \x00 to \x00 label \x00 propKey
//! ```

use crate::error::ErrorCode;

/// Field separator inside composite keys.
pub const FIELD_SEP: char = '\x00';

/// Namespace prefix distinguishing edge-property keys.
pub const EDGE_PROP_PREFIX: char = '\x01';

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Key encoding and decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// A user string contained a reserved separator byte.
    #[error("reserved byte in {field}: user strings must not contain \\x00 or \\x01")]
    ReservedByte {
        /// Which input field was rejected.
        field: &'static str,
    },

    /// An encoded key did not have the expected field count.
    #[error("malformed key: expected {expected} fields, found {found}")]
    Malformed {
        /// Fields expected for this key shape.
        expected: usize,
        /// Fields actually present.
        found: usize,
    },
}

impl KeyError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidKeyEncoding
    }
}

fn check(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.contains(FIELD_SEP) || value.contains(EDGE_PROP_PREFIX) {
        return Err(KeyError::ReservedByte { field });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode an edge key from its endpoints and label.
///
/// # Errors
///
/// Returns [`KeyError::ReservedByte`] when any input contains a reserved
/// byte.
pub fn edge_key(from: &str, to: &str, label: &str) -> Result<String, KeyError> {
    check("from", from)?;
    check("to", to)?;
    check("label", label)?;
    Ok(format!("{from}{FIELD_SEP}{to}{FIELD_SEP}{label}"))
}

/// Encode a node-property key.
///
/// # Errors
///
/// Returns [`KeyError::ReservedByte`] when any input contains a reserved
/// byte.
pub fn node_prop_key(node: &str, prop: &str) -> Result<String, KeyError> {
    check("node", node)?;
    check("prop", prop)?;
    Ok(format!("{node}{FIELD_SEP}{prop}"))
}

/// Encode an edge-property key (namespaced under the `\x01` prefix).
///
/// # Errors
///
/// Returns [`KeyError::ReservedByte`] when any input contains a reserved
/// byte.
pub fn edge_prop_key(from: &str, to: &str, label: &str, prop: &str) -> Result<String, KeyError> {
    check("prop", prop)?;
    let edge = edge_key(from, to, label)?;
    Ok(format!("{EDGE_PROP_PREFIX}{edge}{FIELD_SEP}{prop}"))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decoded edge key fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRef {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Edge label.
    pub label: String,
}

/// A decoded property key: either a node property or an edge property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropKey {
    /// A property attached to a node.
    Node {
        /// Owning node id.
        node: String,
        /// Property name.
        prop: String,
    },
    /// A property attached to an edge.
    Edge {
        /// Owning edge.
        edge: EdgeRef,
        /// Property name.
        prop: String,
    },
}

/// Decode an encoded edge key.
///
/// # Errors
///
/// Returns [`KeyError::Malformed`] when the key does not split into exactly
/// three fields.
pub fn decode_edge_key(key: &str) -> Result<EdgeRef, KeyError> {
    let parts: Vec<&str> = key.split(FIELD_SEP).collect();
    if parts.len() != 3 {
        return Err(KeyError::Malformed {
            expected: 3,
            found: parts.len(),
        });
    }
    Ok(EdgeRef {
        from: parts[0].to_owned(),
        to: parts[1].to_owned(),
        label: parts[2].to_owned(),
    })
}

/// Decode an encoded property key into its node or edge form.
///
/// # Errors
///
/// Returns [`KeyError::Malformed`] on an unexpected field count.
pub fn decode_prop_key(key: &str) -> Result<PropKey, KeyError> {
    if let Some(rest) = key.strip_prefix(EDGE_PROP_PREFIX) {
        let parts: Vec<&str> = rest.split(FIELD_SEP).collect();
        if parts.len() != 4 {
            return Err(KeyError::Malformed {
                expected: 4,
                found: parts.len(),
            });
        }
        return Ok(PropKey::Edge {
            edge: EdgeRef {
                from: parts[0].to_owned(),
                to: parts[1].to_owned(),
                label: parts[2].to_owned(),
            },
            prop: parts[3].to_owned(),
        });
    }
    let parts: Vec<&str> = key.split(FIELD_SEP).collect();
    if parts.len() != 2 {
        return Err(KeyError::Malformed {
            expected: 2,
            found: parts.len(),
        });
    }
    Ok(PropKey::Node {
        node: parts[0].to_owned(),
        prop: parts[1].to_owned(),
    })
}

/// For an edge-property key, the encoded key of the owning edge.
///
/// # Errors
///
/// Returns [`KeyError::Malformed`] when the key is not an edge-property key.
pub fn owning_edge_key(prop_key: &str) -> Result<String, KeyError> {
    match decode_prop_key(prop_key)? {
        PropKey::Edge { edge, .. } => edge_key(&edge.from, &edge.to, &edge.label),
        PropKey::Node { .. } => Err(KeyError::Malformed {
            expected: 4,
            found: 2,
        }),
    }
}

/// Validate a bare user string (node id, label, property name).
///
/// # Errors
///
/// Returns [`KeyError::ReservedByte`] when the string contains a reserved
/// byte.
pub fn check_user_string(field: &'static str, value: &str) -> Result<(), KeyError> {
    check(field, value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
