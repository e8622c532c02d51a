//! # Primitives
//!
//! Hardcoded runtime constants for fieldgroup.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Separator between the parts of a composite virtual field key.
///
/// - `<group>__<field>__<elementId>` for element fields
/// - `<group>__(<marker>)__<elementId>` for structural markers
pub const KEY_SEPARATOR: &str = "__";

/// Input type that marks a field schema as a group field.
pub const GROUP_INPUT_TYPE: &str = "group";

/// Element type name that is always registered for entity storage.
///
/// Elements of this type hold a declarative field map derived from the
/// group definition.
pub const DYNAMIC_ELEMENT: &str = "dynamic";

/// Association name used by referenced group entities when none is given.
pub const DEFAULT_ASSOCIATION: &str = "elements";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of ids accepted from one submitted ordering string.
///
/// Longer submissions are truncated to prevent unbounded work per request.
pub const MAX_SUBMITTED_IDS: usize = 1000;

/// Largest `min` or `max` a group definition may declare.
///
/// `max = 0` still means unbounded; this only caps the declared limits so
/// that min-filling stays bounded.
pub const MAX_ELEMENTS: usize = 200;

/// Maximum size of a serialized group blob (16 MB).
///
/// Larger blobs are rejected before decoding.
pub const MAX_BLOB_SIZE: usize = 16 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_separator_is_double_underscore() {
        assert_eq!(KEY_SEPARATOR, "__");
    }

    #[test]
    fn group_input_type_is_group() {
        assert_eq!(GROUP_INPUT_TYPE, "group");
    }
}
