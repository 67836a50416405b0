//! Wire shape of inbound operation messages and the whitelist that gates
//! them, plus the pure `insert_value` change-application law.

use serde::{Deserialize, Serialize};

/// Whitelisted operation names, the single source of truth for what
/// [`crate::message::operation_names::WHITELIST`] allows through.
///
/// `MessageHandler::dispatch` matches against these explicitly rather than
/// looking a method up reflectively by name, so there is no way for a
/// method to exist without also being a reachable operation.
pub mod operation_names {
    pub const INSERT_VALUE: &str = "insert_value";
    pub const CREATE_SELECTION: &str = "create_selection";

    /// All operation names a client is allowed to send.
    pub const WHITELIST: &[&str] = &[INSERT_VALUE, CREATE_SELECTION];

    #[must_use]
    pub fn is_whitelisted(name: &str) -> bool {
        WHITELIST.contains(&name)
    }
}

/// A single text replacement, expressed as a half-open `[from, to)` range of
/// UTF-8 byte offsets into the stored document plus the text to insert in
/// its place. An empty `insert` is a pure delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub from: usize,
    pub to: usize,
    pub insert: String,
}

/// Body of an `insert_value` operation message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InsertValue {
    pub changes: Vec<Change>,
}

/// Reasons a change list cannot be applied to a given document body.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChangeError {
    #[error("change range [{from}, {to}) exceeds document length {len}")]
    OutOfBounds { from: usize, to: usize, len: usize },
    #[error("change range has from ({from}) > to ({to})")]
    InvertedRange { from: usize, to: usize },
    #[error("change index {index} does not fall on a UTF-8 character boundary")]
    NotCharBoundary { index: usize },
}

/// Applies `changes` to `code`, honoring the contract that `changes` is
/// ordered left-to-right over non-overlapping ranges.
///
/// Changes are applied in **reverse** order so that an earlier change's
/// indices (which were computed against the pre-edit text) remain valid
/// after later changes have already shifted the text around them: applying
/// the list in reverse over the original text is equivalent to applying it
/// left-to-right against continuously-reindexed positions.
pub fn apply_changes(code: &str, changes: &[Change]) -> Result<String, ChangeError> {
    let mut result = code.to_string();
    for change in changes.iter().rev() {
        if change.from > change.to {
            return Err(ChangeError::InvertedRange {
                from: change.from,
                to: change.to,
            });
        }
        if change.to > result.len() {
            return Err(ChangeError::OutOfBounds {
                from: change.from,
                to: change.to,
                len: result.len(),
            });
        }
        if !result.is_char_boundary(change.from) {
            return Err(ChangeError::NotCharBoundary { index: change.from });
        }
        if !result.is_char_boundary(change.to) {
            return Err(ChangeError::NotCharBoundary { index: change.to });
        }

        let mut next = String::with_capacity(result.len() - (change.to - change.from) + change.insert.len());
        next.push_str(&result[..change.from]);
        next.push_str(&change.insert);
        next.push_str(&result[change.to..]);
        result = next;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_change_replaces_range() {
        let code = "Hello dlroW";
        let changes = vec![Change {
            from: 6,
            to: 11,
            insert: "World".to_string(),
        }];
        assert_eq!(apply_changes(code, &changes).unwrap(), "Hello World");
    }

    #[test]
    fn two_changes_apply_right_to_left() {
        // The first change's insertion point (offset 5) is computed against
        // the pre-edit text and must still land correctly even though the
        // second change (offset 6..11) is applied first.
        let code = "Hello dlroW";
        let changes = vec![
            Change {
                from: 5,
                to: 5,
                insert: " Great".to_string(),
            },
            Change {
                from: 6,
                to: 11,
                insert: "World".to_string(),
            },
        ];
        assert_eq!(apply_changes(code, &changes).unwrap(), "Hello Great World");
    }

    #[test]
    fn pure_delete_with_empty_insert() {
        let code = "Hello World";
        let changes = vec![Change {
            from: 5,
            to: 11,
            insert: String::new(),
        }];
        assert_eq!(apply_changes(code, &changes).unwrap(), "Hello");
    }

    #[test]
    fn empty_changes_list_is_identity() {
        let code = "unchanged";
        assert_eq!(apply_changes(code, &[]).unwrap(), "unchanged");
    }

    #[test]
    fn rejects_inverted_range() {
        let err = apply_changes("abc", &[Change { from: 2, to: 1, insert: String::new() }]).unwrap_err();
        assert_eq!(err, ChangeError::InvertedRange { from: 2, to: 1 });
    }

    #[test]
    fn rejects_out_of_bounds_range() {
        let err = apply_changes("abc", &[Change { from: 0, to: 10, insert: String::new() }]).unwrap_err();
        assert_eq!(err, ChangeError::OutOfBounds { from: 0, to: 10, len: 3 });
    }

    #[test]
    fn rejects_non_char_boundary() {
        let code = "a\u{1F600}b"; // multi-byte emoji at offset 1..5
        let err = apply_changes(code, &[Change { from: 2, to: 3, insert: String::new() }]).unwrap_err();
        assert!(matches!(err, ChangeError::NotCharBoundary { .. }));
    }

    #[test]
    fn whitelist_contains_documented_operations() {
        assert!(operation_names::is_whitelisted("insert_value"));
        assert!(operation_names::is_whitelisted("create_selection"));
        assert!(!operation_names::is_whitelisted("delete_codespace"));
    }
}
