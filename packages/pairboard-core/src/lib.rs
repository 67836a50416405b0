//! Pairboard core -- document identity, operation-message wire shapes, and
//! the pure `insert_value` change-application law shared by the relay
//! server and its tests.

pub mod document;
pub mod message;

pub use document::{classify, DocumentFlavor, Mode};
pub use message::{apply_changes, operation_names, Change, ChangeError, InsertValue};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
