//! Document identity and per-connection capability mode.

/// Prefix that marks a document id as ephemeral.
///
/// Ephemeral documents skip remote authentication and grant every
/// connecting client [`Mode::Edit`].
const TMP_PREFIX: &str = "tmp-";

/// How a document id should be treated by the connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFlavor {
    /// `"tmp-…"` id: no remote auth, every client is granted `edit`, and a
    /// shorter TTL refresh window is used.
    Ephemeral,
    /// Any other id: requires a successful remote authentication call.
    Permanent,
}

/// Classifies a document id by its prefix.
#[must_use]
pub fn classify(document_id: &str) -> DocumentFlavor {
    if document_id.starts_with(TMP_PREFIX) {
        DocumentFlavor::Ephemeral
    } else {
        DocumentFlavor::Permanent
    }
}

/// Per-connection capability tag, attached to a [`crate::client`](super) and
/// echoed back in the connect acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Edit,
    ViewOnly,
}

impl Mode {
    /// Parses the `mode` field returned by the auth API.
    ///
    /// Unrecognized values fall back to `view_only`: authorization beyond
    /// transport gating is out of scope for the core, so an unexpected mode
    /// string should never grant more capability than intended.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "edit" => Mode::Edit,
            _ => Mode::ViewOnly,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Edit => "edit",
            Mode::ViewOnly => "view_only",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_tmp_prefix_is_ephemeral() {
        assert_eq!(classify("tmp-abc123"), DocumentFlavor::Ephemeral);
    }

    #[test]
    fn classify_plain_uuid_is_permanent() {
        assert_eq!(
            classify("8f14e45f-ceea-467e-9a99-f4f8f1c6e6a3"),
            DocumentFlavor::Permanent
        );
    }

    #[test]
    fn classify_empty_string_is_permanent() {
        assert_eq!(classify(""), DocumentFlavor::Permanent);
    }

    #[test]
    fn mode_parse_recognizes_edit() {
        assert_eq!(Mode::parse("edit"), Mode::Edit);
    }

    #[test]
    fn mode_parse_falls_back_to_view_only() {
        assert_eq!(Mode::parse("view_only"), Mode::ViewOnly);
        assert_eq!(Mode::parse("garbage"), Mode::ViewOnly);
    }

    #[test]
    fn mode_as_str_round_trips_parse() {
        assert_eq!(Mode::parse(Mode::Edit.as_str()), Mode::Edit);
        assert_eq!(Mode::parse(Mode::ViewOnly.as_str()), Mode::ViewOnly);
    }
}
