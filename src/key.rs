//! src/key.rs
//!
//! Key codec for the flat object namespace. Every stored object lives under
//! `<root>/<field>/<category>/<filename>` and this module is the only place
//! that composes or parses that layout. Segments are stored raw (spaces and
//! unicode included); URL escaping happens at the HTTP boundary, never here.

use crate::models::scope::ListingScope;
use thiserror::Error;

/// Root prefix used when no override is configured.
pub const DEFAULT_ROOT: &str = "uploadedfiles";

/// Separator between key segments.
pub const SEPARATOR: char = '/';

/// Longest key the codec will accept, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedKey {
    #[error("key `{0}` does not start with the root prefix")]
    MissingRoot(String),
    #[error("key `{0}` has fewer than three segments under the root")]
    TooShallow(String),
    #[error("key `{0}` contains an empty field or category segment")]
    EmptySegment(String),
    #[error("key `{0}` exceeds {MAX_KEY_LEN} bytes")]
    TooLong(String),
    #[error("`{0}` is not a listing prefix")]
    NotAPrefix(String),
}

/// The three logical segments of a parsed key.
///
/// `filename` may be empty (a folder placeholder created by console uploads)
/// or contain further separators (a nested path kept verbatim under its
/// category). Listings skip placeholders; nested paths surface as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    pub field: String,
    pub category: String,
    pub filename: String,
}

impl KeyParts {
    /// True for keys that end in the separator and carry no filename.
    pub fn is_placeholder(&self) -> bool {
        self.filename.is_empty()
    }
}

/// Parses and composes object keys for one configured root prefix.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    root: String,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl KeyCodec {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Split `key` into its field, category, and filename segments.
    ///
    /// The filename keeps any further separators verbatim, so
    /// `parse` followed by [`KeyCodec::compose`] reproduces the input
    /// byte-for-byte.
    pub fn parse(&self, key: &str) -> Result<KeyParts, MalformedKey> {
        if key.len() > MAX_KEY_LEN {
            return Err(MalformedKey::TooLong(key.to_string()));
        }
        let rest = match key.strip_prefix(&self.root) {
            Some(rest) => rest,
            None => return Err(MalformedKey::MissingRoot(key.to_string())),
        };
        let rest = match rest.strip_prefix(SEPARATOR) {
            Some(rest) => rest,
            None if rest.is_empty() => return Err(MalformedKey::TooShallow(key.to_string())),
            None => return Err(MalformedKey::MissingRoot(key.to_string())),
        };

        let mut segments = rest.splitn(3, SEPARATOR);
        let field = segments.next().unwrap_or_default();
        let category = match segments.next() {
            Some(category) => category,
            None => return Err(MalformedKey::TooShallow(key.to_string())),
        };
        let filename = match segments.next() {
            Some(filename) => filename,
            None => return Err(MalformedKey::TooShallow(key.to_string())),
        };
        if field.is_empty() || category.is_empty() {
            return Err(MalformedKey::EmptySegment(key.to_string()));
        }

        Ok(KeyParts {
            field: field.to_string(),
            category: category.to_string(),
            filename: filename.to_string(),
        })
    }

    /// Build the canonical key for a file. Segments go in raw; callers are
    /// expected to have run [`sanitize_segment`] on user input first.
    pub fn compose(&self, field: &str, category: &str, filename: &str) -> String {
        format!("{}/{}/{}/{}", self.root, field, category, filename)
    }

    /// Prefix whose immediate children are the field names.
    pub fn fields_prefix(&self) -> String {
        format!("{}/", self.root)
    }

    /// Prefix whose immediate children are the categories of `field`.
    pub fn categories_prefix(&self, field: &str) -> String {
        format!("{}/{}/", self.root, field)
    }

    /// Prefix containing every file key of one category.
    pub fn files_prefix(&self, field: &str, category: &str) -> String {
        format!("{}/{}/{}/", self.root, field, category)
    }

    /// Map a listing prefix back to the scope it addresses.
    ///
    /// Accepts exactly the prefixes the three builders above produce;
    /// anything deeper or missing the trailing separator is rejected.
    pub fn classify_prefix(&self, prefix: &str) -> Result<ListingScope, MalformedKey> {
        let rest = prefix
            .strip_prefix(&self.root)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .ok_or_else(|| MalformedKey::MissingRoot(prefix.to_string()))?;
        let interior = match rest.strip_suffix(SEPARATOR) {
            Some(interior) => interior,
            None if rest.is_empty() => "",
            None => return Err(MalformedKey::NotAPrefix(prefix.to_string())),
        };
        if interior.is_empty() {
            return Ok(ListingScope::Fields);
        }

        let segments: Vec<&str> = interior.split(SEPARATOR).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(MalformedKey::EmptySegment(prefix.to_string()));
        }
        match segments.as_slice() {
            [field] => Ok(ListingScope::categories_of(*field)),
            [field, category] => Ok(ListingScope::files_of(*field, *category)),
            _ => Err(MalformedKey::NotAPrefix(prefix.to_string())),
        }
    }
}

/// Normalize one user-supplied segment before it enters a key: separators
/// become underscores and surrounding whitespace is dropped. Everything else
/// (spaces, dots, unicode) passes through untouched.
pub fn sanitize_segment(raw: &str) -> String {
    raw.replace(['/', '\\'], "_").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_well_formed_key() {
        let codec = KeyCodec::default();
        let parts = codec.parse("uploadedfiles/IT/Linux Notes/setup.pdf").unwrap();
        assert_eq!(parts.field, "IT");
        assert_eq!(parts.category, "Linux Notes");
        assert_eq!(parts.filename, "setup.pdf");
        assert!(!parts.is_placeholder());
    }

    #[test]
    fn compose_then_parse_round_trips() {
        let codec = KeyCodec::default();
        let key = codec.compose("IT", "Linux Notes", "setup.pdf");
        assert_eq!(key, "uploadedfiles/IT/Linux Notes/setup.pdf");
        let parts = codec.parse(&key).unwrap();
        assert_eq!(codec.compose(&parts.field, &parts.category, &parts.filename), key);
    }

    #[test]
    fn placeholder_key_parses_with_empty_filename() {
        let codec = KeyCodec::default();
        let parts = codec.parse("uploadedfiles/IT/Linux Notes/").unwrap();
        assert!(parts.is_placeholder());
        assert_eq!(parts.category, "Linux Notes");
    }

    #[test]
    fn nested_filename_survives_round_trip() {
        let codec = KeyCodec::default();
        let parts = codec.parse("uploadedfiles/IT/Linux Notes/slides/week1.pdf").unwrap();
        assert_eq!(parts.filename, "slides/week1.pdf");
        assert_eq!(
            codec.compose(&parts.field, &parts.category, &parts.filename),
            "uploadedfiles/IT/Linux Notes/slides/week1.pdf"
        );
    }

    #[test]
    fn rejects_key_outside_root() {
        let codec = KeyCodec::default();
        assert!(matches!(
            codec.parse("otherroot/IT/Notes/a.pdf"),
            Err(MalformedKey::MissingRoot(_))
        ));
        // Same bytes up to a point, but not the root segment.
        assert!(matches!(
            codec.parse("uploadedfilesx/IT/Notes/a.pdf"),
            Err(MalformedKey::MissingRoot(_))
        ));
    }

    #[test]
    fn rejects_shallow_keys() {
        let codec = KeyCodec::default();
        assert!(matches!(
            codec.parse("uploadedfiles"),
            Err(MalformedKey::TooShallow(_))
        ));
        assert!(matches!(
            codec.parse("uploadedfiles/IT"),
            Err(MalformedKey::TooShallow(_))
        ));
        assert!(matches!(
            codec.parse("uploadedfiles/IT/Linux Notes"),
            Err(MalformedKey::TooShallow(_))
        ));
    }

    #[test]
    fn rejects_empty_field_or_category() {
        let codec = KeyCodec::default();
        assert!(matches!(
            codec.parse("uploadedfiles//Notes/a.pdf"),
            Err(MalformedKey::EmptySegment(_))
        ));
        assert!(matches!(
            codec.parse("uploadedfiles/IT//a.pdf"),
            Err(MalformedKey::EmptySegment(_))
        ));
    }

    #[test]
    fn rejects_oversized_key() {
        let codec = KeyCodec::default();
        let key = format!("uploadedfiles/IT/Notes/{}", "x".repeat(MAX_KEY_LEN));
        assert!(matches!(codec.parse(&key), Err(MalformedKey::TooLong(_))));
    }

    #[test]
    fn classifies_listing_prefixes() {
        let codec = KeyCodec::default();
        assert_eq!(codec.classify_prefix("uploadedfiles/").unwrap(), ListingScope::Fields);
        assert_eq!(
            codec.classify_prefix("uploadedfiles/IT/").unwrap(),
            ListingScope::categories_of("IT")
        );
        assert_eq!(
            codec.classify_prefix("uploadedfiles/IT/Linux Notes/").unwrap(),
            ListingScope::files_of("IT", "Linux Notes")
        );
        assert!(codec.classify_prefix("uploadedfiles/IT").is_err());
        assert!(codec.classify_prefix("uploadedfiles/IT/a/b/").is_err());
        assert!(codec.classify_prefix("elsewhere/").is_err());
    }

    #[test]
    fn custom_root_is_respected() {
        let codec = KeyCodec::new("archive");
        assert_eq!(codec.compose("HR", "Payroll", "jan.pdf"), "archive/HR/Payroll/jan.pdf");
        assert!(codec.parse("uploadedfiles/HR/Payroll/jan.pdf").is_err());
    }

    #[test]
    fn sanitize_strips_separators_and_whitespace() {
        assert_eq!(sanitize_segment("  Linux Notes "), "Linux Notes");
        assert_eq!(sanitize_segment("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_segment("   "), "");
    }
}
