//! Listing scopes — the unit of caching and invalidation.

use std::fmt;

/// One listing request the catalog can answer.
///
/// A scope is both a request ("list the categories of IT") and a cache
/// identity: two scopes with equal values always name the same listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListingScope {
    /// Top-level field names under the root prefix.
    Fields,
    /// Category names under one field.
    CategoriesOf { field: String },
    /// File entries under one field/category pair.
    FilesOf { field: String, category: String },
}

impl ListingScope {
    pub fn categories_of(field: impl Into<String>) -> Self {
        Self::CategoriesOf {
            field: field.into(),
        }
    }

    pub fn files_of(field: impl Into<String>, category: impl Into<String>) -> Self {
        Self::FilesOf {
            field: field.into(),
            category: category.into(),
        }
    }

    /// Stable identity string used as the cache map key.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Fields => "fields".to_string(),
            Self::CategoriesOf { field } => format!("categories:{}", field),
            Self::FilesOf { field, category } => format!("files:{}/{}", field, category),
        }
    }

    /// The field this scope is nested under, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Fields => None,
            Self::CategoriesOf { field } | Self::FilesOf { field, .. } => Some(field),
        }
    }
}

impl fmt::Display for ListingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}
