//! src/services/navigation.rs
//!
//! Drill-down navigation over the hierarchy: home (fields), one selected
//! field (categories), one selected category (files). The state machine is
//! synchronous — transitions return a ticket naming the listing the new
//! state wants, and whoever fetches it hands the result back through
//! [`Navigator::apply_listing`]. A listing that arrives after a newer
//! transition carries a stale ticket and is discarded, so a slow response
//! can never overwrite a faster, newer one.

use crate::{
    catalog::CatalogResult,
    models::scope::ListingScope,
    services::hierarchy_cache::{HierarchyCache, ScopeListing},
};
use thiserror::Error;
use tracing::debug;

/// Where the user currently is in the drill-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    Home,
    FieldSelected { field: String },
    CategorySelected { field: String, category: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavError {
    #[error("cannot select a category before a field")]
    NoFieldSelected,
}

/// One element of the breadcrumb trail: a label to render and the state
/// activating it jumps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub label: String,
    pub target: CrumbTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrumbTarget {
    Home,
    Field(String),
    Category { field: String, category: String },
}

/// Stamp for one outstanding listing request.
///
/// Issued by every transition; only the most recently issued ticket is
/// accepted back. The scope is public so the fetcher knows what to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTicket {
    seq: u64,
    pub scope: ListingScope,
}

/// The navigation state machine. Owns no I/O and no cache; callers drive
/// it and fetch listings for the tickets it issues.
#[derive(Debug)]
pub struct Navigator {
    state: NavState,
    query: String,
    seq: u64,
    visible: Option<ScopeListing>,
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            state: NavState::Home,
            query: String::new(),
            seq: 0,
            visible: None,
        }
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn selected_field(&self) -> Option<&str> {
        match &self.state {
            NavState::Home => None,
            NavState::FieldSelected { field } | NavState::CategorySelected { field, .. } => {
                Some(field)
            }
        }
    }

    pub fn selected_category(&self) -> Option<&str> {
        match &self.state {
            NavState::CategorySelected { category, .. } => Some(category),
            _ => None,
        }
    }

    /// Current search text. Scope-relative: cleared on field selection
    /// and on reset, kept when drilling from categories into one of them.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// The listing scope the current state wants shown.
    pub fn current_scope(&self) -> ListingScope {
        match &self.state {
            NavState::Home => ListingScope::Fields,
            NavState::FieldSelected { field } => ListingScope::categories_of(field.clone()),
            NavState::CategorySelected { field, category } => {
                ListingScope::files_of(field.clone(), category.clone())
            }
        }
    }

    fn issue_ticket(&mut self) -> ListingTicket {
        self.seq += 1;
        ListingTicket {
            seq: self.seq,
            scope: self.current_scope(),
        }
    }

    /// Enter a field. Valid from any state; resets the search text and
    /// replaces whatever was selected before.
    pub fn select_field(&mut self, field: impl Into<String>) -> ListingTicket {
        self.state = NavState::FieldSelected {
            field: field.into(),
        };
        self.query.clear();
        self.visible = None;
        self.issue_ticket()
    }

    /// Enter a category of the currently selected field. From
    /// `CategorySelected` this moves sideways to a sibling category.
    pub fn select_category(
        &mut self,
        category: impl Into<String>,
    ) -> Result<ListingTicket, NavError> {
        let field = match &self.state {
            NavState::FieldSelected { field } | NavState::CategorySelected { field, .. } => {
                field.clone()
            }
            NavState::Home => return Err(NavError::NoFieldSelected),
        };
        self.state = NavState::CategorySelected {
            field,
            category: category.into(),
        };
        self.visible = None;
        Ok(self.issue_ticket())
    }

    /// Back to home: no selection, no search text.
    pub fn clear(&mut self) -> ListingTicket {
        self.state = NavState::Home;
        self.query.clear();
        self.visible = None;
        self.issue_ticket()
    }

    /// Jump to the state a breadcrumb names.
    pub fn activate_crumb(&mut self, target: &CrumbTarget) -> Result<ListingTicket, NavError> {
        match target {
            CrumbTarget::Home => Ok(self.clear()),
            CrumbTarget::Field(field) => Ok(self.select_field(field.clone())),
            CrumbTarget::Category { field, category } => {
                self.state = NavState::FieldSelected {
                    field: field.clone(),
                };
                self.select_category(category.clone())
            }
        }
    }

    /// Breadcrumb trail for the current state, root first.
    pub fn breadcrumb(&self) -> Vec<Crumb> {
        let home = Crumb {
            label: "Home".to_string(),
            target: CrumbTarget::Home,
        };
        match &self.state {
            NavState::Home => vec![home],
            NavState::FieldSelected { field } => vec![
                home,
                Crumb {
                    label: field.clone(),
                    target: CrumbTarget::Field(field.clone()),
                },
            ],
            NavState::CategorySelected { field, category } => vec![
                home,
                Crumb {
                    label: field.clone(),
                    target: CrumbTarget::Field(field.clone()),
                },
                Crumb {
                    label: category.clone(),
                    target: CrumbTarget::Category {
                        field: field.clone(),
                        category: category.clone(),
                    },
                },
            ],
        }
    }

    /// Hand a fetched listing back. Returns whether it was accepted:
    /// a ticket that is no longer the newest, or whose scope no longer
    /// matches the current state, is discarded.
    pub fn apply_listing(&mut self, ticket: &ListingTicket, listing: ScopeListing) -> bool {
        if ticket.seq != self.seq || ticket.scope != self.current_scope() {
            debug!(
                "discarding stale listing for `{}` (ticket {} vs current {})",
                ticket.scope, ticket.seq, self.seq
            );
            return false;
        }
        self.visible = Some(listing);
        true
    }

    /// The listing currently on screen, if one has arrived for this state.
    pub fn visible(&self) -> Option<&ScopeListing> {
        self.visible.as_ref()
    }

    /// Fetch the current scope through the cache and apply it. Issues a
    /// fresh ticket, so any earlier outstanding one becomes stale.
    pub async fn load(&mut self, cache: &HierarchyCache) -> CatalogResult<bool> {
        let ticket = self.issue_ticket();
        let listing = cache.list_scope(&ticket.scope).await?;
        Ok(self.apply_listing(&ticket, listing))
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}
