//! Composite filter specification.
//!
//! A conjunction over four dimensions: container set, level set, search
//! terms, and field equality constraints. Empty dimensions match everything;
//! every non-empty dimension must be satisfied.

use std::collections::HashSet;

use crate::store::message::StoredMessage;

/// Special level token matching entries with no parsed level.
pub const LEVEL_NONE: &str = "NONE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Container ids (short form). Empty = all containers.
    pub containers: HashSet<String>,
    /// Level short codes, upper-cased; may contain [`LEVEL_NONE`].
    /// Empty = all levels.
    pub levels: HashSet<String>,
    /// Case-insensitive substrings, all of which must match somewhere in the
    /// message, the raw text, or any field name or value. Stored lower-cased.
    pub search_terms: Vec<String>,
    /// `(name, value)` equality constraints, all of which must match.
    pub field_filters: Vec<(String, String)>,
}

impl FilterSpec {
    /// The match-everything filter.
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn with_containers<I: IntoIterator<Item = String>>(mut self, ids: I) -> Self {
        self.containers = ids.into_iter().collect();
        self
    }

    pub fn with_levels<I: IntoIterator<Item = String>>(mut self, levels: I) -> Self {
        self.levels = levels.into_iter().map(|l| l.to_uppercase()).collect();
        self
    }

    /// Whitespace-split a free-form query into AND search terms.
    pub fn with_search_query(mut self, query: &str) -> Self {
        self.search_terms = query.split_whitespace().map(str::to_lowercase).collect();
        self
    }

    pub fn with_field_filters<I: IntoIterator<Item = (String, String)>>(mut self, filters: I) -> Self {
        self.field_filters = filters.into_iter().collect();
        self
    }

    /// True when every non-empty dimension accepts the message.
    pub fn is_match(&self, msg: &StoredMessage) -> bool {
        if !self.containers.is_empty() && !self.containers.contains(&msg.container_id) {
            return false;
        }
        if !self.levels.is_empty() && !self.level_matches(msg.level_code()) {
            return false;
        }
        for (name, value) in &self.field_filters {
            if msg.fields.get(name) != Some(value) {
                return false;
            }
        }
        for term in &self.search_terms {
            if !search_term_matches(msg, term) {
                return false;
            }
        }
        true
    }

    fn level_matches(&self, code: &str) -> bool {
        if code.is_empty() {
            self.levels.contains(LEVEL_NONE)
        } else {
            self.levels.contains(&code.to_uppercase())
        }
    }
}

/// A single lower-cased term against message, raw, and all field names and
/// values. (`_raw` is itself a field, so raw text is covered by the field
/// scan.)
fn search_term_matches(msg: &StoredMessage, term: &str) -> bool {
    if msg.message().to_lowercase().contains(term) {
        return true;
    }
    msg.fields.iter().any(|(name, value)| {
        name.to_lowercase().contains(term) || value.to_lowercase().contains(term)
    })
}
