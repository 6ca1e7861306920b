use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;
pub const DEFAULT_MAX_RELATION_ITEMS: u64 = 100;
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 16;

/// Limits applied while parsing and planning queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Ceiling for a page; larger requested limits are clamped.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
    /// Page size when the query names no limit.
    #[serde(default = "default_max_page_size")]
    pub default_page_size: u64,
    /// Bound on records materialized for one `many` relation.
    #[serde(default = "default_max_relation_items")]
    pub max_relation_items: u64,
    /// Maximum nesting of filter groups and projections.
    #[serde(default = "default_max_filter_depth")]
    pub max_filter_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            default_page_size: default_max_page_size(),
            max_relation_items: default_max_relation_items(),
            max_filter_depth: default_max_filter_depth(),
        }
    }
}

impl QueryConfig {
    /// Clamp a requested limit to `[0, max_page_size]`; absent means the
    /// default page size (itself clamped).
    #[must_use]
    pub fn page_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

fn default_max_page_size() -> u64 {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_max_relation_items() -> u64 {
    DEFAULT_MAX_RELATION_ITEMS
}

fn default_max_filter_depth() -> usize {
    DEFAULT_MAX_FILTER_DEPTH
}
