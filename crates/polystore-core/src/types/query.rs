//! Combined filter + sort + page descriptor.

use serde::{Deserialize, Serialize};

use super::filter::Filter;
use super::pagination::PageRequest;
use super::sorting::SortField;

/// Everything `query` needs: an optional filter, sort keys in priority
/// order, and the page to return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    /// Optional filter; `None` matches every visible entity.
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Sort keys, primary first.
    #[serde(default)]
    pub sort: Vec<SortField>,
    /// Page to return.
    #[serde(default)]
    pub page: PageRequest,
}

impl QueryParameters {
    /// Start from the first page with no filter or sort.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append a sort key.
    pub fn sort_by(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    /// Select the page.
    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.page = PageRequest::new(page, page_size);
        self
    }
}
