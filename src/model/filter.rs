use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const MAX_PAGE: u32 = 10_000_000;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Paging and sorting parameters shared by every list endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
    pub page: u32,
    /// Zero means no limit
    pub page_size: u32,
    /// Column name, optionally prefixed with `-` for descending order
    pub sort: String,
    pub sort_safelist: Vec<&'static str>,
}

impl Filters {
    pub fn new(page: Option<u32>, page_size: Option<u32>, sort: Option<String>, safelist: &[&'static str]) -> Self {
        let sort_safelist = safelist.to_vec();
        let sort = sort
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| sort_safelist.first().map(|s| s.to_string()).unwrap_or_default());

        Self {
            page: page.unwrap_or(1),
            page_size: page_size.unwrap_or(0),
            sort,
            sort_safelist,
        }
    }

    /// Whether the requested sort key is allowed (with or without the `-` prefix)
    pub fn sort_is_safe(&self) -> bool {
        let column = self.sort.trim_start_matches('-');
        self.sort_safelist.iter().any(|safe| *safe == column)
    }

    /// Sort column, falling back to the first safelisted column
    pub fn sort_column(&self) -> &str {
        let column = self.sort.trim_start_matches('-');
        if self.sort_safelist.iter().any(|safe| *safe == column) {
            column
        } else {
            self.sort_safelist.first().copied().unwrap_or("id")
        }
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn limit(&self) -> Option<i64> {
        (self.page_size > 0).then_some(self.page_size as i64)
    }

    pub fn offset(&self) -> i64 {
        if self.page_size == 0 {
            0
        } else {
            (self.page.saturating_sub(1) as i64) * self.page_size as i64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub current_page: u32,
    pub page_size: u32,
    pub first_page: u32,
    pub last_page: u32,
    pub total_records: u64,
}

impl Metadata {
    /// Paging metadata for a result set; all zeros when nothing matched
    pub fn calculate(total_records: u64, page: u32, page_size: u32) -> Self {
        if total_records == 0 {
            return Self::default();
        }

        let last_page = if page_size == 0 {
            1
        } else {
            total_records.div_ceil(page_size as u64) as u32
        };

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page,
            total_records,
        }
    }
}

/// One page of results together with its paging metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parsing() {
        let filters = Filters::new(None, None, Some("-name".to_string()), &["id", "name"]);
        assert!(filters.sort_is_safe());
        assert_eq!(filters.sort_column(), "name");
        assert_eq!(filters.sort_direction(), SortDirection::Desc);

        let filters = Filters::new(None, None, None, &["id", "name"]);
        assert_eq!(filters.sort, "id");
        assert_eq!(filters.sort_direction(), SortDirection::Asc);

        let filters = Filters::new(None, None, Some("password".to_string()), &["id", "name"]);
        assert!(!filters.sort_is_safe());
        assert_eq!(filters.sort_column(), "id");
    }

    #[test]
    fn test_limit_and_offset() {
        let unlimited = Filters::new(Some(3), Some(0), None, &["id"]);
        assert_eq!(unlimited.limit(), None);
        assert_eq!(unlimited.offset(), 0);

        let paged = Filters::new(Some(3), Some(20), None, &["id"]);
        assert_eq!(paged.limit(), Some(20));
        assert_eq!(paged.offset(), 40);
    }

    #[test]
    fn test_metadata_calculation() {
        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());

        let metadata = Metadata::calculate(45, 2, 20);
        assert_eq!(metadata.current_page, 2);
        assert_eq!(metadata.first_page, 1);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.total_records, 45);

        let unlimited = Metadata::calculate(7, 1, 0);
        assert_eq!(unlimited.last_page, 1);
    }
}
