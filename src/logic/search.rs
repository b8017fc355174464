use std::cmp::Ordering;

use crate::model::{Filters, Metadata, Page};

/// Sort by the safelisted column (ties broken by `tie_breaker`, always ascending), then slice one page
pub fn sort_and_page<T>(
    mut items: Vec<T>,
    filters: &Filters,
    compare_column: impl Fn(&str, &T, &T) -> Ordering,
    tie_breaker: impl Fn(&T, &T) -> Ordering,
) -> Page<T> {
    let column = filters.sort_column().to_string();
    let direction = filters.sort_direction();
    items.sort_by(|a, b| {
        direction
            .apply(compare_column(&column, a, b))
            .then_with(|| tie_breaker(a, b))
    });

    let total = items.len() as u64;
    let items: Vec<T> = match filters.limit() {
        Some(limit) => items
            .into_iter()
            .skip(filters.offset() as usize)
            .take(limit as usize)
            .collect(),
        None => items,
    };
    // A page past the end reports no records, as the windowed count does in SQL
    let metadata = if items.is_empty() {
        Metadata::default()
    } else {
        Metadata::calculate(total, filters.page, filters.page_size)
    };

    Page { items, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i32,
        name: &'static str,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { id: 3, name: "beta" },
            Row { id: 1, name: "alpha" },
            Row { id: 2, name: "beta" },
            Row { id: 4, name: "gamma" },
        ]
    }

    fn compare(column: &str, a: &Row, b: &Row) -> Ordering {
        match column {
            "name" => a.name.cmp(b.name),
            _ => a.id.cmp(&b.id),
        }
    }

    #[test]
    fn test_sort_desc_with_ascending_tie_breaker() {
        let filters = Filters::new(None, None, Some("-name".to_string()), &["id", "name"]);
        let page = sort_and_page(rows(), &filters, compare, |a, b| a.id.cmp(&b.id));
        let ids: Vec<i32> = page.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 2, 3, 1]);
        assert_eq!(page.metadata.total_records, 4);
    }

    #[test]
    fn test_paging_slices_after_sorting() {
        let filters = Filters::new(Some(2), Some(3), None, &["id", "name"]);
        let page = sort_and_page(rows(), &filters, compare, |a, b| a.id.cmp(&b.id));
        assert_eq!(page.items, vec![Row { id: 4, name: "gamma" }]);
        assert_eq!(page.metadata.current_page, 2);
        assert_eq!(page.metadata.last_page, 2);
    }

    #[test]
    fn test_empty_result_has_zero_metadata() {
        let filters = Filters::new(None, Some(10), None, &["id"]);
        let page = sort_and_page(Vec::<Row>::new(), &filters, compare, |a, b| a.id.cmp(&b.id));
        assert!(page.items.is_empty());
        assert_eq!(page.metadata, Metadata::default());
    }

    #[test]
    fn test_page_past_the_end_reports_no_records() {
        let filters = Filters::new(Some(5), Some(2), None, &["id"]);
        let page = sort_and_page(rows(), &filters, compare, |a, b| a.id.cmp(&b.id));
        assert!(page.items.is_empty());
        assert_eq!(page.metadata, Metadata::default());
    }
}
