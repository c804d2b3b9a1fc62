use serde::Serialize;

use crate::validation::{in_list, Validator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= 10_000_000, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= 100, "page_size", "must be a maximum of 100");
        v.check(in_list(&self.sort, self.sort_safelist), "sort", "invalid sort value");
    }

    /// Column name without the descending marker. Only call after
    /// [`Filters::validate`] accepted the sort value.
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn limit(&self) -> usize {
        self.page_size.max(0) as usize
    }

    pub fn offset(&self) -> usize {
        ((self.page.max(1) - 1) * self.page_size.max(0)) as usize
    }
}

/// Pagination details returned next to a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFELIST: &[&str] = &["id", "title", "-id", "-title"];

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safelist: SAFELIST,
        }
    }

    #[test]
    fn test_valid_filters() {
        let mut v = Validator::new();
        filters(1, 20, "-title").validate(&mut v);
        assert!(v.valid());
    }

    #[test]
    fn test_invalid_filters() {
        let mut v = Validator::new();
        filters(0, 101, "rating").validate(&mut v);
        assert!(v.errors().contains_key("page"));
        assert!(v.errors().contains_key("page_size"));
        assert!(v.errors().contains_key("sort"));
    }

    #[test]
    fn test_sort_direction() {
        let f = filters(1, 20, "-title");
        assert_eq!(f.sort_column(), "title");
        assert!(f.descending());
        assert!(!filters(1, 20, "id").descending());
    }

    #[test]
    fn test_offset() {
        assert_eq!(filters(3, 20, "id").offset(), 40);
        assert_eq!(filters(1, 20, "id").offset(), 0);
    }

    #[test]
    fn test_metadata() {
        let m = Metadata::calculate(45, 2, 20);
        assert_eq!(m.last_page, 3);
        assert_eq!(m.first_page, 1);
        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
    }
}
