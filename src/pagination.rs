use serde::Serialize;

/// Pagination metadata returned alongside a page of records.
///
/// Carries the filter arguments the page was computed with so callers can
/// build prev/next links without re-deriving the query.
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMetadata<F: Serialize> {
    pub current_page: u64,
    pub total_pages: u64,
    pub per_page: u64,
    pub total_items: u64,
    pub filters: F,
}

/// A page of records plus its pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T: Serialize, F: Serialize> {
    pub pagination_metadata: PaginationMetadata<F>,
    pub records: Vec<T>,
}

pub fn make_pagination_metadata<F: Serialize>(
    current_page: u64,
    total_pages: u64,
    per_page: u64,
    total_items: u64,
    filters: F,
) -> PaginationMetadata<F> {
    PaginationMetadata {
        current_page,
        total_pages,
        per_page,
        total_items,
        filters,
    }
}
