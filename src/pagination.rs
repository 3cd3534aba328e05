//! Paging, sorting and filtering parameters shared by every listing.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw query-string parameters of a listing endpoint.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<i64>,
    pub size_per_page: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn parse(raw: Option<&str>) -> AppResult<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(SortOrder::Asc),
            Some(value) if value.eq_ignore_ascii_case("asc") => Ok(SortOrder::Asc),
            Some(value) if value.eq_ignore_ascii_case("desc") => Ok(SortOrder::Desc),
            Some(value) => Err(AppError::bad_request(format!(
                "order must be ASC or DESC, got {value}"
            ))),
        }
    }
}

/// Allow-listed sort columns of one entity, addressed by their API names.
pub trait SortField: Copy + Sized {
    const DEFAULT: Self;

    fn from_api_name(name: &str) -> Option<Self>;
}

#[derive(Debug, Clone)]
pub struct PageRequest<S> {
    pub page: i64,
    pub size: i64,
    pub sort: S,
    pub order: SortOrder,
    /// Ready-to-bind `ILIKE` pattern, `None` when no filter was given.
    pub pattern: Option<String>,
}

impl<S> PageRequest<S> {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }

    pub fn limit(&self) -> i64 {
        self.size
    }
}

impl ListParams {
    pub fn into_request<S: SortField>(self) -> AppResult<PageRequest<S>> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        if page < 1 {
            return Err(AppError::bad_request("page must be at least 1"));
        }
        let size = self.size_per_page.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(AppError::bad_request(format!(
                "sizePerPage must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if (page - 1).checked_mul(size).is_none() {
            return Err(AppError::bad_request(format!("page {page} is out of range")));
        }
        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") => S::DEFAULT,
            Some(name) => S::from_api_name(name)
                .ok_or_else(|| AppError::bad_request(format!("cannot sort by {name}")))?,
        };
        let order = SortOrder::parse(self.order.as_deref())?;

        Ok(PageRequest {
            page,
            size,
            sort,
            order,
            pattern: self.filter.as_deref().and_then(filter_pattern),
        })
    }
}

/// Turns free text into a substring `ILIKE` pattern with `%`, `_` and `\`
/// matched literally.
pub fn filter_pattern(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut pattern = String::with_capacity(trimmed.len() + 2);
    pattern.push('%');
    for ch in trimmed.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    Some(pattern)
}

/// Exact, case-insensitive `ILIKE` pattern.
pub fn exact_pattern(raw: &str) -> String {
    let mut pattern = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: i64,
    pub total_pages: i64,
    pub page: i64,
    pub size_per_page: i64,
}

impl<T> Page<T> {
    pub fn new<S>(content: Vec<T>, total_elements: i64, request: &PageRequest<S>) -> Self {
        let total_pages = if total_elements == 0 {
            0
        } else {
            (total_elements + request.size - 1) / request.size
        };
        Self {
            content,
            total_elements,
            total_pages,
            page: request.page,
            size_per_page: request.size,
        }
    }
}

/// Orders a boxed query by `$column` then by `$id` in the requested direction.
macro_rules! order_by {
    ($query:expr, $order:expr, $column:expr, $id:expr) => {
        match $order {
            $crate::pagination::SortOrder::Asc => $query.order(($column.asc(), $id.asc())),
            $crate::pagination::SortOrder::Desc => $query.order(($column.desc(), $id.desc())),
        }
    };
}

pub(crate) use order_by;
