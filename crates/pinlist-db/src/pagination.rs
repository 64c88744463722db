use pinlist_types::api::PageQuery;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// A page of rows older than a given id.
///
/// `before` is an exclusive upper bound on row ids rather than a number of
/// rows to skip, so pages already handed out never shift when new rows are
/// inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: i64,
    pub before: Option<i64>,
}

impl Window {
    pub fn new(limit: i64, offset: i64) -> Self {
        let limit = if limit <= 0 {
            DEFAULT_LIMIT
        } else {
            limit.min(MAX_LIMIT)
        };
        let before = (offset > 0).then_some(offset);
        Self { limit, before }
    }

    /// Bound to bind for `(?N = 0 OR id < ?N)` style filters.
    pub(crate) fn bound(&self) -> i64 {
        self.before.unwrap_or(0)
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl From<PageQuery> for Window {
    fn from(q: PageQuery) -> Self {
        Self::new(q.limit, q.offset)
    }
}
