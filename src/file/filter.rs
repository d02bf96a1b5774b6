//! Typed filters and sort keys for bucket queries.
//!
//! A [`FileFilter`] is a conjunction of predicates over the `files` table.
//! It renders into a `sqlx::QueryBuilder` so every caller-supplied value is
//! bound, never spliced into SQL text.

use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

/// Field a listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    /// Content size.
    #[serde(alias = "length")]
    Size,
    /// Creation time.
    #[default]
    #[serde(alias = "uploadDate")]
    CreatedAt,
    /// Last rename/replace time; never-updated records sort by creation time.
    UpdatedAt,
}

impl SortBy {
    /// SQL expression yielding the sort key.
    pub(crate) fn expression(&self) -> &'static str {
        match self {
            SortBy::Size => "length",
            SortBy::CreatedAt => "upload_date",
            SortBy::UpdatedAt => {
                "COALESCE(CAST(json_extract(metadata, '$.updatedAt') AS TEXT), upload_date)"
            }
        }
    }
}

/// Direction applied to both the sort key and the id tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Comparison selecting rows that come after a given key in this order.
    pub(crate) fn comparator(&self) -> &'static str {
        match self {
            SortOrder::Asc => ">",
            SortOrder::Desc => "<",
        }
    }
}

/// Value of a sort key, as resolved for a cursor row.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    /// Integer key (`length`).
    Int(i64),
    /// Timestamp key, stored as fixed-precision RFC 3339 text.
    Text(String),
}

#[derive(Debug, Clone)]
enum Condition {
    Filename(String),
    Hash(String),
    ChatId(String),
    Mimetype(String),
    Search(String),
    After {
        sort_by: SortBy,
        order: SortOrder,
        value: SortValue,
        id: String,
    },
}

/// Conjunction of predicates over stored files.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    conditions: Vec<Condition>,
}

impl FileFilter {
    /// An empty filter matching every file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact filename match.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.conditions.push(Condition::Filename(filename.into()));
        self
    }

    /// Exact content hash match.
    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.conditions.push(Condition::Hash(hash.into()));
        self
    }

    /// Exact owning-chat match.
    pub fn chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.conditions.push(Condition::ChatId(chat_id.into()));
        self
    }

    /// Exact mimetype match.
    pub fn mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.conditions.push(Condition::Mimetype(mimetype.into()));
        self
    }

    /// Case-insensitive literal substring match over filename, original
    /// name and description. A blank query adds nothing.
    pub fn search(mut self, query: &str) -> Self {
        if !query.trim().is_empty() {
            self.conditions
                .push(Condition::Search(format!("%{}%", escape_like(query))));
        }
        self
    }

    /// Rows strictly after (`value`, `id`) in the given order.
    pub fn after(
        mut self,
        sort_by: SortBy,
        order: SortOrder,
        value: SortValue,
        id: impl Into<String>,
    ) -> Self {
        self.conditions.push(Condition::After {
            sort_by,
            order,
            value,
            id: id.into(),
        });
        self
    }

    /// True if no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Append a `WHERE` clause for this filter.
    pub(crate) fn push_where(&self, query: &mut QueryBuilder<'_, Sqlite>) {
        for (i, condition) in self.conditions.iter().enumerate() {
            query.push(if i == 0 { " WHERE " } else { " AND " });

            match condition {
                Condition::Filename(filename) => {
                    query.push("filename = ").push_bind(filename.clone());
                }
                Condition::Hash(hash) => {
                    query
                        .push("json_extract(metadata, '$.hash') = ")
                        .push_bind(hash.clone());
                }
                Condition::ChatId(chat_id) => {
                    query
                        .push("json_extract(metadata, '$.chatId') = ")
                        .push_bind(chat_id.clone());
                }
                Condition::Mimetype(mimetype) => {
                    query
                        .push("json_extract(metadata, '$.mimetype') = ")
                        .push_bind(mimetype.clone());
                }
                Condition::Search(pattern) => {
                    query
                        .push("(filename LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\' OR json_extract(metadata, '$.originalName') LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\' OR json_extract(metadata, '$.description') LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\')");
                }
                Condition::After {
                    sort_by,
                    order,
                    value,
                    id,
                } => {
                    let key = sort_by.expression();
                    let cmp = order.comparator();

                    query.push("(").push(key).push(" ").push(cmp).push(" ");
                    push_sort_value(query, value);
                    query.push(" OR (").push(key).push(" = ");
                    push_sort_value(query, value);
                    query
                        .push(" AND id ")
                        .push(cmp)
                        .push(" ")
                        .push_bind(id.clone())
                        .push("))");
                }
            }
        }
    }
}

fn push_sort_value(query: &mut QueryBuilder<'_, Sqlite>, value: &SortValue) {
    match value {
        SortValue::Int(v) => query.push_bind(*v),
        SortValue::Text(v) => query.push_bind(v.clone()),
    };
}

/// Escape `LIKE` wildcards so the query matches literally (escape char `\`).
pub fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(filter: &FileFilter) -> String {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM files");
        filter.push_where(&mut query);
        query.sql().to_string()
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_empty_filter_has_no_where() {
        let filter = FileFilter::new();
        assert!(filter.is_empty());
        assert_eq!(render(&filter), "SELECT id FROM files");
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = FileFilter::new().search("   ");
        assert!(filter.is_empty());
    }

    #[test]
    fn test_conditions_are_anded() {
        let filter = FileFilter::new().hash("abc").filename("a.txt");
        let sql = render(&filter);
        assert!(sql.contains(" WHERE json_extract(metadata, '$.hash') = ?"));
        assert!(sql.contains(" AND filename = ?"));
    }

    #[test]
    fn test_search_covers_three_fields() {
        let sql = render(&FileFilter::new().search("report").mimetype("text/plain"));
        assert!(sql.contains("filename LIKE ?"));
        assert!(sql.contains("'$.originalName') LIKE ?"));
        assert!(sql.contains("'$.description') LIKE ?"));
        assert!(sql.contains(" AND json_extract(metadata, '$.mimetype') = ?"));
    }

    #[test]
    fn test_after_descending_uses_less_than() {
        let filter = FileFilter::new().after(
            SortBy::Size,
            SortOrder::Desc,
            SortValue::Int(10),
            "some-id",
        );
        let sql = render(&filter);
        assert!(sql.contains("(length < ? OR (length = ? AND id < ?))"));
    }

    #[test]
    fn test_after_ascending_uses_greater_than() {
        let filter = FileFilter::new().after(
            SortBy::CreatedAt,
            SortOrder::Asc,
            SortValue::Text("2024-01-01T00:00:00.000000Z".to_string()),
            "some-id",
        );
        let sql = render(&filter);
        assert!(sql.contains("(upload_date > ? OR (upload_date = ? AND id > ?))"));
    }

    #[test]
    fn test_search_keeps_surrounding_whitespace() {
        let filter = FileFilter::new().search("report ");
        match filter.conditions.as_slice() {
            [Condition::Search(pattern)] => assert_eq!(pattern, "%report %"),
            other => panic!("unexpected conditions: {other:?}"),
        }
    }

    #[test]
    fn test_updated_at_key_is_text() {
        let filter = FileFilter::new().after(
            SortBy::UpdatedAt,
            SortOrder::Desc,
            SortValue::Text("2024-01-01T00:00:00.000000Z".to_string()),
            "some-id",
        );
        let sql = render(&filter);
        assert!(sql.contains("CAST(json_extract(metadata, '$.updatedAt') AS TEXT)"));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SortBy::default(), SortBy::CreatedAt);
        assert_eq!(SortOrder::default(), SortOrder::Desc);
    }
}
