//! Operator-based search query parsing.
//!
//! Mailbox-style queries mix free text with `keyword:value` operators, e.g.
//! `from:alice in:inbox is:unread quarterly report`. Operator tokens are
//! stripped from the text whether or not they are recognized; values that do
//! not parse (unknown flags, bad dates) are dropped silently so a typo
//! degrades to a broader search instead of an error.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use regex::Regex;

use crate::emails::{read_email, CachedEmail, EmailStore, EMAIL_COLUMNS};
use crate::Result;

/// Default result limit for advanced search.
const DEFAULT_SEARCH_LIMIT: i64 = 50;

/// Matches `keyword:value` with an optionally quoted value.
#[allow(clippy::unwrap_used)]
static OPERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+):("[^"]+"|\S+)"#).unwrap());

/// Absolute date formats accepted by `after:` / `before:`.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%b %d, %Y", "%B %d, %Y"];

/// A search string decomposed into free text and structured predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free-text portion, matched through the FTS index.
    pub text: String,
    /// Sender name or address substring.
    pub from: Option<String>,
    /// Recipient substring.
    pub to: Option<String>,
    /// Subject substring.
    pub subject: Option<String>,
    /// Require attachments.
    pub has_attachment: Option<bool>,
    /// Require (or exclude) unread.
    pub is_unread: Option<bool>,
    /// Require starred.
    pub is_starred: Option<bool>,
    /// Lower date bound, inclusive.
    pub after: Option<DateTime<Utc>>,
    /// Upper date bound, exclusive.
    pub before: Option<DateTime<Utc>>,
    /// Folder id.
    pub folder: Option<String>,
}

/// Parses a search string into free text and operators.
///
/// Supported operators: `from:`, `to:`, `subject:`, `has:attachment`,
/// `is:unread`, `is:read`, `is:starred`, `after:`, `before:`, `in:`.
#[must_use]
pub fn parse_query(input: &str) -> SearchQuery {
    let mut query = SearchQuery::default();
    let mut remaining = input.to_string();

    for captures in OPERATOR_RE.captures_iter(input) {
        let operator = captures[1].to_lowercase();
        let value = captures[2].trim_matches('"');

        match operator.as_str() {
            "from" => query.from = Some(value.to_string()),
            "to" => query.to = Some(value.to_string()),
            "subject" => query.subject = Some(value.to_string()),
            "has" => {
                if value.eq_ignore_ascii_case("attachment")
                    || value.eq_ignore_ascii_case("attachments")
                {
                    query.has_attachment = Some(true);
                }
            }
            "is" => match value.to_lowercase().as_str() {
                "unread" => query.is_unread = Some(true),
                "read" => query.is_unread = Some(false),
                "starred" => query.is_starred = Some(true),
                _ => {}
            },
            "after" => query.after = parse_date(value),
            "before" => query.before = parse_date(value),
            "in" => query.folder = Some(value.to_string()),
            _ => {}
        }

        remaining = remaining.replacen(&captures[0], "", 1);
    }

    query.text = remaining.split_whitespace().collect::<Vec<_>>().join(" ");
    query
}

/// Parses an absolute or relative date operand. `None` when unrecognized.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    let value = value.to_lowercase();
    let now = Utc::now();
    let midnight = |date: NaiveDate| Some(date.and_hms_opt(0, 0, 0)?.and_utc());

    match value.as_str() {
        "today" => return midnight(now.date_naive()),
        "yesterday" => return midnight(now.date_naive().pred_opt()?),
        "week" | "thisweek" | "this-week" => {
            let weekday = now.weekday().num_days_from_sunday();
            return Some(now - Duration::days(i64::from(weekday)));
        }
        "month" | "thismonth" | "this-month" => {
            return midnight(now.date_naive().with_day(1)?);
        }
        _ => {}
    }

    // Split on the last character, not the last byte, so a multibyte
    // operand degrades to None instead of panicking.
    let mut chars = value.chars();
    let unit = chars.next_back()?;
    let amount: u32 = chars.as_str().parse().ok()?;
    match unit {
        'd' => Some(now - Duration::days(i64::from(amount))),
        'w' => Some(now - Duration::days(i64::from(amount) * 7)),
        'm' => now.checked_sub_months(Months::new(amount)),
        _ => None,
    }
}

impl EmailStore {
    /// Parses an operator query and runs it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search_advanced(&self, input: &str, limit: i64) -> Result<Vec<CachedEmail>> {
        self.search_with_query(&parse_query(input), limit).await
    }

    /// Runs a parsed query: free text through the FTS index, structured
    /// predicates as SQL filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search_with_query(
        &self,
        query: &SearchQuery,
        limit: i64,
    ) -> Result<Vec<CachedEmail>> {
        let limit = if limit <= 0 { DEFAULT_SEARCH_LIMIT } else { limit };

        let mut conditions: Vec<&str> = Vec::new();
        let mut text_args: Vec<String> = Vec::new();
        let mut date_args: Vec<i64> = Vec::new();

        if !query.text.is_empty() {
            conditions
                .push("rowid IN (SELECT rowid FROM emails_fts WHERE emails_fts MATCH ?)");
            text_args.push(query.text.clone());
        }
        if let Some(subject) = &query.subject {
            conditions.push("subject LIKE ?");
            text_args.push(format!("%{subject}%"));
        }
        if let Some(from) = &query.from {
            conditions.push("(from_email LIKE ? OR from_name LIKE ?)");
            text_args.push(format!("%{from}%"));
            text_args.push(format!("%{from}%"));
        }
        if let Some(to) = &query.to {
            conditions.push("to_json LIKE ?");
            text_args.push(format!("%{to}%"));
        }
        if query.has_attachment == Some(true) {
            conditions.push("has_attachments = 1");
        }
        match query.is_unread {
            Some(true) => conditions.push("unread = 1"),
            Some(false) => conditions.push("unread = 0"),
            None => {}
        }
        if query.is_starred == Some(true) {
            conditions.push("starred = 1");
        }
        if let Some(after) = query.after {
            conditions.push("date >= ?");
            date_args.push(after.timestamp());
        }
        if let Some(before) = query.before {
            conditions.push("date < ?");
            date_args.push(before.timestamp());
        }
        if query.folder.is_some() {
            conditions.push("folder_id = ?");
        }

        let mut sql = format!("SELECT {EMAIL_COLUMNS} FROM emails");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY date DESC LIMIT ?");

        // Bind order mirrors condition order: text-valued filters, then the
        // date bounds, then the folder equality.
        let mut db_query = sqlx::query(&sql);
        for arg in &text_args {
            db_query = db_query.bind(arg);
        }
        for arg in &date_args {
            db_query = db_query.bind(arg);
        }
        if let Some(folder) = &query.folder {
            db_query = db_query.bind(folder);
        }
        db_query = db_query.bind(limit);

        let rows = db_query.fetch_all(self.pool()).await?;
        rows.iter().map(read_email).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_operators_and_free_text() {
        let query = parse_query("from:alice in:inbox is:unread important");
        assert_eq!(query.from.as_deref(), Some("alice"));
        assert_eq!(query.folder.as_deref(), Some("inbox"));
        assert_eq!(query.is_unread, Some(true));
        assert_eq!(query.text, "important");
        assert!(query.after.is_none());
    }

    #[test]
    fn quoted_values_keep_spaces() {
        let query = parse_query(r#"subject:"status update" budget"#);
        assert_eq!(query.subject.as_deref(), Some("status update"));
        assert_eq!(query.text, "budget");
    }

    #[test]
    fn unknown_operators_are_stripped_silently() {
        let query = parse_query("label:misc is:snoozed hello");
        assert_eq!(query, SearchQuery {
            text: "hello".to_string(),
            ..SearchQuery::default()
        });
    }

    #[test]
    fn has_and_is_values_map_to_flags() {
        let query = parse_query("has:attachment is:read is:starred");
        assert_eq!(query.has_attachment, Some(true));
        assert_eq!(query.is_unread, Some(false));
        assert_eq!(query.is_starred, Some(true));
        assert!(query.text.is_empty());
    }

    #[test]
    fn absolute_dates_parse_in_every_format() {
        for value in ["2024-03-05", "2024/03/05", "03/05/2024", "Mar 5, 2024", "March 5, 2024"] {
            let parsed = parse_date(value).unwrap();
            assert_eq!(parsed.date_naive().to_string(), "2024-03-05", "{value}");
        }
        assert!(parse_date("someday").is_none());
    }

    #[test]
    fn relative_dates_are_in_the_past() {
        let now = Utc::now();
        for value in ["today", "yesterday", "week", "month", "3d", "2w", "1m"] {
            let parsed = parse_date(value).unwrap();
            assert!(parsed <= now, "{value} resolved to the future");
        }
        assert!(parse_date("3y").is_none());
    }

    #[test]
    fn multibyte_date_operands_degrade_to_none() {
        assert!(parse_date("café").is_none());
        assert!(parse_date("日").is_none());

        let query = parse_query("after:café hello");
        assert!(query.after.is_none());
        assert_eq!(query.text, "hello");
    }

    #[tokio::test]
    async fn structured_search_filters_rows() {
        use sqlx::sqlite::SqlitePoolOptions;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::schema::init_schema(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO emails (id, folder_id, subject, from_email, date, unread, cached_at)
             VALUES
             ('e1', 'inbox', 'quarterly numbers', 'alice@example.com', 200, 1, 1),
             ('e2', 'inbox', 'lunch plans', 'bob@example.com', 100, 0, 1),
             ('e3', 'archive', 'quarterly recap', 'alice@example.com', 300, 1, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = EmailStore::new(pool);
        let hits = store
            .search_advanced("from:alice in:inbox quarterly", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");

        // Newest first when multiple match.
        let hits = store.search_advanced("from:alice", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "e3");

        let unread = store.search_advanced("is:read", 10).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "e2");
    }
}
