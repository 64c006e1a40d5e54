/// Full-text search over announcements and prayers
///
/// Ranking comes from SQLite FTS5 (`bm25`); this module only sanitizes the
/// query, merges the two result sets and pages them.
use crate::db::parse_timestamp;
use crate::error::{SteepleError, SteepleResult};
use crate::org::OrgSession;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::cmp::Ordering;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 50;
/// Upper bound on rows fetched per content type
const MAX_TAKE: i64 = 100;
const SNIPPET_LENGTH: usize = 160;
const PRAYER_TITLE_LENGTH: usize = 80;

/// Characters with meaning in the match syntax, replaced by spaces
const RESERVED: &[char] = &[
    '\'', '"', '&', '|', '!', ':', '*', '?', '\\', '/', '~', '^', '<', '>', '(', ')', '[', ']',
    '{', '}', '+', '-',
];

/// Strip match-syntax characters and collapse whitespace
pub fn sanitize_query(raw: &str) -> String {
    raw.replace(RESERVED, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote every term so FTS5 treats it literally; terms are ANDed
fn match_expression(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Up to 160 characters around the first query term, with `…` where cut
pub fn build_snippet(text: &str, query: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let head = || chars.iter().take(SNIPPET_LENGTH).collect::<String>();

    let Some(term) = query.split_whitespace().next() else {
        return head();
    };

    let fold = |c: &char| c.to_lowercase().next().unwrap_or(*c);
    let haystack: Vec<char> = chars.iter().map(fold).collect();
    let needle: Vec<char> = term.chars().map(|c| fold(&c)).collect();

    let Some(index) = haystack
        .windows(needle.len())
        .position(|window| window == needle.as_slice())
    else {
        return head();
    };

    let start = index.saturating_sub(SNIPPET_LENGTH / 2);
    let end = (start + SNIPPET_LENGTH).min(chars.len());

    let mut snippet = String::new();
    if start > 0 {
        snippet.push('…');
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push('…');
    }
    snippet
}

/// Validated search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub limit: i64,
    pub offset: i64,
}

impl SearchQuery {
    pub fn new(raw: &str, limit: Option<i64>, offset: Option<i64>) -> SteepleResult<Self> {
        let text = sanitize_query(raw);
        if text.chars().count() < 2 {
            return Err(SteepleError::invalid(
                "Query must contain at least 2 characters",
            ));
        }

        Ok(Self {
            text,
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        })
    }

    /// Rows fetched per content type before merging
    fn take(&self) -> i64 {
        self.limit.saturating_add(self.offset).min(MAX_TAKE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Announcement,
    Prayer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub org_id: String,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub title: String,
    pub snippet: String,
    pub rank: f64,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMeta {
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
    pub returned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub meta: SearchMeta,
}

/// Drop zero-rank rows, order by rank then recency, and cut the page
pub fn merge_results(results: Vec<SearchResult>, query: &SearchQuery) -> SearchPage {
    let mut ranked: Vec<SearchResult> = results.into_iter().filter(|r| r.rank > 0.0).collect();

    ranked.sort_by(|a, b| {
        b.rank
            .partial_cmp(&a.rank)
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (a.published_at, b.published_at) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });

    let total = ranked.len();
    let results: Vec<SearchResult> = ranked
        .into_iter()
        .skip(query.offset as usize)
        .take(query.limit as usize)
        .collect();

    SearchPage {
        meta: SearchMeta {
            total,
            limit: query.limit,
            offset: query.offset,
            returned: results.len(),
        },
        results,
    }
}

#[derive(Clone)]
pub struct SearchService {
    db: SqlitePool,
}

impl SearchService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Search visible content in the session's org
    pub async fn search(&self, session: &OrgSession, query: &SearchQuery) -> SteepleResult<SearchPage> {
        let expression = match_expression(&query.text);

        let (announcements, prayers) = tokio::try_join!(
            self.search_announcements(&session.org_id, &expression, query),
            self.search_prayers(&session.org_id, &expression, query),
        )?;

        let mut combined = announcements;
        combined.extend(prayers);
        Ok(merge_results(combined, query))
    }

    async fn search_announcements(
        &self,
        org_id: &str,
        expression: &str,
        query: &SearchQuery,
    ) -> SteepleResult<Vec<SearchResult>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.org_id, a.title, a.body, a.published_at, -bm25(announcements_fts) AS relevance
            FROM announcements_fts
            JOIN announcements a ON a.rowid = announcements_fts.rowid
            WHERE announcements_fts MATCH ?
              AND a.org_id = ?
              AND a.hidden_at IS NULL
            ORDER BY relevance DESC
            LIMIT ?
            "#,
        )
        .bind(expression)
        .bind(org_id)
        .bind(query.take())
        .fetch_all(&self.db)
        .await
        .map_err(|e| search_failed("announcements.search", "Failed to search announcements", e))?;

        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                Ok(SearchResult {
                    id: row.get("id"),
                    org_id: row.get("org_id"),
                    result_type: ResultType::Announcement,
                    title: row.get("title"),
                    snippet: build_snippet(&body, &query.text),
                    rank: row.get("relevance"),
                    published_at: optional_timestamp(&row, "published_at")?,
                })
            })
            .collect()
    }

    async fn search_prayers(
        &self,
        org_id: &str,
        expression: &str,
        query: &SearchQuery,
    ) -> SteepleResult<Vec<SearchResult>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.org_id, p.body, p.created_at, -bm25(prayers_fts) AS relevance
            FROM prayers_fts
            JOIN prayers p ON p.rowid = prayers_fts.rowid
            WHERE prayers_fts MATCH ?
              AND p.org_id = ?
              AND p.hidden_at IS NULL
            ORDER BY relevance DESC
            LIMIT ?
            "#,
        )
        .bind(expression)
        .bind(org_id)
        .bind(query.take())
        .fetch_all(&self.db)
        .await
        .map_err(|e| search_failed("prayers.search", "Failed to search prayers", e))?;

        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                Ok(SearchResult {
                    id: row.get("id"),
                    org_id: row.get("org_id"),
                    result_type: ResultType::Prayer,
                    title: body.chars().take(PRAYER_TITLE_LENGTH).collect(),
                    snippet: build_snippet(&body, &query.text),
                    rank: row.get("relevance"),
                    published_at: optional_timestamp(&row, "created_at")?,
                })
            })
            .collect()
    }
}

fn search_failed(operation: &'static str, message: &str, err: sqlx::Error) -> SteepleError {
    tracing::error!(operation, error = %err, "search query failed");
    SteepleError::Storage(message.to_string())
}

fn optional_timestamp(row: &SqliteRow, column: &str) -> SteepleResult<Option<DateTime<Utc>>> {
    row.get::<Option<String>, _>(column)
        .as_deref()
        .map(parse_timestamp)
        .transpose()
}
