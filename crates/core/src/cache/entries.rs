//! Cached response entries.
//!
//! Entries belong to a bucket and are keyed by [`compute_cache_key`] over
//! the request method and canonical URL. Writes use UPSERT semantics, so
//! the last write for a key wins.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use crate::http::{FetchResponse, Method};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response together with the request identity it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CachedEntry {
    pub key_hash: String,
    pub method: Method,
    pub url: String,
    pub stored_at: String,
    pub hit_count: i64,
    pub last_hit_at: Option<String>,
    pub response: FetchResponse,
}

impl CachedEntry {
    /// Build a fresh entry for `method url`, stamped now.
    pub fn new(method: Method, url: impl Into<String>, response: FetchResponse) -> Self {
        let url = url.into();
        Self {
            key_hash: compute_cache_key(method.as_str(), &url),
            method,
            url,
            stored_at: chrono::Utc::now().to_rfc3339(),
            hit_count: 0,
            last_hit_at: None,
            response,
        }
    }
}

/// Row shape as stored; decoded into [`CachedEntry`] outside the SQL closure.
struct RawEntry {
    key_hash: String,
    method: String,
    url: String,
    status: u16,
    status_text: String,
    response_type: String,
    headers_json: String,
    body: Vec<u8>,
    response_url: String,
    redirected: bool,
    stored_at: String,
    hit_count: i64,
    last_hit_at: Option<String>,
}

impl TryFrom<RawEntry> for CachedEntry {
    type Error = Error;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        let method: Method = raw.method.parse().map_err(Error::CorruptEntry)?;
        let response_type = raw.response_type.parse().map_err(Error::CorruptEntry)?;
        let headers: BTreeMap<String, String> =
            serde_json::from_str(&raw.headers_json).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;

        Ok(CachedEntry {
            key_hash: raw.key_hash,
            method,
            url: raw.url,
            stored_at: raw.stored_at,
            hit_count: raw.hit_count,
            last_hit_at: raw.last_hit_at,
            response: FetchResponse {
                status: raw.status,
                status_text: raw.status_text,
                headers,
                body: raw.body,
                response_type,
                url: raw.response_url,
                redirected: raw.redirected,
            },
        })
    }
}

const SELECT_COLUMNS: &str = "key_hash, method, url, status, status_text, response_type, headers_json,
     body, response_url, redirected, stored_at, hit_count, last_hit_at";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        key_hash: row.get(0)?,
        method: row.get(1)?,
        url: row.get(2)?,
        status: row.get(3)?,
        status_text: row.get(4)?,
        response_type: row.get(5)?,
        headers_json: row.get(6)?,
        body: row.get(7)?,
        response_url: row.get(8)?,
        redirected: row.get::<_, i32>(9)? == 1,
        stored_at: row.get(10)?,
        hit_count: row.get(11)?,
        last_hit_at: row.get(12)?,
    })
}

fn upsert(conn: &rusqlite::Connection, bucket: &str, entry: &CachedEntry, headers_json: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO entries (
            bucket, key_hash, method, url, status, status_text, response_type,
            headers_json, body, response_url, redirected, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(bucket, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            status_text = excluded.status_text,
            response_type = excluded.response_type,
            headers_json = excluded.headers_json,
            body = excluded.body,
            response_url = excluded.response_url,
            redirected = excluded.redirected,
            stored_at = excluded.stored_at",
        params![
            bucket,
            &entry.key_hash,
            entry.method.as_str(),
            &entry.url,
            entry.response.status,
            &entry.response.status_text,
            entry.response.response_type.as_str(),
            headers_json,
            &entry.response.body,
            &entry.response.url,
            entry.response.redirected as i32,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn encode_headers(entry: &CachedEntry) -> Result<String, Error> {
    serde_json::to_string(&entry.response.headers).map_err(|e| Error::InvalidInput(format!("headers: {e}")))
}

/// Escape `LIKE` wildcards so `pattern` matches literally.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl CacheDb {
    /// Insert or replace an entry in `bucket`.
    ///
    /// The bucket must already exist.
    pub async fn put_entry(&self, bucket: &str, entry: &CachedEntry) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let entry = entry.clone();
        let headers_json = encode_headers(&entry)?;
        self.conn
            .call(move |conn| -> Result<(), Error> { upsert(conn, &bucket, &entry, &headers_json) })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace several entries atomically.
    ///
    /// Either every entry is written or none is.
    pub async fn put_entries(&self, bucket: &str, entries: &[CachedEntry]) -> Result<usize, Error> {
        let bucket = bucket.to_string();
        let encoded = entries
            .iter()
            .map(|entry| Ok((entry.clone(), encode_headers(entry)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                for (entry, headers_json) in &encoded {
                    upsert(&tx, &bucket, entry, headers_json)?;
                }
                tx.commit()?;
                Ok(encoded.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up an entry by key, recording the hit.
    ///
    /// Returns None if the key isn't stored in `bucket`.
    pub async fn match_entry(&self, bucket: &str, key_hash: &str) -> Result<Option<CachedEntry>, Error> {
        let bucket = bucket.to_string();
        let key_hash = key_hash.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let touched = conn.execute(
                    "UPDATE entries SET hit_count = hit_count + 1, last_hit_at = ?3
                     WHERE bucket = ?1 AND key_hash = ?2",
                    params![bucket, key_hash, now],
                )?;
                if touched == 0 {
                    return Ok(None);
                }

                let sql = format!("SELECT {SELECT_COLUMNS} FROM entries WHERE bucket = ?1 AND key_hash = ?2");
                match conn.query_row(&sql, params![bucket, key_hash], read_row) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        raw.map(CachedEntry::try_from).transpose()
    }

    /// Look up an entry by key without recording a hit.
    pub async fn peek_entry(&self, bucket: &str, key_hash: &str) -> Result<Option<CachedEntry>, Error> {
        let bucket = bucket.to_string();
        let key_hash = key_hash.to_string();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let sql = format!("SELECT {SELECT_COLUMNS} FROM entries WHERE bucket = ?1 AND key_hash = ?2");
                match conn.query_row(&sql, params![bucket, key_hash], read_row) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        raw.map(CachedEntry::try_from).transpose()
    }

    /// Delete one entry. Returns false if it wasn't stored.
    pub async fn delete_entry(&self, bucket: &str, key_hash: &str) -> Result<bool, Error> {
        let bucket = bucket.to_string();
        let key_hash = key_hash.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE bucket = ?1 AND key_hash = ?2",
                    params![bucket, key_hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of every entry in `bucket`, in storage order.
    pub async fn entry_urls(&self, bucket: &str) -> Result<Vec<String>, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE bucket = ?1 ORDER BY stored_at ASC, url ASC")?;
                let urls = stmt
                    .query_map(params![bucket], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in `bucket`.
    pub async fn count_entries(&self, bucket: &str) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE bucket = ?1", params![bucket], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries whose URL contains `pattern` as plain text.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_entries_by_url(&self, bucket: &str, pattern: &str) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        let pattern = format!("%{}%", escape_like(pattern));
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE bucket = ?1 AND url LIKE ?2 ESCAPE '\\'",
                    params![bucket, pattern],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge least recently used entries until count <= max_entries.
    ///
    /// Entries never read count as last used when stored.
    /// Returns the number of deleted entries.
    pub async fn purge_lru_entries(&self, bucket: &str, max_entries: usize) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        let max = i64::try_from(max_entries).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE bucket = ?1", params![bucket], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE bucket = ?1 AND key_hash IN (
                        SELECT key_hash FROM entries WHERE bucket = ?1
                        ORDER BY COALESCE(last_hit_at, stored_at) ASC LIMIT ?2
                    )",
                    params![bucket, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseType;

    const BUCKET: &str = "waystation-v1";

    fn make_entry(url: &str, body: &str) -> CachedEntry {
        let response = FetchResponse::new(200, body)
            .with_type(ResponseType::Basic)
            .with_url(url)
            .with_header("content-type", "text/html");
        CachedEntry::new(Method::Get, url, response)
    }

    async fn db_with_bucket() -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_bucket(BUCKET).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = db_with_bucket().await;
        let entry = make_entry("https://app.test/index.html", "<h1>hi</h1>");

        db.put_entry(BUCKET, &entry).await.unwrap();

        let found = db.match_entry(BUCKET, &entry.key_hash).await.unwrap().unwrap();
        assert_eq!(found.url, entry.url);
        assert_eq!(found.response.status, 200);
        assert_eq!(found.response.body, b"<h1>hi</h1>".to_vec());
        assert_eq!(found.response.response_type, ResponseType::Basic);
        assert_eq!(found.response.header("content-type"), Some("text/html"));
        assert_eq!(found.hit_count, 1);
        assert!(found.last_hit_at.is_some());
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = db_with_bucket().await;
        let result = db.match_entry(BUCKET, "nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let db = db_with_bucket().await;
        db.put_entry(BUCKET, &make_entry("https://app.test/", "old")).await.unwrap();
        db.put_entry(BUCKET, &make_entry("https://app.test/", "new")).await.unwrap();

        assert_eq!(db.count_entries(BUCKET).await.unwrap(), 1);
        let key = compute_cache_key("GET", "https://app.test/");
        let found = db.match_entry(BUCKET, &key).await.unwrap().unwrap();
        assert_eq!(found.response.body_text(), "new");
    }

    #[tokio::test]
    async fn test_put_requires_bucket() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.put_entry("missing", &make_entry("https://app.test/", "x")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_put_entries_atomic() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![make_entry("https://app.test/a", "a"), make_entry("https://app.test/b", "b")];

        assert!(db.put_entries("missing", &entries).await.is_err());

        db.open_bucket(BUCKET).await.unwrap();
        assert_eq!(db.put_entries(BUCKET, &entries).await.unwrap(), 2);
        assert_eq!(db.count_entries(BUCKET).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_entries_scoped_to_bucket() {
        let db = db_with_bucket().await;
        db.open_bucket("waystation-v2").await.unwrap();
        let entry = make_entry("https://app.test/", "x");
        db.put_entry(BUCKET, &entry).await.unwrap();

        assert!(db.match_entry("waystation-v2", &entry.key_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_bucket_cascades() {
        let db = db_with_bucket().await;
        db.put_entry(BUCKET, &make_entry("https://app.test/", "x")).await.unwrap();

        db.delete_bucket(BUCKET).await.unwrap();
        db.open_bucket(BUCKET).await.unwrap();
        assert_eq!(db.count_entries(BUCKET).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = db_with_bucket().await;
        let entry = make_entry("https://app.test/", "x");
        db.put_entry(BUCKET, &entry).await.unwrap();

        assert!(db.delete_entry(BUCKET, &entry.key_hash).await.unwrap());
        assert!(!db.delete_entry(BUCKET, &entry.key_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_by_url() {
        let db = db_with_bucket().await;
        db.put_entry(BUCKET, &make_entry("https://app.test/icons/icon-72x72.png", "png"))
            .await
            .unwrap();
        db.put_entry(BUCKET, &make_entry("https://app.test/index.html", "html"))
            .await
            .unwrap();

        let deleted = db.purge_entries_by_url(BUCKET, "/icons/").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.entry_urls(BUCKET).await.unwrap(), vec!["https://app.test/index.html".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_lru_keeps_recently_read() {
        let db = db_with_bucket().await;
        let first = make_entry("https://app.test/first", "1");
        let second = make_entry("https://app.test/second", "2");
        db.put_entry(BUCKET, &first).await.unwrap();
        db.put_entry(BUCKET, &second).await.unwrap();

        db.match_entry(BUCKET, &first.key_hash).await.unwrap();

        let deleted = db.purge_lru_entries(BUCKET, 1).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.match_entry(BUCKET, &first.key_hash).await.unwrap().is_some());
        assert!(db.match_entry(BUCKET, &second.key_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_peek_does_not_record_hit() {
        let db = db_with_bucket().await;
        let entry = make_entry("https://app.test/", "x");
        db.put_entry(BUCKET, &entry).await.unwrap();

        let peeked = db.peek_entry(BUCKET, &entry.key_hash).await.unwrap().unwrap();
        assert_eq!(peeked.hit_count, 0);
        assert!(peeked.last_hit_at.is_none());
        assert!(db.peek_entry(BUCKET, "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_by_url_is_literal() {
        let db = db_with_bucket().await;
        db.put_entry(BUCKET, &make_entry("https://app.test/report_2024.csv", "a"))
            .await
            .unwrap();
        db.put_entry(BUCKET, &make_entry("https://app.test/reportX2024.csv", "b"))
            .await
            .unwrap();
        db.put_entry(BUCKET, &make_entry("https://app.test/index.html", "c"))
            .await
            .unwrap();

        assert_eq!(db.purge_entries_by_url(BUCKET, "%").await.unwrap(), 0);
        assert_eq!(db.purge_entries_by_url(BUCKET, "report_2024").await.unwrap(), 1);
        assert_eq!(db.count_entries(BUCKET).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_lru_huge_limit() {
        let db = db_with_bucket().await;
        db.put_entry(BUCKET, &make_entry("https://app.test/", "x")).await.unwrap();
        assert_eq!(db.purge_lru_entries(BUCKET, usize::MAX).await.unwrap(), 0);
        assert_eq!(db.count_entries(BUCKET).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_lru_under_limit() {
        let db = db_with_bucket().await;
        db.put_entry(BUCKET, &make_entry("https://app.test/", "x")).await.unwrap();
        assert_eq!(db.purge_lru_entries(BUCKET, 10).await.unwrap(), 0);
    }
}
