//! Cache Manager: the current bucket and its manifest.
//!
//! Owns the bucket named by the current version tag. `initialize` fills it
//! from the static asset manifest (all or nothing), `reap` deletes every
//! other bucket, `read`/`write` serve the interceptor.

use url::Url;
use waystation_core::cache::hash::compute_cache_key;
use waystation_core::{AppConfig, CacheDb, CachedEntry, Error, FetchRequest, FetchResponse, Method};

use crate::fetch::{Network, resolve};

pub struct CacheManager {
    db: CacheDb,
    bucket: String,
    origin: Url,
    manifest: Vec<String>,
}

impl CacheManager {
    pub fn new(db: CacheDb, bucket: impl Into<String>, origin: Url, manifest: Vec<String>) -> Self {
        Self { db, bucket: bucket.into(), origin, manifest }
    }

    pub fn from_config(db: CacheDb, config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self::new(db, config.bucket_name(), origin, config.static_assets.clone()))
    }

    /// Name of the current bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Resolve a request URL against the app origin.
    pub fn resolve(&self, url: &str) -> Result<Url, Error> {
        resolve(&self.origin, url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))
    }

    /// Open the current bucket and store every manifest entry.
    ///
    /// Every entry is fetched before anything is written, and the writes
    /// share one transaction: any network error or non-2xx status fails the
    /// install and leaves the bucket untouched.
    pub async fn initialize(&self, network: &dyn Network) -> Result<usize, Error> {
        self.db.open_bucket(&self.bucket).await?;

        let mut entries = Vec::with_capacity(self.manifest.len());
        for path in &self.manifest {
            let url = self.resolve(path)?;
            let request = FetchRequest::get(url.as_str());
            let response = network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{path}: {e}")))?;
            if !response.ok() {
                return Err(Error::InstallFailed(format!("{path}: status {}", response.status)));
            }
            entries.push(CachedEntry::new(Method::Get, url.as_str(), response));
        }

        let stored = self.db.put_entries(&self.bucket, &entries).await?;
        tracing::info!(bucket = %self.bucket, stored, "cached static assets");
        Ok(stored)
    }

    /// Delete every bucket whose name is not the current one.
    ///
    /// Returns the deleted names. Safe to call repeatedly.
    pub async fn reap(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.bucket_names().await? {
            if name == self.bucket {
                continue;
            }
            if self.db.delete_bucket(&name).await? {
                tracing::info!(bucket = %name, "deleted old cache bucket");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Stored response for a GET request, or `None` on a miss.
    pub async fn read(&self, request: &FetchRequest) -> Result<Option<FetchResponse>, Error> {
        if request.method != Method::Get {
            return Ok(None);
        }
        self.read_url(&request.url).await
    }

    /// Stored response for `GET url`.
    pub async fn read_url(&self, url: &str) -> Result<Option<FetchResponse>, Error> {
        let entry = self.entry(url).await?;
        Ok(entry.map(|entry| entry.response))
    }

    /// Full stored entry for `GET url`, recording the hit.
    pub async fn entry(&self, url: &str) -> Result<Option<CachedEntry>, Error> {
        let key = self.key(url)?;
        self.db.match_entry(&self.bucket, &key).await
    }

    /// Stored entry for `GET url`, leaving its hit count and LRU position alone.
    pub async fn peek(&self, url: &str) -> Result<Option<CachedEntry>, Error> {
        let key = self.key(url)?;
        self.db.peek_entry(&self.bucket, &key).await
    }

    /// Cache key of `GET url` after resolving it against the origin.
    pub fn key(&self, url: &str) -> Result<String, Error> {
        let url = self.resolve(url)?;
        Ok(compute_cache_key(Method::Get.as_str(), url.as_str()))
    }

    /// Store a copy of `response` for `request`.
    ///
    /// Only GET requests answered with status 200 are stored; returns
    /// whether anything was written. Overwrites the previous entry.
    pub async fn write(&self, request: &FetchRequest, response: &FetchResponse) -> Result<bool, Error> {
        if request.method != Method::Get || response.status != 200 {
            return Ok(false);
        }
        let url = self.resolve(&request.url)?;
        self.db.open_bucket(&self.bucket).await?;
        self.db
            .put_entry(&self.bucket, &CachedEntry::new(Method::Get, url.as_str(), response.clone()))
            .await?;
        Ok(true)
    }
}
