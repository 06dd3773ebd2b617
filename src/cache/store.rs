//! Disk-backed response cache.
//!
//! Every public operation is best-effort: I/O failures are logged and
//! reported as a miss or a skipped store, never returned to the caller.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::cache::layout::{
    cache_key, family_of, is_sidecar, partial_path, sidecar_path, split_entry_name, CacheLayout,
    ContentFamily,
};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Upstream response headers, lowercase names, repeated values joined by `", "`.
pub type HeaderSnapshot = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed header snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// A cache hit.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: Bytes,
    pub headers: Option<HeaderSnapshot>,
    pub family: ContentFamily,
}

impl CachedResponse {
    /// Content type recorded at store time, or a family default.
    pub fn content_type(&self) -> String {
        self.headers
            .as_ref()
            .and_then(|h| h.get("content-type").cloned())
            .unwrap_or_else(|| match self.family {
                ContentFamily::Html => "text/html".to_string(),
                _ => "application/octet-stream".to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub scanned: usize,
    pub expired: usize,
    pub evicted: usize,
    pub remaining_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheUsage {
    pub html_entries: usize,
    pub media_entries: usize,
    pub other_entries: usize,
    pub total_bytes: u64,
}

/// One body file plus its optional sidecar, as seen by a sweep.
#[derive(Debug)]
struct DiskEntry {
    body: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// `cache_key → extension` of media bodies on disk, since their file name
/// cannot be derived from the URL alone.
type MediaIndex = HashMap<String, String>;

#[derive(Debug)]
pub struct ResponseCache {
    layout: CacheLayout,
    config: CacheConfig,
    media: RwLock<MediaIndex>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let layout = CacheLayout::new(&config.dir);
        if let Err(e) = layout.ensure_dirs() {
            tracing::warn!(dir = %config.dir.display(), error = %e, "Failed to create cache directories");
        }
        let media = match layout.media_entries() {
            Ok(entries) => entries.into_iter().collect(),
            Err(e) => {
                tracing::warn!(dir = %config.dir.display(), error = %e, "Failed to index cached media");
                MediaIndex::new()
            }
        };
        Self {
            layout,
            config: config.clone(),
            media: RwLock::new(media),
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn large_file_threshold(&self) -> u64 {
        self.config.large_file_threshold
    }

    /// Whether a response of this type and size passes the store gates.
    pub fn accepts(&self, content_type: &str, size: u64) -> bool {
        if !self.config.enabled {
            return false;
        }
        let family_enabled = match ContentFamily::classify(content_type) {
            ContentFamily::Html => self.config.cache_html,
            ContentFamily::Media => self.config.cache_media,
            ContentFamily::Other => self.config.cache_other,
        };
        family_enabled && (size <= self.config.large_file_threshold || self.config.cache_large_files)
    }

    /// Most bytes a caller should buffer for a later `store`.
    pub fn max_storable_bytes(&self) -> u64 {
        if self.config.cache_large_files {
            self.config.max_size_bytes
        } else {
            self.config.large_file_threshold
        }
    }

    pub fn lookup(&self, url: &str) -> Option<CachedResponse> {
        self.lookup_at(url, SystemTime::now())
    }

    pub(crate) fn lookup_at(&self, url: &str, now: SystemTime) -> Option<CachedResponse> {
        if !self.config.enabled {
            return None;
        }
        for path in self.candidates(url) {
            match self.read_entry(&path, now) {
                Ok(Some(hit)) => {
                    metrics::record_cache_event("hit");
                    tracing::debug!(url, path = %path.display(), "Cache hit");
                    return Some(hit);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(url, path = %path.display(), error = %e, "Cache read failed");
                }
            }
        }
        metrics::record_cache_event("miss");
        None
    }

    fn read_entry(&self, path: &Path, now: SystemTime) -> Result<Option<CachedResponse>, CacheError> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let sidecar = sidecar_path(path);

        if age(meta.modified()?, now) > self.config.max_age() {
            self.remove_entry(path);
            metrics::record_cache_event("expired");
            return Ok(None);
        }

        let body = match fs::read(path) {
            Ok(body) => Bytes::from(body),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let headers = match fs::read(&sidecar) {
            Ok(raw) => Some(serde_json::from_slice::<HeaderSnapshot>(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if !refresh(path, now)? || (headers.is_some() && !refresh(&sidecar, now)?) {
            return Ok(None);
        }

        let family = family_of(path).unwrap_or(ContentFamily::Other);

        Ok(Some(CachedResponse { body, headers, family }))
    }

    /// Store a response body. Returns whether an entry was written.
    pub fn store(
        &self,
        url: &str,
        body: &[u8],
        content_type: &str,
        headers: Option<&HeaderSnapshot>,
    ) -> bool {
        if !self.accepts(content_type, body.len() as u64) {
            return false;
        }
        match self.write_entry(url, body, content_type, headers) {
            Ok(path) => {
                metrics::record_cache_event("store");
                tracing::debug!(url, path = %path.display(), bytes = body.len(), "Cached response");
                true
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Cache store failed");
                false
            }
        }
    }

    fn write_entry(
        &self,
        url: &str,
        body: &[u8],
        content_type: &str,
        headers: Option<&HeaderSnapshot>,
    ) -> Result<PathBuf, CacheError> {
        let path = self.layout.entry_path(url, content_type);
        for stale in self.candidates(url) {
            if stale != path {
                self.remove_entry(&stale);
            }
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let sidecar = sidecar_path(&path);
        match headers {
            Some(headers) => write_atomically(&sidecar, &serde_json::to_vec(headers)?)?,
            None => remove_quietly(&sidecar),
        }
        write_atomically(&path, body)?;
        self.remember(&path);
        Ok(path)
    }

    fn candidates(&self, url: &str) -> Vec<PathBuf> {
        let key = cache_key(url);
        let extension = self
            .media
            .read()
            .expect("media index lock poisoned")
            .get(&key)
            .cloned();
        self.layout.candidate_paths(url, extension.as_deref())
    }

    fn remember(&self, body: &Path) {
        if family_of(body) != Some(ContentFamily::Media) {
            return;
        }
        if let Some((key, ext)) = body.file_name().and_then(|n| n.to_str()).and_then(split_entry_name) {
            self.media
                .write()
                .expect("media index lock poisoned")
                .insert(key.to_string(), ext.to_string());
        }
    }

    /// Delete a body and its sidecar, and drop it from the media index.
    fn remove_entry(&self, body: &Path) {
        remove_quietly(body);
        remove_quietly(&sidecar_path(body));
        if family_of(body) != Some(ContentFamily::Media) {
            return;
        }
        if let Some((key, ext)) = body.file_name().and_then(|n| n.to_str()).and_then(split_entry_name) {
            let mut media = self.media.write().expect("media index lock poisoned");
            if media.get(key).is_some_and(|known| known == ext) {
                media.remove(key);
            }
        }
    }

    /// Delete expired entries, then the least recently used ones until the
    /// total is within the size budget.
    pub fn sweep(&self) -> SweepStats {
        self.sweep_at(SystemTime::now())
    }

    pub(crate) fn sweep_at(&self, now: SystemTime) -> SweepStats {
        let mut stats = SweepStats::default();
        let mut entries = match self.scan() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Cache scan failed");
                return stats;
            }
        };
        stats.scanned = entries.len();
        let mut total: u64 = entries.iter().map(|e| e.size).sum();

        let max_age = self.config.max_age();
        entries.retain(|entry| {
            if age(entry.modified, now) > max_age {
                total -= entry.size;
                self.remove_entry(&entry.body);
                stats.expired += 1;
                false
            } else {
                true
            }
        });

        if total > self.config.max_size_bytes {
            entries.sort_by_key(|entry| entry.modified);
            for entry in &entries {
                if total <= self.config.max_size_bytes {
                    break;
                }
                total -= entry.size;
                self.remove_entry(&entry.body);
                stats.evicted += 1;
            }
        }

        stats.remaining_bytes = total;
        metrics::record_cache_size(total);
        for _ in 0..stats.expired {
            metrics::record_cache_event("expired");
        }
        for _ in 0..stats.evicted {
            metrics::record_cache_event("evicted");
        }
        stats
    }

    /// Body files with their sidecar sizes folded in. Orphaned sidecars are
    /// removed on the way.
    fn scan(&self) -> Result<Vec<DiskEntry>, CacheError> {
        let mut bodies: Vec<DiskEntry> = Vec::new();
        let mut sidecars: HashMap<PathBuf, u64> = HashMap::new();

        let mut pending = vec![self.layout.root().to_path_buf()];
        while let Some(dir) = pending.pop() {
            let listing = match fs::read_dir(&dir) {
                Ok(listing) => listing,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for item in listing.flatten() {
                let path = item.path();
                let Ok(meta) = item.metadata() else { continue };
                if meta.is_dir() {
                    pending.push(path);
                } else if is_sidecar(&path) {
                    sidecars.insert(path, meta.len());
                } else {
                    bodies.push(DiskEntry {
                        modified: meta.modified()?,
                        size: meta.len(),
                        body: path,
                    });
                }
            }
        }

        for entry in &mut bodies {
            if let Some(size) = sidecars.remove(&sidecar_path(&entry.body)) {
                entry.size += size;
            }
        }
        for orphan in sidecars.keys() {
            remove_quietly(orphan);
        }
        Ok(bodies)
    }

    /// Remove one URL's entry, or everything when `url` is `None`.
    pub fn clear(&self, url: Option<&str>) {
        match url {
            Some(url) => {
                for path in self.candidates(url) {
                    self.remove_entry(&path);
                }
                tracing::debug!(url, "Cleared cache entry");
            }
            None => {
                self.media.write().expect("media index lock poisoned").clear();
                if let Err(e) = fs::remove_dir_all(self.layout.root()) {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(error = %e, "Failed to remove cache tree");
                    }
                }
                if let Err(e) = self.layout.ensure_dirs() {
                    tracing::warn!(error = %e, "Failed to recreate cache directories");
                }
                metrics::record_cache_size(0);
                tracing::info!(dir = %self.layout.root().display(), "Cleared cache");
            }
        }
    }

    pub fn usage(&self) -> CacheUsage {
        let mut usage = CacheUsage::default();
        let Ok(entries) = self.scan() else {
            return usage;
        };
        for entry in entries {
            usage.total_bytes += entry.size;
            let family = entry
                .body
                .parent()
                .and_then(|dir| dir.file_name())
                .and_then(|name| name.to_str());
            match family {
                Some("html") => usage.html_entries += 1,
                Some("media") => usage.media_entries += 1,
                _ => usage.other_entries += 1,
            }
        }
        usage
    }
}

fn age(modified: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(modified).unwrap_or_default()
}

/// Set the mtime of `path` to `now`. `Ok(false)` when the file is gone.
fn refresh(path: &Path, now: SystemTime) -> io::Result<bool> {
    let touched = fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(now));
    match touched {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let staged = partial_path(path);
    fs::write(&staged, contents)?;
    fs::rename(&staged, path).inspect_err(|_| remove_quietly(&staged))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}
