//! On-disk naming of cache entries.
//!
//! ```text
//! <root>/html/<blake3(url)>.html
//! <root>/media/<blake3(url)>.<subtype>
//! <root>/other/<blake3(url)>.dat
//! <entry>.headers                      (JSON header snapshot)
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Suffix of the header snapshot stored beside an entry.
pub const SIDECAR_SUFFIX: &str = ".headers";

/// Storage namespace of an entry, chosen by content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFamily {
    Html,
    Media,
    Other,
}

impl ContentFamily {
    pub const ALL: [ContentFamily; 3] = [ContentFamily::Html, ContentFamily::Media, ContentFamily::Other];

    pub fn classify(content_type: &str) -> Self {
        let lower = content_type.to_ascii_lowercase();
        if lower.contains("text/html") {
            ContentFamily::Html
        } else if ["image/", "video/", "audio/"].iter().any(|m| lower.contains(m)) {
            ContentFamily::Media
        } else {
            ContentFamily::Other
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            ContentFamily::Html => "html",
            ContentFamily::Media => "media",
            ContentFamily::Other => "other",
        }
    }

    /// File extension (without dot) for an entry of this family.
    fn extension(self, content_type: &str) -> String {
        match self {
            ContentFamily::Html => "html".to_string(),
            ContentFamily::Other => "dat".to_string(),
            ContentFamily::Media => {
                let subtype: String = content_type
                    .split(';')
                    .next()
                    .and_then(|essence| essence.rsplit('/').next())
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '-')
                    .collect();
                if subtype.is_empty() {
                    "bin".to_string()
                } else {
                    subtype
                }
            }
        }
    }
}

/// Content-addressed key of a target URL.
pub fn cache_key(url: &str) -> String {
    blake3::hash(url.as_bytes()).to_hex().to_string()
}

/// Directory skeleton rooted at the configured cache dir.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn family_dir(&self, family: ContentFamily) -> PathBuf {
        self.root.join(family.dir_name())
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for family in ContentFamily::ALL {
            std::fs::create_dir_all(self.family_dir(family))?;
        }
        Ok(())
    }

    /// Body path of `url` when stored under `content_type`.
    pub fn entry_path(&self, url: &str, content_type: &str) -> PathBuf {
        let family = ContentFamily::classify(content_type);
        self.family_dir(family)
            .join(format!("{}.{}", cache_key(url), family.extension(content_type)))
    }

    /// Every path an entry for `url` could occupy. A media entry's name
    /// carries its subtype, so it is only included when that is known.
    pub fn candidate_paths(&self, url: &str, media_extension: Option<&str>) -> Vec<PathBuf> {
        let key = cache_key(url);
        let mut paths = vec![
            self.family_dir(ContentFamily::Html).join(format!("{key}.html")),
            self.family_dir(ContentFamily::Other).join(format!("{key}.dat")),
        ];
        if let Some(ext) = media_extension {
            paths.push(self.family_dir(ContentFamily::Media).join(format!("{key}.{ext}")));
        }
        paths
    }

    /// `(key, extension)` of every media body on disk.
    pub fn media_entries(&self) -> io::Result<Vec<(String, String)>> {
        let listing = match std::fs::read_dir(self.family_dir(ContentFamily::Media)) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut found = Vec::new();
        for entry in listing.flatten() {
            let path = entry.path();
            if is_sidecar(&path) || is_partial(&path) {
                continue;
            }
            if let Some((key, ext)) = path.file_name().and_then(|n| n.to_str()).and_then(split_entry_name) {
                found.push((key.to_string(), ext.to_string()));
            }
        }
        Ok(found)
    }
}

/// Split a body file name into `(key, extension)`.
pub fn split_entry_name(name: &str) -> Option<(&str, &str)> {
    let (key, ext) = name.split_once('.')?;
    let is_key = key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit());
    (is_key && !ext.is_empty()).then_some((key, ext))
}

/// Family named by the directory holding `path`.
pub fn family_of(path: &Path) -> Option<ContentFamily> {
    let dir = path.parent()?.file_name()?.to_str()?;
    ContentFamily::ALL.into_iter().find(|f| f.dir_name() == dir)
}

pub fn sidecar_path(entry: &Path) -> PathBuf {
    let mut name = entry.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

pub fn is_sidecar(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.ends_with(SIDECAR_SUFFIX))
}

/// In-progress writes are staged under a `.partial-` name and renamed into place.
pub fn partial_path(entry: &Path) -> PathBuf {
    let mut name = entry.as_os_str().to_os_string();
    name.push(format!(".partial-{:08x}", fastrand::u32(..)));
    PathBuf::from(name)
}

pub fn is_partial(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.contains(".partial-"))
}
