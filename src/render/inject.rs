//! Script injection into proxied HTML.

use std::path::Path;

use crate::config::InjectConfig;

/// Appends the configured scripts to rewritten HTML pages.
#[derive(Debug, Clone, Default)]
pub struct ScriptInjector {
    /// Concatenated `<script>` elements; empty when injection is off.
    snippet: String,
}

impl ScriptInjector {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Load every `.js` file in the scripts directory, in name order.
    pub fn load(config: &InjectConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        match read_scripts(&config.scripts_dir) {
            Ok(scripts) => {
                tracing::info!(
                    dir = %config.scripts_dir.display(),
                    count = scripts.len(),
                    "Loaded injection scripts"
                );
                Self::from_scripts(scripts.iter().map(String::as_str))
            }
            Err(e) => {
                tracing::warn!(dir = %config.scripts_dir.display(), error = %e, "Script injection disabled");
                Self::disabled()
            }
        }
    }

    pub fn from_scripts<'a>(scripts: impl IntoIterator<Item = &'a str>) -> Self {
        let snippet = scripts
            .into_iter()
            .map(|source| format!("<script>\n{source}\n</script>\n"))
            .collect();
        Self { snippet }
    }

    pub fn is_enabled(&self) -> bool {
        !self.snippet.is_empty()
    }

    /// Insert the scripts before the last `</body>`, or append them.
    pub fn inject(&self, mut html: Vec<u8>) -> Vec<u8> {
        if self.snippet.is_empty() {
            return html;
        }
        match rfind_ignore_case(&html, b"</body>") {
            Some(at) => {
                html.splice(at..at, self.snippet.bytes());
            }
            None => html.extend_from_slice(self.snippet.as_bytes()),
        }
        html
    }
}

fn read_scripts(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "js"))
        .collect();
    paths.sort();
    paths.iter().map(std::fs::read_to_string).collect()
}

fn rfind_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
