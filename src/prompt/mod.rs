//! System-prompt assembly with a time-boxed cache.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::Result;

/// Injected cache service for the assembled system prompt.
///
/// Concatenates the configured instruction files and caches the result for
/// the TTL. After expiry the files are re-read; if the re-read fails and a
/// cached value exists, the stale value is served and the failure logged.
pub struct SystemPromptCache {
    sources: Vec<PathBuf>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, String)>>,
}

impl SystemPromptCache {
    pub fn new(sources: Vec<PathBuf>, ttl: Duration) -> Self {
        Self {
            sources,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Get the assembled prompt, refreshing if the cached value expired.
    pub fn assemble(&self) -> Result<String> {
        let mut cached = self.cached.lock().unwrap();
        if let Some((at, value)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }

        match self.read_sources() {
            Ok(value) => {
                *cached = Some((Instant::now(), value.clone()));
                Ok(value)
            }
            Err(err) => match cached.as_ref() {
                Some((_, stale)) => {
                    warn!(%err, "prompt refresh failed, serving stale value");
                    Ok(stale.clone())
                }
                None => Err(err),
            },
        }
    }

    fn read_sources(&self) -> Result<String> {
        let mut sections = Vec::with_capacity(self.sources.len());
        for path in &self.sources {
            sections.push(std::fs::read_to_string(path)?);
        }
        Ok(sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn concatenates_sources_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        std::fs::write(&a, "first").unwrap();
        std::fs::write(&b, "second").unwrap();

        let cache = SystemPromptCache::new(vec![a, b], Duration::from_secs(60));
        assert_eq!(cache.assemble().unwrap(), "first\n\nsecond");
    }

    #[test]
    fn serves_cached_value_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.md");
        std::fs::write(&path, "v1").unwrap();

        let cache = SystemPromptCache::new(vec![path.clone()], Duration::from_secs(60));
        assert_eq!(cache.assemble().unwrap(), "v1");

        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        f.write_all(b"v2").unwrap();
        // still inside the TTL window
        assert_eq!(cache.assemble().unwrap(), "v1");
    }

    #[test]
    fn stale_value_served_when_refresh_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.md");
        std::fs::write(&path, "v1").unwrap();

        let cache = SystemPromptCache::new(vec![path.clone()], Duration::from_millis(0));
        assert_eq!(cache.assemble().unwrap(), "v1");

        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.assemble().unwrap(), "v1");
    }

    #[test]
    fn missing_file_with_no_cache_is_an_error() {
        let cache = SystemPromptCache::new(
            vec![PathBuf::from("/definitely/not/here.md")],
            Duration::from_secs(60),
        );
        assert!(cache.assemble().is_err());
    }
}
