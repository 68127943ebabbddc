//! Single-slot persistence for the most recent captured session.
//!
//! The store holds exactly one cookie set; each successful bootstrap
//! overwrites it. Writes go through a temp file and rename so concurrent
//! bootstraps cannot leave a torn file behind (last writer wins).

use crate::error::ScrapeError;
use crate::models::StoredCookie;
use std::fs;
use std::path::{Path, PathBuf};

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted cookie set, sanitized.
    ///
    /// An absent file is a cold start, not an error. A present-but-unreadable
    /// file is reported as an error so the caller can decide how loudly to
    /// complain; the bootstrap treats it as non-fatal.
    pub fn load(&self) -> Result<Option<Vec<StoredCookie>>, ScrapeError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ScrapeError::SessionStore(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let cookies: Vec<StoredCookie> = serde_json::from_str(&content).map_err(|e| {
            ScrapeError::SessionStore(format!("malformed {}: {}", self.path.display(), e))
        })?;

        Ok(Some(sanitize_cookies(cookies)))
    }

    /// Persist a cookie set, replacing any previous session.
    pub fn save(&self, cookies: &[StoredCookie]) -> Result<(), ScrapeError> {
        let content = serde_json::to_string_pretty(cookies)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| {
            ScrapeError::SessionStore(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            ScrapeError::SessionStore(format!(
                "failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;

        log::info!(
            "Persisted {} session cookies to {}",
            cookies.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Normalize a cookie set to what the browser engine will accept.
///
/// Drops entries without a name and maps legacy `sameSite` spellings onto
/// the engine's `Strict`/`Lax`/`None` values; unknown or `unspecified`
/// values are removed. Idempotent.
pub fn sanitize_cookies(cookies: Vec<StoredCookie>) -> Vec<StoredCookie> {
    cookies
        .into_iter()
        .filter(|c| !c.name.is_empty())
        .map(|mut c| {
            c.same_site = c.same_site.as_deref().and_then(normalize_same_site);
            c
        })
        .collect()
}

fn normalize_same_site(value: &str) -> Option<String> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some("Strict".to_string()),
        "lax" => Some("Lax".to_string()),
        "none" | "no_restriction" => Some("None".to_string()),
        // "unspecified" and anything unrecognized
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, same_site: Option<&str>) -> StoredCookie {
        StoredCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: ".naver.com".to_string(),
            path: "/".to_string(),
            expires: None,
            same_site: same_site.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_sanitize_drops_nameless_entries() {
        let cookies = vec![cookie("", None), cookie("NNB", None)];
        let sanitized = sanitize_cookies(cookies);
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized[0].name, "NNB");
    }

    #[test]
    fn test_sanitize_normalizes_legacy_same_site() {
        let cookies = vec![
            cookie("a", Some("no_restriction")),
            cookie("b", Some("unspecified")),
            cookie("c", Some("lax")),
            cookie("d", Some("STRICT")),
        ];
        let sanitized = sanitize_cookies(cookies);
        assert_eq!(sanitized[0].same_site.as_deref(), Some("None"));
        assert_eq!(sanitized[1].same_site, None);
        assert_eq!(sanitized[2].same_site.as_deref(), Some("Lax"));
        assert_eq!(sanitized[3].same_site.as_deref(), Some("Strict"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let cookies = vec![
            cookie("a", Some("no_restriction")),
            cookie("", None),
            cookie("b", Some("unspecified")),
        ];
        let once = sanitize_cookies(cookies);
        let twice = sanitize_cookies(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_load_missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("cookies.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        fs::write(&path, "{not json").unwrap();

        let store = SessionStore::new(&path);
        let err = store.load().unwrap_err();
        assert!(matches!(err, ScrapeError::SessionStore(_)));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("cookies.json"));

        let cookies = vec![cookie("NNB", Some("Lax")), cookie("nid_b", None)];
        store.save(&cookies).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, cookies);
    }

    #[test]
    fn test_save_overwrites_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("cookies.json"));

        store.save(&[cookie("old", None)]).unwrap();
        store.save(&[cookie("new", None)]).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "new");
    }

    #[test]
    fn test_saved_file_reloads_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        // Simulate a raw browser-extension export with legacy fields
        fs::write(
            &path,
            r#"[
                {"name":"NNB","value":"x","domain":".naver.com","path":"/","expirationDate":1900000000.0,"sameSite":"no_restriction"},
                {"name":"","value":"orphan","domain":".naver.com","path":"/"}
            ]"#,
        )
        .unwrap();

        let store = SessionStore::new(&path);
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].expires, Some(1900000000.0));
        assert_eq!(loaded[0].same_site.as_deref(), Some("None"));

        // Re-persisting writes no legacy field names
        store.save(&loaded).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("expirationDate"));
        assert!(!raw.contains("no_restriction"));
    }
}
