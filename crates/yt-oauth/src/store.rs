use crate::error::OAuthError;
use crate::token::Credential;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Single-slot persistent cache for the current credential
pub trait CredentialStore {
    /// Previously saved credential, or `None` if nothing usable is cached
    fn load(&self) -> Result<Option<Credential>, OAuthError>;

    fn save(&self, credential: &Credential) -> Result<(), OAuthError>;
}

/// Credential cache kept as a JSON file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, source: std::io::Error) -> OAuthError {
        OAuthError::Store {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, OAuthError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_error(e)),
        };

        match serde_json::from_slice(&content) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unreadable credential cache"
                );
                Ok(None)
            }
        }
    }

    /// Write to a uniquely named sibling file, then rename it into place
    fn save(&self, credential: &Credential) -> Result<(), OAuthError> {
        let content = serde_json::to_string_pretty(credential)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.store_error(e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.store_error(e))?;
        }
        file.write_all(content.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| self.store_error(e))?;

        file.persist(&self.path).map_err(|e| self.store_error(e.error))?;

        tracing::debug!(path = %self.path.display(), "credential cache written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            access_token: "ya29.token".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: 1_700_000_000,
            scopes: vec!["https://www.googleapis.com/auth/youtube.upload".to_string()],
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join(".youtube_token.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn saved_credential_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join(".youtube_token.json"));

        store.save(&credential()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn save_replaces_previous_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join(".youtube_token.json"));
        store.save(&credential()).unwrap();

        let mut refreshed = credential();
        refreshed.access_token = "ya29.refreshed".to_string();
        store.save(&refreshed).unwrap();

        assert_eq!(store.load().unwrap(), Some(refreshed));
    }

    #[test]
    fn corrupt_cache_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".youtube_token.json");
        std::fs::write(&path, b"\x80\x04\x95 pickled").unwrap();

        assert_eq!(FileCredentialStore::new(path).load().unwrap(), None);
    }

    #[test]
    fn concurrent_saves_leave_a_complete_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".youtube_token.json");

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = FileCredentialStore::new(&path);
                std::thread::spawn(move || {
                    let mut token = credential();
                    token.access_token = "x".repeat(16 << i);
                    (0..100).filter(|_| store.save(&token).is_err()).count()
                })
            })
            .collect();

        let failures: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(failures, 0);

        let loaded = FileCredentialStore::new(&path).load().unwrap().unwrap();
        assert!((0..4).any(|i| loaded.access_token == "x".repeat(16 << i)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn cache_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join(".youtube_token.json"));
        store.save(&credential()).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
