//! OAuth 2.0 credential management for uploading to YouTube.
//!
//! [`CredentialManager`] keeps a single cached [`Credential`] in a
//! [`CredentialStore`], refreshes it when it expires and falls back to an
//! interactive browser authorization through an [`AuthProvider`].

mod error;
mod flow;
mod manager;
mod secrets;
mod store;
mod token;

pub use error::OAuthError;
pub use flow::{
    AUTHORIZATION_TIMEOUT, AuthProvider, CallbackListener, GoogleAuthProvider, generate_auth_url,
    generate_pkce,
};
pub use manager::CredentialManager;
pub use secrets::{ClientSecrets, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
pub use store::{CredentialStore, FileCredentialStore};
pub use token::{Credential, EXPIRY_MARGIN_SECS};

use std::path::{Path, PathBuf};

/// Default OAuth callback port
pub const OAUTH_CALLBACK_PORT: u16 = 8080;

/// Scope required to upload videos
pub const YOUTUBE_UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Default name of the OAuth client secrets file
pub const CLIENT_SECRETS_FILE: &str = "client_secrets.json";

/// Default name of the cached credential file
pub const TOKEN_FILE: &str = ".youtube_token.json";

/// Path of `name` in the directory holding the running executable.
///
/// Falls back to the working directory when the executable cannot be located.
pub fn install_path(name: impl AsRef<Path>) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_path_sits_next_to_the_executable() {
        let exe = std::env::current_exe().unwrap();
        let path = install_path(TOKEN_FILE);

        assert_eq!(path.parent(), exe.parent());
        assert_eq!(path.file_name().unwrap(), TOKEN_FILE);
        assert!(path.is_absolute());
    }
}
