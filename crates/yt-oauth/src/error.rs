use std::path::PathBuf;

/// Errors produced while loading, refreshing or acquiring OAuth credentials
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Client configuration file is missing or unusable
    #[error("invalid client secrets file '{path}': {reason}")]
    ClientSecrets { path: PathBuf, reason: String },

    /// Credential cache could not be read or written
    #[error("credential cache '{path}': {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Token endpoint answered with a non-success status
    #[error("token endpoint returned status {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    /// Token endpoint answered with a body we could not use
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// Interactive authorization did not produce an authorization code
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// No redirect arrived on the loopback listener in time
    #[error("OAuth authorization timeout ({0} seconds)")]
    Timeout(u64),

    /// Credential has no refresh token to exchange
    #[error("credential has no refresh token")]
    NoRefreshToken,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
