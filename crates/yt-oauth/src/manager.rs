use crate::error::OAuthError;
use crate::flow::AuthProvider;
use crate::store::CredentialStore;
use crate::token::Credential;

/// Yields a usable credential from the cache, a refresh, or a new authorization
pub struct CredentialManager<S, P> {
    store: S,
    provider: P,
    scopes: Vec<String>,
}

impl<S: CredentialStore, P: AuthProvider> CredentialManager<S, P> {
    pub fn new(store: S, provider: P, scopes: Vec<String>) -> Self {
        Self {
            store,
            provider,
            scopes,
        }
    }

    fn grants_scopes(&self, credential: &Credential) -> bool {
        self.scopes.iter().all(|scope| credential.has_scope(scope))
    }

    fn is_usable(&self, credential: &Credential) -> bool {
        !credential.is_expired()
            && self
                .scopes
                .iter()
                .all(|scope| credential.is_valid_for(scope))
    }

    /// Return a non-expired credential, persisting any newly obtained one.
    ///
    /// A failed refresh falls back to interactive authorization once; a failed
    /// authorization is returned to the caller.
    pub async fn obtain_credential(&self) -> Result<Credential, OAuthError> {
        if let Some(cached) = self.store.load()? {
            if self.is_usable(&cached) {
                tracing::debug!("using cached credential");
                return Ok(cached);
            }

            if !self.grants_scopes(&cached) {
                tracing::info!("cached credential lacks the upload scope, re-authorizing");
                return self.authorize().await;
            }
            return self.renew_credential(&cached).await;
        }

        self.authorize().await
    }

    /// Replace a credential the API rejected or that has expired.
    ///
    /// Tries the refresh token first and falls back to interactive
    /// authorization once.
    pub async fn renew_credential(&self, stale: &Credential) -> Result<Credential, OAuthError> {
        if stale.can_refresh() {
            tracing::info!("Access token expired, refreshing...");
            match self.provider.refresh(stale).await {
                Ok(refreshed) if self.is_usable(&refreshed) => {
                    self.store.save(&refreshed)?;
                    return Ok(refreshed);
                }
                Ok(_) => {
                    tracing::warn!("refreshed credential is not usable, re-authorizing");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "token refresh failed, re-authorizing");
                }
            }
        } else {
            tracing::info!("credential cannot be refreshed, re-authorizing");
        }

        self.authorize().await
    }

    async fn authorize(&self) -> Result<Credential, OAuthError> {
        let credential = self.provider.authorize(&self.scopes).await?;
        self.store.save(&credential)?;
        Ok(credential)
    }
}
