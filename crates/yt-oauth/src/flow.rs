use crate::OAUTH_CALLBACK_PORT;
use crate::error::OAuthError;
use crate::secrets::ClientSecrets;
use crate::token::{Credential, TokenResponse};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// How long the loopback listener waits for the browser redirect
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Obtains and renews credentials on behalf of the user
#[allow(async_fn_in_trait)]
pub trait AuthProvider {
    /// Run an interactive authorization granting `scopes`
    async fn authorize(&self, scopes: &[String]) -> Result<Credential, OAuthError>;

    /// Exchange the refresh token of `credential` for a fresh access token
    async fn refresh(&self, credential: &Credential) -> Result<Credential, OAuthError>;
}

/// Generate PKCE verifier and challenge
pub fn generate_pkce() -> (String, String) {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use sha2::{Digest, Sha256};

    let verifier = random_token(64);

    // Generate challenge: base64url(SHA256(verifier))
    let hash = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hash);

    (verifier, challenge)
}

fn random_token(len: usize) -> String {
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate authorization URL, returning it with the PKCE verifier
pub fn generate_auth_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> (String, String) {
    let (verifier, challenge) = generate_pkce();

    let auth_url = format!(
        "{}?\
        client_id={}&\
        redirect_uri={}&\
        response_type=code&\
        scope={}&\
        state={}&\
        code_challenge={}&\
        code_challenge_method=S256&\
        access_type=offline&\
        prompt=consent",
        secrets.auth_uri,
        urlencoding::encode(&secrets.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
        urlencoding::encode(state),
        urlencoding::encode(&challenge),
    );

    (auth_url, verifier)
}

#[derive(Deserialize)]
struct AuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Local HTTP listener receiving the OAuth redirect
pub struct CallbackListener {
    redirect_uri: String,
    codes: mpsc::Receiver<Result<String, String>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl CallbackListener {
    /// Bind on the loopback interface; port 0 picks a free port
    pub async fn bind(port: u16, expected_state: String) -> Result<Self, OAuthError> {
        use axum::{
            Router,
            extract::Query,
            response::{Html, IntoResponse},
            routing::get,
        };

        let (code_tx, codes) = mpsc::channel::<Result<String, String>>(1);

        let callback_handler = move |Query(params): Query<AuthCallback>| {
            let code_tx = code_tx.clone();
            let expected_state = expected_state.clone();
            async move {
                if let Some(error) = params.error {
                    let page = format!(
                        "<html><body><h1>Authorization Failed</h1><p>Error: {}</p>\
                        <p>You can close this window.</p></body></html>",
                        error
                    );
                    let _ = code_tx.try_send(Err(error));
                    return Html(page).into_response();
                }

                if params.state.as_deref() != Some(expected_state.as_str()) {
                    let _ = code_tx.try_send(Err("state parameter mismatch".to_string()));
                    return Html(
                        "<html><body><h1>Authorization Failed</h1>\
                        <p>Invalid state parameter</p></body></html>",
                    )
                    .into_response();
                }

                if let Some(code) = params.code {
                    let _ = code_tx.try_send(Ok(code));
                    return Html(
                        "<html><body><h1>Authorization Successful!</h1>\
                        <p>You can close this window and return to the application.</p>\
                        </body></html>",
                    )
                    .into_response();
                }

                Html(
                    "<html><body><h1>Authorization Failed</h1>\
                    <p>No code received</p></body></html>",
                )
                .into_response()
            }
        };

        let app = Router::new().route("/oauth2callback", get(callback_handler));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::warn!(error = %e, "OAuth callback listener stopped");
            }
        });

        tracing::debug!(%local_addr, "OAuth callback listener bound");

        Ok(Self {
            redirect_uri: format!("http://127.0.0.1:{}/oauth2callback", local_addr.port()),
            codes,
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the browser redirect and return the authorization code
    pub async fn wait_for_code(mut self, timeout: Duration) -> Result<String, OAuthError> {
        match tokio::time::timeout(timeout, self.codes.recv()).await {
            Err(_) => Err(OAuthError::Timeout(timeout.as_secs())),
            Ok(None) => Err(OAuthError::Authorization(
                "callback listener closed".to_string(),
            )),
            Ok(Some(Err(error))) => Err(OAuthError::Authorization(error)),
            Ok(Some(Ok(code))) => Ok(code),
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// [`AuthProvider`] talking to Google's OAuth 2.0 endpoints
#[derive(Debug, Clone)]
pub struct GoogleAuthProvider {
    secrets: ClientSecrets,
    callback_port: u16,
    timeout: Duration,
    open_browser: bool,
    http: reqwest::Client,
}

impl GoogleAuthProvider {
    pub fn new(secrets: ClientSecrets) -> Self {
        Self {
            secrets,
            callback_port: OAUTH_CALLBACK_PORT,
            timeout: AUTHORIZATION_TIMEOUT,
            open_browser: true,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
        requested_scopes: &[String],
        previous_refresh_token: Option<String>,
    ) -> Result<Credential, OAuthError> {
        let response = self
            .http
            .post(&self.secrets.token_uri)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OAuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| OAuthError::MalformedResponse(e.to_string()))?;
        Ok(token.into_credential(requested_scopes, previous_refresh_token))
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<Credential, OAuthError> {
        tracing::info!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let credential = self.request_token(&params, scopes, None).await?;
        if !credential.can_refresh() {
            tracing::warn!("token endpoint did not return a refresh token");
        }
        Ok(credential)
    }
}

impl AuthProvider for GoogleAuthProvider {
    async fn authorize(&self, scopes: &[String]) -> Result<Credential, OAuthError> {
        // The redirect URI embeds the bound port, so bind before building the URL
        let state = random_token(32);
        let listener = CallbackListener::bind(self.callback_port, state.clone()).await?;
        let redirect_uri = listener.redirect_uri().to_string();
        let (auth_url, verifier) = generate_auth_url(&self.secrets, &redirect_uri, scopes, &state);

        eprintln!("\n=================================================");
        eprintln!("OAuth 2.0 Authorization Required");
        eprintln!("=================================================");
        eprintln!("\nPlease visit the following URL to authorize the application:\n");
        eprintln!("{}\n", auth_url);
        eprintln!("Waiting for authorization...");
        eprintln!("=================================================\n");

        if self.open_browser {
            if let Err(e) = webbrowser::open(&auth_url) {
                tracing::warn!(error = %e, "could not open a browser, use the URL above");
            }
        }

        let code = listener.wait_for_code(self.timeout).await?;

        let credential = self
            .exchange_code(&code, &verifier, &redirect_uri, scopes)
            .await?;
        tracing::info!("Successfully obtained OAuth tokens");
        Ok(credential)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, OAuthError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(OAuthError::NoRefreshToken)?;

        tracing::info!("Refreshing OAuth token");

        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let refreshed = self
            .request_token(&params, &credential.scopes, credential.refresh_token.clone())
            .await?;
        tracing::info!("OAuth token refreshed successfully");
        Ok(refreshed)
    }
}
