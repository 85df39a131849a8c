use clap::Parser;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use yt_oauth::{
    AuthProvider, CLIENT_SECRETS_FILE, ClientSecrets, CredentialStore, FileCredentialStore,
    GoogleAuthProvider, OAUTH_CALLBACK_PORT, TOKEN_FILE, YOUTUBE_UPLOAD_SCOPE, install_path,
};

/// OAuth 2.0 helper tool that authorizes YouTube uploads and caches the credential
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the OAuth client secrets file downloaded from the Google Cloud console
    /// [default: client_secrets.json next to the executable]
    #[arg(long)]
    client_secrets: Option<PathBuf>,

    /// Path to save the OAuth token file
    /// [default: .youtube_token.json next to the executable]
    #[arg(long)]
    token_path: Option<PathBuf>,

    /// Local port for the OAuth redirect listener
    #[arg(long, default_value_t = OAUTH_CALLBACK_PORT)]
    port: u16,

    /// Only print the authorization URL instead of opening a browser
    #[arg(long)]
    no_browser: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client_secrets = args
        .client_secrets
        .unwrap_or_else(|| install_path(CLIENT_SECRETS_FILE));
    let token_path = args.token_path.unwrap_or_else(|| install_path(TOKEN_FILE));

    let secrets = ClientSecrets::load_from_file(&client_secrets)?;
    let provider = GoogleAuthProvider::new(secrets)
        .with_callback_port(args.port)
        .with_open_browser(!args.no_browser);

    let credential = provider
        .authorize(&[YOUTUBE_UPLOAD_SCOPE.to_string()])
        .await?;

    FileCredentialStore::new(&token_path).save(&credential)?;

    eprintln!("\nOAuth token saved to: {}", token_path.display());
    eprintln!("You can now upload with yt-video-uploader");

    Ok(())
}
