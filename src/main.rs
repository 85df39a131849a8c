use clap::Parser;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use yt_oauth::{
    CLIENT_SECRETS_FILE, ClientSecrets, CredentialManager, FileCredentialStore, GoogleAuthProvider,
    OAUTH_CALLBACK_PORT, TOKEN_FILE, YOUTUBE_UPLOAD_SCOPE, install_path,
};
use yt_video_uploader::{
    GAMING_CATEGORY_ID, Privacy, RetryPolicy, UploadDriver, UploadRequest, UploadSession,
    YouTubeTransport, shorts_title,
};

/// YouTube Video Uploader - Uploads a demo video and prints its watch URL
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to video file
    video_file: PathBuf,

    /// Video title
    #[arg(long, short = 't')]
    title: String,

    /// Video description
    #[arg(long, short = 'd', default_value = "")]
    description: String,

    /// Video tags
    #[arg(long, num_args = 1..)]
    tags: Option<Vec<String>>,

    /// Video privacy status
    #[arg(long, value_enum, default_value_t = Privacy::Public)]
    privacy: Privacy,

    /// Mark as YouTube Shorts
    #[arg(long)]
    shorts: bool,

    /// YouTube category ID (20 = Gaming)
    #[arg(long, default_value = GAMING_CATEGORY_ID)]
    category: String,

    /// Path to the OAuth client secrets file
    /// [default: client_secrets.json next to the executable]
    #[arg(long)]
    client_secrets: Option<PathBuf>,

    /// Path to the cached OAuth token file
    /// [default: .youtube_token.json next to the executable]
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Retries of a chunk after a transient network or server error (0 disables retry)
    #[arg(long, default_value_t = RetryPolicy::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Upload chunk size in MiB
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u64).range(1..=1024))]
    chunk_size_mib: u64,

    /// Local port for the OAuth redirect listener
    #[arg(long, default_value_t = OAUTH_CALLBACK_PORT)]
    oauth_port: u16,
}

/// Resolves when the process is asked to stop, naming the signal
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
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

    let title = if args.shorts {
        shorts_title(&args.title)
    } else {
        args.title.clone()
    };

    if !args.video_file.exists() {
        eprintln!("Error: Video file not found: {}", args.video_file.display());
        std::process::exit(1);
    }

    let client_secrets = args
        .client_secrets
        .clone()
        .unwrap_or_else(|| install_path(CLIENT_SECRETS_FILE));
    let token_file = args
        .token_file
        .clone()
        .unwrap_or_else(|| install_path(TOKEN_FILE));

    // Configuration problems abort here, before any network call
    let secrets = ClientSecrets::load_from_file(&client_secrets)?;
    let provider = GoogleAuthProvider::new(secrets).with_callback_port(args.oauth_port);
    let manager = CredentialManager::new(
        FileCredentialStore::new(token_file),
        provider,
        vec![YOUTUBE_UPLOAD_SCOPE.to_string()],
    );
    let credential = manager.obtain_credential().await?;

    let request = UploadRequest {
        file: args.video_file.clone(),
        title,
        description: args.description.clone(),
        tags: args.tags.clone(),
        category_id: args.category.clone(),
        privacy: args.privacy,
        made_for_kids: false,
    };

    let chunk_size = args.chunk_size_mib.saturating_mul(1024 * 1024);
    let transport = YouTubeTransport::from_env()?.with_chunk_size(chunk_size);
    let driver = UploadDriver::new(transport).with_retry(RetryPolicy {
        max_retries: args.max_retries,
        ..RetryPolicy::default()
    });

    println!("Uploading: {}", args.video_file.display());
    let mut upload = driver.start(&credential, &request).await?;
    let session_uri = upload.session().session_uri().map(str::to_string);

    let published = tokio::select! {
        result = upload.run_renewing(&manager, &credential, |percent| {
            println!("Progress: {}%", percent)
        }) => result?,
        signal = shutdown_signal() => {
            let signal = signal?;
            eprintln!("Received {}, upload cancelled", signal);
            if let Some(uri) = session_uri {
                tracing::info!(
                    session_uri = %uri,
                    "server keeps the incomplete session until it expires"
                );
            }
            return Err("upload cancelled".into());
        }
    };

    println!("Upload complete!");
    println!("URL: {}", published.url);

    // Output just the URL for scripting
    println!("\n{}", published.url);

    Ok(())
}
