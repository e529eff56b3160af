use cachify::metrics::format_size;
use cachify::{CacheBackend, CacheKey, RequestIdentity, StoreOutcome};
use clap::{Args, Subcommand};
use shared::{Error, Result, TtlSecs};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Subcommand)]
pub enum Commands {
    /// Show the active backend and whether it is usable
    Status,
    /// Print the approximate cache size
    Stats,
    /// Remove every cached page
    Clear,
    /// Print a cached page as it would be served
    Get {
        #[command(flatten)]
        page: PageArgs,
        /// Render the detailed signature
        #[arg(long)]
        detail: bool,
    },
    /// Remove one cached page
    Delete {
        #[command(flatten)]
        page: PageArgs,
        /// Permalink to invalidate instead of the request URI
        #[arg(long)]
        url: Option<String>,
    },
    /// Store a rendered page read from stdin
    Warm {
        #[command(flatten)]
        page: PageArgs,
        /// Lifetime in seconds, defaults to the configured lifetime
        #[arg(long)]
        lifetime: Option<u64>,
    },
}

#[derive(Args, Clone)]
pub struct PageArgs {
    /// Host name the page was requested with
    #[arg(long)]
    pub host: String,
    /// Request URI
    #[arg(long, default_value = "/")]
    pub uri: String,
    #[arg(long)]
    pub https: bool,
}

impl PageArgs {
    fn key(&self) -> CacheKey {
        CacheKey::for_request(
            RequestIdentity::new(self.host.clone(), self.uri.clone()).with_https(self.https),
        )
    }
}

/// Settings a command may need besides its own arguments.
pub struct Defaults {
    pub lifetime: TtlSecs,
    pub sig_detail: bool,
}

pub async fn run<R, W>(
    command: Commands,
    backend: &dyn CacheBackend,
    defaults: &Defaults,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    match command {
        Commands::Status => {
            let line = format!(
                "method: {}\navailable: {}\n",
                backend.stringify_method(),
                backend.is_available()
            );
            out.write_all(line.as_bytes()).await?;
        }
        Commands::Stats => {
            let line = match backend.get_stats().await {
                Some(bytes) => format!("{} ({} bytes)\n", format_size(bytes), bytes),
                None => "unknown\n".to_string(),
            };
            out.write_all(line.as_bytes()).await?;
        }
        Commands::Clear => {
            backend.clear_cache().await;
            out.write_all(b"cleared\n").await?;
        }
        Commands::Get { page, detail } => {
            let entry = backend.get_item(&page.key()).await;
            let outcome = backend
                .print_cache(detail || defaults.sig_detail, entry.as_ref(), &mut *out)
                .await?;
            if !outcome.is_served() {
                return Err(Error::NotFound);
            }
        }
        Commands::Delete { page, url } => {
            backend.delete_item(&page.key(), url.as_deref()).await;
            out.write_all(b"deleted\n").await?;
        }
        Commands::Warm { page, lifetime } => {
            let mut html = String::new();
            input.read_to_string(&mut html).await?;
            let lifetime = lifetime.map(TtlSecs).unwrap_or(defaults.lifetime);

            match backend
                .store_item(&page.key(), &html, lifetime, defaults.sig_detail)
                .await
            {
                StoreOutcome::Stored => out.write_all(b"stored\n").await?,
                StoreOutcome::SkippedEmpty => return Err(Error::EmptyInput),
                StoreOutcome::SkippedUnavailable => {
                    return Err(Error::Unavailable(backend.stringify_method().to_string()));
                }
                StoreOutcome::Failed(reason) => return Err(Error::Storage(reason)),
            }
        }
    }
    out.flush().await?;
    Ok(())
}
