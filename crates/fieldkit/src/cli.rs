use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use fieldkit_fetch::{AcquisitionEngine, Origin, ReqwestClient, Timeouts};

use crate::config::Settings;
use crate::tracker::TransferTracker;

#[derive(Debug, Parser)]
#[command(version, about = "Fetch large model files once, resume them, publish them atomically")]
#[clap(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file merged under `FIELDKIT_*` environment variables.
    #[arg(long, short, global = true, default_value = "fieldkit.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the asset unless it is already complete.
    #[clap(visible_alias = "get")]
    Acquire {
        /// Discard any partial or final file and start from zero.
        #[arg(long)]
        force: bool,
    },
    /// Report whether the final file is present and matches the server.
    Check,
    /// Print the final and partial file paths.
    Paths,
}

#[derive(Debug, Clone, Default, Args)]
struct Overrides {
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    url: Option<String>,

    #[arg(long, global = true)]
    file_name: Option<String>,

    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// May be repeated; replaces the configured list.
    #[arg(long = "trusted-domain", global = true)]
    trusted_domains: Vec<String>,
}

impl Overrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(dir) = self.storage_dir {
            settings.storage_dir = dir;
        }
        if self.url.is_some() {
            settings.url = self.url;
        }
        if self.file_name.is_some() {
            settings.file_name = self.file_name;
        }
        if let Some(secs) = self.timeout_secs {
            settings.timeout_secs = secs;
        }
        if !self.trusted_domains.is_empty() {
            settings.trusted_domains = self.trusted_domains;
        }
    }
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(&self.config)?;
        self.overrides.clone().apply(&mut settings);
        Ok(settings)
    }

    pub async fn run(self) -> Result<()> {
        let settings = self.settings()?;
        let client = ReqwestClient::new(Timeouts::default()).context("failed to build HTTP client")?;
        let engine = Arc::new(AcquisitionEngine::http(client, settings.engine_options()));

        match self.command {
            Command::Acquire { force } => acquire(engine, &settings, force).await,
            Command::Check => {
                let request = settings.request(false)?;
                let complete = engine.is_already_complete(&request).await;
                println!(
                    "{}: {}",
                    engine.final_path(&request.file_name).display(),
                    if complete { "complete" } else { "missing" }
                );
                Ok(())
            }
            Command::Paths => {
                let name = settings.file_name()?;
                println!("final   {}", engine.final_path(&name).display());
                println!("partial {}", engine.partial_path(&name).display());
                Ok(())
            }
        }
    }
}

async fn acquire(
    engine: Arc<AcquisitionEngine<ReqwestClient>>,
    settings: &Settings,
    force: bool,
) -> Result<()> {
    let tracker = TransferTracker::new("fetching");
    let request = settings.request(force)?.on_progress(tracker.sink());

    let interrupt = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling download");
                engine.cancel();
            }
        })
    };

    let outcome = engine.ensure_acquired(request).await;
    interrupt.abort();

    match outcome {
        Ok(asset) => {
            let note = match asset.origin {
                Origin::AlreadyComplete => "already complete",
                Origin::Resumed => "resumed",
                Origin::Transferred => "downloaded",
            };
            tracker.finish(note);
            println!("{}", asset.path.display());
            Ok(())
        }
        Err(err) => {
            tracker.abandon(err.message());
            if let Some(cause) = err.cause() {
                tracing::debug!(cause = %cause, "failure cause");
            }
            bail!("{} ({:?})", err.message(), err.kind())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_replace_settings() {
        let cli = Cli::parse_from([
            "fieldkit",
            "acquire",
            "--force",
            "--url",
            "https://example.com/a.bin",
            "--trusted-domain",
            "example.com",
            "--timeout-secs",
            "5",
        ]);
        assert!(matches!(cli.command, Command::Acquire { force: true }));

        let mut settings = Settings::default();
        cli.overrides.apply(&mut settings);
        assert_eq!(settings.url.as_deref(), Some("https://example.com/a.bin"));
        assert_eq!(settings.trusted_domains, vec!["example.com".to_string()]);
        assert_eq!(settings.timeout_secs, 5);
    }
}
