use anyhow::{bail, Context, Result};
use batchdrop::common::config::{load_config, load_layers};
use batchdrop::common::config_commands;
use batchdrop::common::{AppConfig, ConfigOverrides, StoreKind};
use batchdrop::crypto::{CryptoEngine, GpgEngine};
use batchdrop::output;
use batchdrop::session::{BatchItem, ResponseRequest, SessionBuilder, SessionConfig};
use batchdrop::store::{LocalStore, RemoteFileStore, SftpStore};
use batchdrop::transfer::{PollOutcome, TransferOrchestrator, TransferSettings};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit status when waiting ends without a result.
const EXIT_NOT_READY: i32 = 2;

#[derive(Parser)]
#[command(name = "batchdrop")]
#[command(about = "Assemble batch request files and hand them off over SFTP", version)]
struct Cli {
    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OverrideArgs {
    #[arg(long, global = true, help = "Remote store backend")]
    store: Option<StoreArg>,

    #[arg(
        long,
        global = true,
        conflicts_with = "no_encrypt",
        help = "Encrypt requests and decrypt responses"
    )]
    encrypt: bool,

    #[arg(long, global = true, help = "Send and receive plaintext")]
    no_encrypt: bool,

    #[arg(long, global = true, help = "Seconds to wait for a result")]
    timeout_secs: Option<u64>,
}

impl OverrideArgs {
    fn to_overrides(&self) -> ConfigOverrides {
        let encrypt = match (self.encrypt, self.no_encrypt) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        ConfigOverrides {
            store: self.store.map(Into::into),
            encrypt,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Sftp,
    Local,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Sftp => StoreKind::Sftp,
            StoreArg::Local => StoreKind::Local,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a session document and publish it
    Submit {
        #[arg(help = "Files holding one serialized batch request each")]
        fragments: Vec<PathBuf>,

        #[arg(
            long,
            conflicts_with = "fragments",
            help = "Request the results of an earlier session"
        )]
        rfr_session_id: Option<u64>,

        #[arg(long, help = "Wait for the result, then retrieve and decode it")]
        wait: bool,
    },
    /// Wait for the result of a published document
    Await {
        remote_name: String,
    },
    /// Download, decrypt, and decode the result of a published document
    Retrieve {
        remote_name: String,
    },
    /// Import a key file into the gpg keyring
    ImportKey {
        key_file: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the config file contents
    Show,
    /// Write a config file with default values
    Init {
        #[arg(long, help = "Overwrite an existing config file")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("batchdrop=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = cli.overrides.to_overrides();

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Path => config_commands::run_config_path(),
            ConfigAction::Show => config_commands::run_config_show(),
            ConfigAction::Init { force } => config_commands::run_config_init(force).map(|_| ()),
        },
        Commands::ImportKey { key_file } => {
            let config = load_layers(&overrides)?;
            build_crypto(&config)
                .import_key(&key_file)
                .await
                .with_context(|| format!("Failed to import {}", key_file.display()))?;
            println!("Imported {}", key_file.display());
            Ok(())
        }
        Commands::Submit {
            fragments,
            rfr_session_id,
            wait,
        } => {
            let config = load_config(&overrides)?;
            submit(&config, fragments, rfr_session_id, wait).await
        }
        Commands::Await { remote_name } => {
            let config = load_config(&overrides)?;
            let mut orchestrator = resume(&config, remote_name);
            if wait_for_result(&mut orchestrator).await? != PollOutcome::Ready {
                std::process::exit(EXIT_NOT_READY);
            }
            Ok(())
        }
        Commands::Retrieve { remote_name } => {
            let config = load_config(&overrides)?;
            let mut orchestrator = resume(&config, remote_name);
            retrieve_and_decode(&mut orchestrator).await
        }
    }
}

async fn submit(
    config: &AppConfig,
    fragments: Vec<PathBuf>,
    rfr_session_id: Option<u64>,
    wait: bool,
) -> Result<()> {
    let mut builder = SessionBuilder::new(SessionConfig::from(config));

    match rfr_session_id {
        Some(id) => builder
            .add_response_request(&ResponseRequest::for_session(id))
            .await
            .context("Failed to add response request")?,
        None => {
            if fragments.is_empty() {
                bail!("Nothing to submit: pass batch fragment files or --rfr-session-id");
            }
            for fragment in &fragments {
                let body = tokio::fs::read_to_string(fragment)
                    .await
                    .with_context(|| format!("Failed to read {}", fragment.display()))?;
                builder
                    .add_batch(BatchItem::new(body))
                    .await
                    .with_context(|| format!("Failed to add {}", fragment.display()))?;
            }
        }
    }

    let document = builder.finalize().await.context("Failed to finalize session")?;

    let mut orchestrator = TransferOrchestrator::new(
        TransferSettings::from(config),
        build_store(config),
        build_crypto(config),
    );
    let handle = orchestrator
        .publish(&document)
        .await
        .context("Failed to publish session document")?;
    output::print_published(&handle);

    if !wait {
        return Ok(());
    }
    if wait_for_result(&mut orchestrator).await? != PollOutcome::Ready {
        std::process::exit(EXIT_NOT_READY);
    }
    retrieve_and_decode(&mut orchestrator).await
}

async fn wait_for_result(orchestrator: &mut TransferOrchestrator) -> Result<PollOutcome> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let name = orchestrator.remote_name().unwrap_or_default().to_string();
    let spinner = output::spinner(&format!("Waiting for result of {name}"));
    let outcome = orchestrator.await_result(&cancel).await;
    interrupt.abort();

    match outcome {
        Ok(PollOutcome::Ready) => {
            output::finish_spinner_success(&spinner, &format!("Result ready for {name}"));
            Ok(PollOutcome::Ready)
        }
        Ok(PollOutcome::TimedOut) => {
            output::finish_spinner_warning(&spinner, "Timed out waiting for result");
            Ok(PollOutcome::TimedOut)
        }
        Ok(PollOutcome::Cancelled) => {
            output::finish_spinner_warning(&spinner, "Cancelled");
            Ok(PollOutcome::Cancelled)
        }
        Err(e) => {
            output::finish_spinner_error(&spinner, "Polling failed");
            Err(e).context("Failed while waiting for result")
        }
    }
}

async fn retrieve_and_decode(orchestrator: &mut TransferOrchestrator) -> Result<()> {
    orchestrator
        .retrieve()
        .await
        .context("Failed to retrieve result")?;
    if orchestrator.settings().delete_after_retrieve && !orchestrator.remote_result_removed() {
        output::print_warning("Result was left on the store and will be seen again");
    }
    let response = orchestrator
        .decode()
        .await
        .context("Failed to decode result")?;
    output::print_response(&response);
    Ok(())
}

fn resume(config: &AppConfig, remote_name: String) -> TransferOrchestrator {
    TransferOrchestrator::resume(
        TransferSettings::from(config),
        build_store(config),
        build_crypto(config),
        remote_name,
    )
}

fn build_store(config: &AppConfig) -> Arc<dyn RemoteFileStore> {
    match config.store.kind {
        StoreKind::Sftp => Arc::new(SftpStore::new(config.sftp.clone())),
        StoreKind::Local => Arc::new(LocalStore::new(config.store.local_root.clone())),
    }
}

fn build_crypto(config: &AppConfig) -> Arc<dyn CryptoEngine> {
    Arc::new(GpgEngine::system(
        config.encryption.gpg_binary.clone(),
        config.encryption.gpg_home.clone(),
    ))
}
