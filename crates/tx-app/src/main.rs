//! tankx - spike count extraction for acoustic tone sessions
//!
//! Reads a block exported as CSV, cuts it into trials, counts spikes per
//! tone and channel, and writes the results as a table or a sheet.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tx_core::exclusion::{TrialExclusion, EXCLUSION_FILE_PREFIX};
use tx_core::processors::{ChannelRemapper, CHANNEL_MAP_FILE_PREFIX};
use tx_core::structures::Session;
use tx_data::{BlockSource, SessionConfig};
use tx_export::{session_table, sheet, write_batch};
use tx_extract::SessionProcessor;

use cli::{default_output, Cli, Commands, Layout};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Extract {
            block,
            output,
            layout,
            from,
            to,
            channel_map,
            no_exclusions,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(from) = from {
                config.trial_window.from_offset = from;
            }
            if let Some(to) = to {
                config.trial_window.to_offset = to;
            }
            config.validate()?;

            let output = output.unwrap_or_else(|| default_output(&block, layout));
            run_extract(config, &block, &output, layout, channel_map.as_deref(), no_exclusions).await?;
        }
        Commands::Summary => {
            let config = load_config(cli.config.as_deref())?;
            println!("{}", config.parameter_summary());
        }
        Commands::InitConfig { path, force } => {
            run_init_config(&path, force)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

async fn run_extract(
    config: SessionConfig,
    block: &Path,
    output: &Path,
    layout: Layout,
    channel_map: Option<&Path>,
    no_exclusions: bool,
) -> Result<()> {
    let source = BlockSource::new(block)?;

    let remapper = match channel_map {
        Some(path) => Some(
            ChannelRemapper::from_path(path)
                .with_context(|| format!("Failed to read channel map {}", path.display()))?,
        ),
        None => ChannelRemapper::from_autofind_in_path(block, CHANNEL_MAP_FILE_PREFIX)?,
    };
    if remapper.is_none() {
        info!("No channel map found, channels are left in recorded order");
    }

    let exclusions = if no_exclusions {
        Vec::new()
    } else {
        let dir = absolute(block)?;
        TrialExclusion::from_autofind_in_path(&dir, EXCLUSION_FILE_PREFIX)?
    };

    let mut processor = SessionProcessor::new(config, Box::new(source));
    let session = processor.extract_session(&exclusions, remapper.as_ref()).await?;
    report(&session);

    match layout {
        Layout::Table => {
            let batch = session_table(&session)?;
            write_batch(&batch, output)?;
        }
        Layout::Sheet => {
            sheet::write_session(&session)?.save_csv(output)?;
        }
    }
    info!("Results written to {}", output.display());
    Ok(())
}

fn report(session: &Session) {
    let excluded = session.excluded().count();
    info!(
        "{}: {} trials, {} included, {} excluded",
        session.block_name,
        session.trial_count(),
        session.trial_count() - excluded,
        excluded
    );
    if session.trial_count() == 0 {
        warn!("No trials found in {}", session.block_name);
    }
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists. Use --force to overwrite.", path.display());
    }
    SessionConfig::default().save(path)?;
    info!("Default configuration written to {}", path.display());
    Ok(())
}

/// Exclusions are searched for in every ancestor, so relative paths must be resolved first
fn absolute(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))
}
