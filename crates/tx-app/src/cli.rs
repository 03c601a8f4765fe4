//! Command-Line Interface

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

/// Extract per-tone spike counts from exported recording blocks
#[derive(Parser, Debug)]
#[command(name = "tankx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Session configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Output layouts
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// One row per trial, stimulus, channel and capture window
    #[default]
    Table,
    /// One block of cells per trial
    Sheet,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract spike counts from a block directory
    Extract {
        /// Block directory holding epocs.csv and snips.csv
        #[arg(short, long)]
        block: PathBuf,

        /// Output CSV file (defaults to a file inside the block directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output layout
        #[arg(short, long, value_enum, default_value_t = Layout::Table)]
        layout: Layout,

        /// Trial window start, in seconds relative to each trial onset
        #[arg(long, allow_hyphen_values = true)]
        from: Option<f64>,

        /// Trial window end, in seconds relative to each trial onset
        #[arg(long, allow_hyphen_values = true)]
        to: Option<f64>,

        /// Channel map file (otherwise looked up in the block directory)
        #[arg(long)]
        channel_map: Option<PathBuf>,

        /// Ignore exclusion files
        #[arg(long)]
        no_exclusions: bool,
    },

    /// Print the extraction parameters
    Summary,

    /// Write a default configuration file
    InitConfig {
        /// Destination of the configuration file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Default output file for a block: `<block>/<block name> - <layout>.csv`
pub fn default_output(block: &Path, layout: Layout) -> PathBuf {
    let name = block
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("block");
    let suffix = match layout {
        Layout::Table => "spike counts",
        Layout::Sheet => "spike count sheet",
    };
    block.join(format!("{} - {}.csv", name, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "tankx", "-v", "extract", "--block", "Block-1", "--from", "-5", "--to", "15", "--layout", "sheet",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Extract {
                block,
                from,
                to,
                layout,
                no_exclusions,
                ..
            } => {
                assert_eq!(block, PathBuf::from("Block-1"));
                assert_eq!(from, Some(-5.0));
                assert_eq!(to, Some(15.0));
                assert_eq!(layout, Layout::Sheet);
                assert!(!no_exclusions);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_config_is_global() {
        let cli = Cli::try_parse_from(["tankx", "summary", "--config", "session.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("session.json")));
        assert!(matches!(cli.command, Commands::Summary));
    }

    #[test]
    fn test_extract_requires_block() {
        assert!(Cli::try_parse_from(["tankx", "extract"]).is_err());
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/data/Block-3"), Layout::Table),
            PathBuf::from("/data/Block-3/Block-3 - spike counts.csv")
        );
    }
}
