mod colour;
mod config;
mod feed;
mod overlay;

use crate::colour::Colour;
use crate::config::{ExclusiveZone, LayerArg, OverlayConfig, Position};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "wayout")]
#[command(about = "Display text from a feed or a clock on a Wayland layer-shell overlay")]
#[command(version)]
pub struct Cli {
    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Surface width
    #[arg(long, default_value = "320", value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    /// Surface height
    #[arg(long, default_value = "240", value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Where on the output to place the surface
    #[arg(long, value_enum, default_value = "center")]
    pub position: Position,

    /// Layer to place the surface on
    #[arg(long, value_enum, default_value = "bottom")]
    pub layer: LayerArg,

    /// Margin on every edge
    #[arg(long, value_parser = clap::value_parser!(i32).range(0..))]
    pub margin: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    pub margin_top: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    pub margin_right: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    pub margin_bottom: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    pub margin_left: Option<i32>,

    /// true, false, stationary or a size in pixels
    #[arg(
        long,
        default_value = "stationary",
        value_parser = ExclusiveZone::parse,
        allow_hyphen_values = true
    )]
    pub exclusive_zone: ExclusiveZone,

    /// Layer namespace
    #[arg(long, default_value = "wayout")]
    pub namespace: String,

    /// Receive pointer input instead of passing it through
    #[arg(long)]
    pub input: bool,

    /// Output name, or "all"
    #[arg(long)]
    pub output: Option<String>,

    #[arg(
        long,
        alias = "background-color",
        default_value = "#00000000",
        value_parser = Colour::parse
    )]
    pub background_colour: Colour,

    #[arg(
        long,
        alias = "border-color",
        default_value = "#000000",
        value_parser = Colour::parse
    )]
    pub border_colour: Colour,

    #[arg(
        long,
        aliases = ["text-color", "foreground-colour", "foreground-color"],
        default_value = "#ffffff",
        value_parser = Colour::parse
    )]
    pub text_colour: Colour,

    /// Border width on every edge
    #[arg(long)]
    pub border_size: Option<u32>,

    #[arg(long)]
    pub border_top: Option<u32>,

    #[arg(long)]
    pub border_right: Option<u32>,

    #[arg(long)]
    pub border_bottom: Option<u32>,

    #[arg(long)]
    pub border_left: Option<u32>,

    /// Radius of every corner
    #[arg(long)]
    pub corner_radius: Option<u32>,

    #[arg(long)]
    pub radius_top_left: Option<u32>,

    #[arg(long)]
    pub radius_top_right: Option<u32>,

    #[arg(long)]
    pub radius_bottom_right: Option<u32>,

    #[arg(long)]
    pub radius_bottom_left: Option<u32>,

    /// Font pattern, e.g. "Monospace Bold 26"
    #[arg(long, default_value = "Monospace 26")]
    pub font: String,

    #[arg(long, hide = true)]
    pub fontsize: Option<String>,

    #[arg(long, hide = true)]
    pub textalign: Option<String>,

    /// Center text lines
    #[arg(long)]
    pub center: bool,

    /// Do not wrap long lines
    #[arg(short = 'w', long)]
    pub no_wrap: bool,

    /// Show each input line as it arrives
    #[arg(short = 'l', long, conflicts_with_all = ["feed_par", "feed_delimiter"])]
    pub feed_line: bool,

    /// Show input paragraphs separated by blank lines
    #[arg(short = 'p', long, conflicts_with = "feed_delimiter")]
    pub feed_par: bool,

    /// Show input blocks separated by a line equal to TOKEN
    #[arg(short = 'd', long, value_name = "TOKEN", allow_hyphen_values = true)]
    pub feed_delimiter: Option<String>,

    /// Redraw interval in milliseconds when reading input
    #[arg(
        short,
        long,
        default_value = "1000",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = OverlayConfig::from_cli(cli).context("invalid configuration")?;
    debug!(?config, "configuration");
    overlay::run_overlay(config)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are reported through the error path too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_and_version_are_not_failures() {
        let help = Cli::try_parse_from(["wayout", "--help"]).unwrap_err();
        assert!(!help.use_stderr());
        let version = Cli::try_parse_from(["wayout", "-V"]).unwrap_err();
        assert!(!version.use_stderr());
        let bad = Cli::try_parse_from(["wayout", "--bogus"]).unwrap_err();
        assert!(bad.use_stderr());
    }

    #[test]
    fn test_colour_aliases() {
        let cli = Cli::try_parse_from([
            "wayout",
            "--background-color",
            "rgba(1,2,3,4)",
            "--foreground-colour",
            "0x102030",
        ])
        .unwrap();
        assert_eq!(cli.background_colour, Colour::from_rgba8(1, 2, 3, 4));
        assert_eq!(cli.text_colour, Colour::from_rgba8(16, 32, 48, 255));
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["wayout", "-vvv"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_hyphen_values() {
        let cli = Cli::try_parse_from(["wayout", "-d", "---", "--exclusive-zone", "-5"]).unwrap();
        assert_eq!(cli.feed_delimiter.as_deref(), Some("---"));
        assert_eq!(cli.exclusive_zone, ExclusiveZone::Fixed(-5));
    }

    #[test]
    fn test_interval_must_be_positive() {
        assert!(Cli::try_parse_from(["wayout", "-i", "0"]).is_err());
        assert_eq!(Cli::try_parse_from(["wayout", "-i", "250"]).unwrap().interval, 250);
    }
}
