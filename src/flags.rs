//! Command line parsing
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(version, about, long_about = None)]
/// Screen dimming daemon. Darkens the screen below the backlight minimum with
/// a translucent overlay that follows the backlight brightness.
///
/// Send SIGUSR1 to toggle the overlay and SIGUSR2 to toggle automatic alpha.
pub struct Cli {
    /// Backlight device to follow, e.g. /sys/class/backlight/intel_backlight.
    #[clap(short, long = "backlight")]
    pub backlight_dir: Option<PathBuf>,
    /// Start with the overlay disabled.
    #[clap(long)]
    pub disabled: bool,
    /// Fixed overlay alpha in percent. Disables automatic alpha.
    #[clap(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub alpha: Option<u8>,
    /// Overlay tint as RRGGBB.
    #[clap(long, default_value = "ffffff", value_parser = parse_rgb)]
    pub tint: u32,
    /// Do not open an X11 window, only track state. Used automatically when
    /// no X server is reachable.
    #[clap(long)]
    pub headless: bool,
    /// Enable extra verbosity!
    #[clap(short, long)]
    pub verbose: bool,
    /// Timeout during startup for the backlight device to appear.
    ///
    /// This can help with late loaded kernel modules.
    #[clap(short, long)]
    pub wait: Option<u32>,
}

fn parse_rgb(s: &str) -> Result<u32, String> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 {
        return Err(format!("expected RRGGBB, got {s:?}"));
    }
    u32::from_str_radix(hex, 16).map_err(|e| format!("invalid colour {s:?}: {e}"))
}
