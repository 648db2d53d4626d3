#![forbid(unsafe_code)]

//! Command-line argument parsing for the counter demo.
//!
//! Parses args manually (no external dependencies) to keep the binary lean.
//! Supports environment variable overrides via `REFRAIN_DEMO_*` prefix.

use std::env;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
Refrain Counter Demo: refreshable regions driven from a script

USAGE:
    refrain-demo-counter [OPTIONS]

OPTIONS:
    --clicks=N           Counter clicks to simulate (default: 3)
    --widgets=N          Bound tally widgets to mount (default: 2)
    --no-feed            Skip the async feed stage
    --quiet              Suppress tree dumps, keep stage summaries
    --help, -h           Show this help message
    --version, -V        Show version

STAGES:
    1  Counter      One refreshable region, clicks through state setters
    2  Widgets      Bound instances refreshing independently
    3  Feed         Async rebuilds deferred until the loop starts

ENVIRONMENT VARIABLES:
    REFRAIN_DEMO_CLICKS    Override --clicks
    REFRAIN_DEMO_WIDGETS   Override --widgets
    REFRAIN_DEMO_FEED      Run the feed stage (0/false to skip)
    REFRAIN_DEMO_QUIET     Override --quiet (1/true to enable)";

/// Parsed command-line options.
pub struct Opts {
    /// Counter clicks to simulate.
    pub clicks: u32,
    /// Number of bound tally widgets.
    pub widgets: usize,
    /// Whether the async feed stage runs.
    pub feed: bool,
    /// Suppress tree dumps.
    pub quiet: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            clicks: 3,
            widgets: 2,
            feed: true,
            quiet: false,
        }
    }
}

impl Opts {
    /// Parse command-line arguments and environment variables.
    ///
    /// Environment variables take precedence over defaults but are overridden
    /// by explicit command-line flags.
    pub fn parse() -> Self {
        let mut opts = Self::default();

        // Apply environment variable defaults first
        if let Ok(val) = env::var("REFRAIN_DEMO_CLICKS")
            && let Ok(n) = val.parse()
        {
            opts.clicks = n;
        }
        if let Ok(val) = env::var("REFRAIN_DEMO_WIDGETS")
            && let Ok(n) = val.parse()
        {
            opts.widgets = n;
        }
        if let Ok(val) = env::var("REFRAIN_DEMO_FEED") {
            opts.feed = !(val == "0" || val.eq_ignore_ascii_case("false"));
        }
        if let Ok(val) = env::var("REFRAIN_DEMO_QUIET") {
            opts.quiet = val == "1" || val.eq_ignore_ascii_case("true");
        }

        // Parse command-line args (override env vars)
        let args: Vec<String> = env::args().skip(1).collect();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => {
                    println!("{HELP_TEXT}");
                    process::exit(0);
                }
                "--version" | "-V" => {
                    println!("refrain-demo-counter {VERSION}");
                    process::exit(0);
                }
                "--no-feed" => {
                    opts.feed = false;
                }
                "--quiet" => {
                    opts.quiet = true;
                }
                other => {
                    if let Some(val) = other.strip_prefix("--clicks=") {
                        match val.parse() {
                            Ok(n) => opts.clicks = n,
                            Err(_) => {
                                eprintln!("Invalid --clicks value: {val}");
                                process::exit(1);
                            }
                        }
                    } else if let Some(val) = other.strip_prefix("--widgets=") {
                        match val.parse() {
                            Ok(n) => opts.widgets = n,
                            Err(_) => {
                                eprintln!("Invalid --widgets value: {val}");
                                process::exit(1);
                            }
                        }
                    } else {
                        eprintln!("Unknown argument: {other}");
                        eprintln!("Run with --help for usage.");
                        process::exit(1);
                    }
                }
            }
            i += 1;
        }

        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = Opts::default();
        assert_eq!(opts.clicks, 3);
        assert_eq!(opts.widgets, 2);
        assert!(opts.feed);
        assert!(!opts.quiet);
    }

    #[test]
    fn help_text_lists_every_stage() {
        assert!(HELP_TEXT.contains("1  Counter"));
        assert!(HELP_TEXT.contains("2  Widgets"));
        assert!(HELP_TEXT.contains("3  Feed"));
    }

    #[test]
    fn help_text_contains_env_vars() {
        assert!(HELP_TEXT.contains("REFRAIN_DEMO_CLICKS"));
        assert!(HELP_TEXT.contains("REFRAIN_DEMO_WIDGETS"));
        assert!(HELP_TEXT.contains("REFRAIN_DEMO_FEED"));
        assert!(HELP_TEXT.contains("REFRAIN_DEMO_QUIET"));
    }
}
