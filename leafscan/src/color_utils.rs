//! Color and styling utilities with support for NO_COLOR and TERM environment variables.
//!
//! Colored output is turned off by any of:
//! - `--no-color` CLI flag
//! - `NO_COLOR` environment variable (https://no-color.org/)
//! - `LEAFSCAN_NO_COLOR` environment variable
//! - `TERM=dumb`
//! - stderr not being a TTY

use colored::ColoredString;
use std::io::{stderr, IsTerminal};
use std::sync::OnceLock;

static COLOR_CONFIG: OnceLock<ColorConfig> = OnceLock::new();

fn env_set(name: &str) -> bool {
    !std::env::var(name).unwrap_or_default().is_empty()
}

/// Check environment variables and TTY state for color support
fn should_disable_colors_from_env() -> bool {
    env_set("NO_COLOR")
        || env_set("LEAFSCAN_NO_COLOR")
        || std::env::var("TERM").unwrap_or_default() == "dumb"
        // Log messages go to stderr
        || !stderr().is_terminal()
}

#[derive(Debug, Clone)]
struct ColorConfig {
    colors_enabled: bool,
}

impl ColorConfig {
    fn new(no_color_flag: bool) -> Self {
        let colors_enabled = !no_color_flag && !should_disable_colors_from_env();
        Self { colors_enabled }
    }

    fn is_enabled(&self) -> bool {
        self.colors_enabled
    }
}

/// Initialize the color configuration with the CLI flag state.
/// Call once at startup after parsing CLI arguments.
pub fn init_color_config(no_color_flag: bool) {
    let config = ColorConfig::new(no_color_flag);
    if !config.is_enabled() {
        colored::control::set_override(false);
    }
    COLOR_CONFIG.set(config).unwrap_or_else(|_| {
        eprintln!("Warning: Color configuration already initialized");
    });
}

fn colors_enabled() -> bool {
    COLOR_CONFIG
        .get()
        .map(|config| config.is_enabled())
        .unwrap_or_else(|| !should_disable_colors_from_env())
}

/// Apply color to a string only if colors are enabled for stderr output
pub fn maybe_color_stderr<F>(text: &str, color_fn: F) -> String
where
    F: FnOnce(&str) -> ColoredString,
{
    if colors_enabled() {
        color_fn(text).to_string()
    } else {
        text.to_string()
    }
}

/// Semantic color functions for log levels
pub mod colors {
    use super::maybe_color_stderr;
    use colored::Colorize;

    pub fn error_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.red().bold())
    }

    pub fn warning_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.yellow())
    }

    pub fn info_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.green())
    }

    pub fn debug_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.blue())
    }

    pub fn trace_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.magenta())
    }
}

/// Semantic symbols for different operation types and states
pub mod symbols {
    use super::colors_enabled;

    fn pick(emoji: &'static str, plain: &'static str) -> &'static str {
        if colors_enabled() {
            emoji
        } else {
            plain
        }
    }

    /// Symbol for starting a lesion analysis run
    pub fn lesion_analysis_start() -> &'static str {
        pick("🍃 ", "")
    }

    /// Symbol for finding/targeting resources
    pub fn resources_found() -> &'static str {
        pick("🎯 ", "")
    }

    pub fn operation_failed() -> &'static str {
        pick("❌ ", "[FAILED] ")
    }

    pub fn completed_successfully() -> &'static str {
        pick("✅ ", "[SUCCESS] ")
    }

    /// Symbol for partial success (some successes, some failures)
    pub fn completed_partially_successfully() -> &'static str {
        pick("⚠️  ", "[PARTIAL-SUCCESS] ")
    }

    pub fn warning() -> &'static str {
        pick("⚠️  ", "")
    }
}

/// Progress bar utilities that respect TTY state
pub mod progress {
    use super::colors_enabled;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::io::{stderr, IsTerminal};

    /// Progress bar for a batch run, only for multiple items on an interactive stderr
    pub fn create_batch_progress_bar(total: usize) -> Option<ProgressBar> {
        if total <= 1 || !stderr().is_terminal() {
            return None;
        }

        let (template, chars) = if colors_enabled() {
            ("[{elapsed_precise}] [{bar:30.green/black}] {pos}/{len} {msg}", "█▓▒░")
        } else {
            ("[{elapsed_precise}] [{bar:30}] {pos}/{len} {msg}", "#> ")
        };
        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(chars);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(pb)
    }
}
