//! # Terminal Output
//!
//! Status lines printed by the `chart-sync` commands. Colour and emoji are
//! used only when the terminal and the user allow it:
//!
//! - `--color=always|never|auto`
//! - `NO_COLOR` (any value) disables colour in auto mode
//! - `CLICOLOR=0` disables, `CLICOLOR_FORCE=1` forces
//! - `TERM=dumb` disables
//!
//! ```rust,ignore
//! let out = OutputConfig::from_choice(ColorChoice::Auto);
//! println!("{}", out.line(Mark::Ok, "metafile is valid"));
//! ```

use std::env;

use clap::ValueEnum;
use console::style;

/// Value of the `--color` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

/// Kind of status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Ok,
    Warn,
    Err,
    Info,
    Push,
}

impl Mark {
    fn emoji(self) -> &'static str {
        match self {
            Mark::Ok => "✅",
            Mark::Warn => "⚠️",
            Mark::Err => "❌",
            Mark::Info => "📋",
            Mark::Push => "🚀",
        }
    }

    fn plain(self) -> &'static str {
        match self {
            Mark::Ok => "[OK]",
            Mark::Warn => "[WARN]",
            Mark::Err => "[ERR]",
            Mark::Info => "[INFO]",
            Mark::Push => "[PUSH]",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    pub fn from_choice(choice: ColorChoice) -> Self {
        let use_color = match choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => Self::terminal_wants_color(),
        };
        Self { use_color }
    }

    fn terminal_wants_color() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| !v.is_empty() && v != "0") {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    /// Prefix for a status line: an emoji, or a bracketed tag without colour.
    pub fn mark(&self, mark: Mark) -> &'static str {
        if self.use_color {
            mark.emoji()
        } else {
            mark.plain()
        }
    }

    /// One formatted status line.
    pub fn line(&self, mark: Mark, message: &str) -> String {
        if !self.use_color {
            return format!("{} {}", mark.plain(), message);
        }
        let styled = match mark {
            Mark::Ok | Mark::Push => style(message).green(),
            Mark::Warn => style(message).yellow(),
            Mark::Err => style(message).red().bold(),
            Mark::Info => style(message).cyan(),
        };
        format!("{} {}", mark.emoji(), styled.force_styling(true))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_choice(ColorChoice::Auto)
    }
}
