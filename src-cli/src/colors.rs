//! Terminal color support for CLI output.
//!
//! Styles apply only when the target stream is a terminal, so piped or
//! redirected output stays plain.

use owo_colors::OwoColorize;
use std::io::IsTerminal;

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn is_terminal(self) -> bool {
        match self {
            Stream::Stdout => std::io::stdout().is_terminal(),
            Stream::Stderr => std::io::stderr().is_terminal(),
        }
    }
}

fn paint(stream: Stream, msg: &str, style: impl FnOnce(&str) -> String) -> String {
    if stream.is_terminal() {
        style(msg)
    } else {
        msg.to_string()
    }
}

/// Error line for stderr.
pub fn error(msg: &str) -> String {
    format!(
        "{} {}",
        paint(Stream::Stderr, "error:", |s| s.red().bold().to_string()),
        msg
    )
}

/// Notice line for stderr (cancellations, hints).
pub fn notice(msg: &str) -> String {
    paint(Stream::Stderr, msg, |s| s.yellow().to_string())
}

pub fn success(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.green().to_string())
}

pub fn dim(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.dimmed().to_string())
}

pub fn header(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.bold().blue().to_string())
}

pub fn path(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.underline().to_string())
}

/// Selected content, e.g. `display:1`.
pub fn content(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.cyan().bold().to_string())
}

pub fn yes_no(value: bool) -> String {
    if value {
        paint(Stream::Stdout, "yes", |s| s.green().to_string())
    } else {
        paint(Stream::Stdout, "no", |s| s.dimmed().to_string())
    }
}
