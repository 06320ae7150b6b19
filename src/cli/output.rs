//! Colored terminal output for command results.
//!
//! Pipeline progress goes through `log`; this module prints what the user
//! asked for (bundle locations, migration summaries) and failures.

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::io::{self, IsTerminal, Write};

/// Writes styled messages to stdout and stderr.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
    stdout_choice: ColorChoice,
    stderr_choice: ColorChoice,
}

impl OutputManager {
    /// Creates an output manager. `quiet` suppresses everything except errors.
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            stdout_choice: color_choice(io::stdout().is_terminal()),
            stderr_choice: color_choice(io::stderr().is_terminal()),
        }
    }

    /// Whether verbose messages are printed.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Prints `message` dimmed, only in verbose mode.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if !self.is_verbose() {
            return Ok(());
        }
        let mut style = ColorSpec::new();
        style.set_dimmed(true);
        self.print(&style, "", message)
    }

    /// Prints a yellow warning to stderr.
    pub fn warn(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut style = ColorSpec::new();
        style.set_fg(Some(Color::Yellow)).set_bold(true);
        self.eprint(&style, "warning: ", message)
    }

    /// Prints a red error to stderr. Never suppressed.
    pub fn error(&self, message: &str) -> io::Result<()> {
        let mut style = ColorSpec::new();
        style.set_fg(Some(Color::Red)).set_bold(true);
        self.eprint(&style, "error: ", message)
    }

    /// Prints a green check mark followed by `message`.
    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut style = ColorSpec::new();
        style.set_fg(Some(Color::Green)).set_bold(true);
        self.print(&style, "✓ ", message)
    }

    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut style = ColorSpec::new();
        style.set_fg(Some(Color::Cyan));
        self.print(&style, "→ ", message)
    }

    /// Prints a bold section title.
    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut style = ColorSpec::new();
        style.set_bold(true).set_underline(true);
        let mut stdout = StandardStream::stdout(self.stdout_choice);
        writeln!(stdout)?;
        stdout.set_color(&style)?;
        write!(stdout, "{title}")?;
        stdout.reset()?;
        writeln!(stdout)
    }

    /// Prints `message` indented under the last section.
    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stdout = StandardStream::stdout(self.stdout_choice);
        writeln!(stdout, "  {message}")
    }

    fn print(&self, style: &ColorSpec, prefix: &str, message: &str) -> io::Result<()> {
        let mut stdout = StandardStream::stdout(self.stdout_choice);
        write_styled(&mut stdout, style, prefix, message)
    }

    fn eprint(&self, style: &ColorSpec, prefix: &str, message: &str) -> io::Result<()> {
        let mut stderr = StandardStream::stderr(self.stderr_choice);
        write_styled(&mut stderr, style, prefix, message)
    }
}

fn write_styled(
    stream: &mut impl WriteColor,
    style: &ColorSpec,
    prefix: &str,
    message: &str,
) -> io::Result<()> {
    stream.set_color(style)?;
    write!(stream, "{prefix}")?;
    if style.dimmed() {
        write!(stream, "{message}")?;
        stream.reset()?;
    } else {
        stream.reset()?;
        write!(stream, "{message}")?;
    }
    writeln!(stream)
}

fn color_choice(is_terminal: bool) -> ColorChoice {
    if is_terminal && std::env::var_os("NO_COLOR").is_none() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}
