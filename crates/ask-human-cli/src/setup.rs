//! `setup` command — interactive prompts that write the config file.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use ask_human_core::config::{default_config_path, Config, DEFAULT_TIMEOUT_SECS};

pub fn run() -> Result<()> {
    let path = default_config_path()?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    run_with(&path, &mut input, &mut output)
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> Result<String> {
    write!(output, "{}", label)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("failed to read input")?;
    Ok(line.trim().to_string())
}

pub fn run_with<R: BufRead, W: Write>(path: &Path, input: &mut R, output: &mut W) -> Result<()> {
    if path.exists() {
        writeln!(output, "Configuration file already exists at: {}", path.display())?;
        let answer = prompt(input, output, "Do you want to overwrite it? (y/N): ")?.to_lowercase();
        if answer != "y" && answer != "yes" {
            writeln!(output, "Setup cancelled.")?;
            return Ok(());
        }
    }

    let slack_token = prompt(input, output, "Enter your Slack Bot Token (xoxb-...): ")?;
    let app_token = prompt(input, output, "Enter your Slack App Token (xapp-...): ")?;

    let mut default_channel = prompt(input, output, "Enter default channel (e.g., #general): ")?;
    if !default_channel.is_empty() && !default_channel.starts_with('#') {
        default_channel.insert(0, '#');
    }

    let raw_timeout = prompt(
        input,
        output,
        &format!("Enter default timeout in seconds (default: {}): ", DEFAULT_TIMEOUT_SECS),
    )?;
    let default_timeout = if raw_timeout.is_empty() {
        DEFAULT_TIMEOUT_SECS
    } else {
        match raw_timeout.parse::<u64>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                writeln!(
                    output,
                    "Invalid timeout, using default {} seconds",
                    DEFAULT_TIMEOUT_SECS
                )?;
                DEFAULT_TIMEOUT_SECS
            }
        }
    };

    let config = Config {
        slack_token,
        app_token,
        default_channel,
        default_timeout,
    };
    config.save(path)?;
    info!(path = %path.display(), "Config written");

    writeln!(output, "\nConfiguration saved to: {}", path.display())?;
    writeln!(output, "\nYou can now use ask-human-cli with:")?;
    writeln!(
        output,
        "  ask-human-cli ask --question \"Your question here\" --title \"Question title\""
    )?;
    Ok(())
}
