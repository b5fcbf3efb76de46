//! Page relay setup helper.
//!
//! Asks for the webhook verify token, the listen port and the page id /
//! access token pairs, then writes `config.toml` to the project root
//! (`RELAY_ROOT`, or the current directory).

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    verify_token: &'a str,
    port: u16,
    pages: &'a [(String, String)],
    max_profiles: Option<usize>,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let verify_token = toml_string(p.verify_token);
    let port = p.port;

    let profiles_line = match p.max_profiles {
        Some(max) => format!("max_entries = {max}"),
        None => "# max_entries = 10000".to_owned(),
    };

    let mut out = format!(
        r#"[server]
host = "0.0.0.0"
port = {port}

[webhook]
verify_token = {verify_token}

[graph]
base_url = "https://graph.facebook.com"
api_version = "v19.0"

[profiles]
{profiles_line}
"#
    );

    for (id, token) in p.pages {
        out.push_str(&format!(
            "\n[[pages]]\nid = {}\naccess_token = {}\n",
            toml_string(id),
            toml_string(token)
        ));
    }

    out
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_owned()).to_string()
}

/// Parse `pageId=token` lines until an empty line.
fn parse_page_line(line: &str) -> Option<(String, String)> {
    let (id, token) = line.split_once('=')?;
    let (id, token) = (id.trim(), token.trim());
    if id.is_empty() || token.is_empty() {
        return None;
    }
    Some((id.to_owned(), token.to_owned()))
}

// ── Entry point ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let project_root =
        PathBuf::from(std::env::var("RELAY_ROOT").unwrap_or_else(|_| ".".to_string()));

    println!("=== Page Relay Setup ===\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        Ok(lines
            .next()
            .transpose()?
            .map(|l| l.trim().to_owned())
            .unwrap_or_default())
    };

    let verify_token = read_line("Webhook verify token: ")?;
    if verify_token.is_empty() {
        anyhow::bail!("A verify token is required");
    }

    let port_input = read_line("Port [3000]: ")?;
    let port: u16 = if port_input.is_empty() {
        3000
    } else {
        port_input
            .parse()
            .with_context(|| format!("Invalid port: {port_input}"))?
    };

    let max_input = read_line("Max cached profiles (empty = unbounded): ")?;
    let max_profiles = if max_input.is_empty() {
        None
    } else {
        Some(
            max_input
                .parse()
                .with_context(|| format!("Invalid number: {max_input}"))?,
        )
    };

    println!("Enter pages as pageId=accessToken, one per line, empty line to finish:");
    let mut pages = Vec::new();
    loop {
        let line = read_line("  page: ")?;
        if line.is_empty() {
            break;
        }
        match parse_page_line(&line) {
            Some(page) => pages.push(page),
            None => println!("  expected pageId=accessToken, skipped"),
        }
    }

    let config = format_config(&ConfigParams {
        verify_token: &verify_token,
        port,
        pages: &pages,
        max_profiles,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the relay with:  cargo run --bin page-relay");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
