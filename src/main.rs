use anyhow::Context;
use tracing::info;

use mailrules::config::Config;
use mailrules::parse::{ParseOptions, parse};

/// Parse a rule file and print the rules. The mailbox watch loop lives in
/// the library (`watch::run`) behind the `MailboxClient` seam; this binary
/// validates rule files before they are deployed against a mailbox.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env();
    let opts = config
        .as_ref()
        .map(Config::parse_options)
        .unwrap_or_else(ParseOptions::default);

    let path = std::env::args()
        .nth(1)
        .or(config.map(|c| c.rules_file))
        .context("usage: mailrules <rules-file> (or set MAILRULES_RULES_FILE)")?;

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("read rules file {path}"))?;
    let rules = parse(&text, &opts).with_context(|| format!("parse rules file {path}"))?;

    info!("Parsed {} rule(s) from {}", rules.len(), path);
    for rule in &rules {
        info!("* {rule}");
    }
    Ok(())
}
