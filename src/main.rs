use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use screenos_mikrotik::{ConvertOptions, Converter, SystemResolver, DEFAULT_ZONE};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "screenos-mikrotik")]
#[command(about = "Translate a ScreenOS configuration export into a RouterOS filter script")]
struct Cli {
    /// Configuration export to read; `-` or nothing reads stdin.
    input: Option<PathBuf>,
    /// Write the result to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Keep policies from or to this zone. Repeatable.
    #[arg(long = "zone", value_name = "ZONE", default_value = DEFAULT_ZONE)]
    zones: Vec<String>,
    /// Keep every policy regardless of zone.
    #[arg(long)]
    all_zones: bool,
    /// Write the parsed policies as JSON instead of the script.
    #[arg(long)]
    dump_json: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let text = read_input(cli.input.as_deref())?;

    let mut options = ConvertOptions::new();
    if !cli.all_zones {
        options = options.with_zones(cli.zones);
    }
    let converter = Converter::new(options, Box::new(SystemResolver::new()));

    // Nothing is written unless the whole run succeeds.
    let rendered = if cli.dump_json {
        let config = converter.parse(&text)?;
        let policies: Vec<_> = config.policies.iter().collect();
        let mut json = serde_json::to_string_pretty(&policies)?;
        json.push('\n');
        json
    } else {
        let conversion = converter.convert(&text)?;
        tracing::debug!(
            rules = conversion.rule_set.rule_count(),
            diagnostics = conversion.diagnostics().count(),
            "conversion finished"
        );
        conversion.script()
    };

    match &cli.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .and_then(|_| stdout.flush())
                .context("failed to write stdout")?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}
