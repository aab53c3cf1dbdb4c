use std::time::Duration;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use pyproj_core::{Config, ExecutionOutcome, GlobalOptions};
use serde_json::Value;

mod cli;
mod dispatch;

use cli::PyprojCli;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PyprojCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet || cli.json);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        python: cli.python.clone(),
    };
    let mut config = Config::from_env().with_options(&global);
    if let Some(seconds) = cli.hook_timeout {
        config = config.with_hook_timeout((seconds > 0).then(|| Duration::from_secs(seconds)));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| eyre!("failed to start async runtime: {err}"))?;
    let outcome = runtime.block_on(dispatch::execute(config, &cli.command));
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 if quiet => "warn",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!(
        "pyproj={level},pyproj_core={level},pyproj_wheel={level},pyproj_python={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &PyprojCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();
    let command = cli.command.name();

    if cli.json {
        let payload = pyproj_core::to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    let message = pyproj_core::format_status_message(command, &outcome.message);
    if !outcome.is_success() {
        eprintln!("{message}");
    } else if !cli.quiet {
        println!("{message}");
        for warning in warnings(&outcome.details) {
            eprintln!("warning: {warning}");
        }
    }

    Ok(code)
}

fn warnings(details: &Value) -> Vec<&str> {
    details
        .get("warnings")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
