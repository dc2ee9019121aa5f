// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use pipedeck_app::AppState;
use runtime::{LiveRuntime, Seed};
use std::env;
use std::path::PathBuf;
use tracing::info;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `pipedeck --print-example-config` for a template",
            options.config_path.display()
        )
    })?;

    let seed_path = config.seed_path();
    let seed = match (&seed_path, options.empty) {
        (_, true) => Seed::Empty,
        (Some(path), false) => Seed::File(path),
        (None, false) => Seed::Builtin,
    };
    let records = runtime::load_seed(seed)?;

    let client = pipedeck_api::Client::new(config.base_url(), config.timeout()?).with_context(
        || {
            format!(
                "invalid [server] config in {}; fix base_url/timeout values",
                options.config_path.display()
            )
        },
    )?;
    let mut runtime = LiveRuntime::new(records, client, config.forward_submissions())?;
    if options.check_only {
        println!("config ok: {}", options.config_path.display());
        return Ok(());
    }

    let log_path = config.log_path()?;
    logging::init(&log_path, config.log_level())?;
    info!(
        base_url = config.base_url(),
        forward = config.forward_submissions(),
        "pipedeck starting"
    );

    let mut state = AppState {
        active_view: config.start_view(),
        ..AppState::default()
    };
    pipedeck_tui::run_app(&mut state, &mut runtime)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    empty: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        check_only: false,
        empty: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--empty" => {
                options.empty = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("pipedeck: pipeline table and airflow run selector");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config, seed file and server settings, then exit");
    println!("  --empty                  Start with an empty pipeline table");
    println!("  --help                   Show this help");
}
