#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn cli() -> Command {
    Command::new("ssn-sentinel")
        .version(VERSION)
        .about("SSN Sentinel - keep Social Security Numbers out of your prompts")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to ./sentinel.toml when present)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("model-path")
                .long("model-path")
                .value_name("PATH")
                .help("GGUF model file to load")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("tokenizer-path")
                .long("tokenizer-path")
                .value_name("PATH")
                .help("tokenizer.json (defaults to the model's directory)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("nothink")
                .long("nothink")
                .help("Disable model reasoning by default")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Host address to bind to")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to bind the server to")
                .value_parser(value_parser!(u16))
                .global(true),
        )
        .subcommand(Command::new("serve").about("Load the model and serve the web UI and HTTP API (default)"))
        .subcommand(
            Command::new("detect")
                .about("Run a single detection and print the report as JSON")
                .arg(
                    Arg::new("text")
                        .short('t')
                        .long("text")
                        .value_name("TEXT")
                        .help("Text to check (read from stdin when omitted)"),
                ),
        )
        .subcommand(Command::new("doctor").about("Check the model, memory and port before serving"))
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let (name, sub_matches) = matches.subcommand().unwrap_or(("serve", &matches));

    let result = match name {
        "serve" => commands::serve::run(sub_matches).await,
        "detect" => commands::detect::run(sub_matches).await,
        "doctor" => commands::doctor::run(sub_matches).await,
        other => Err(anyhow::anyhow!("unknown command: {}", other)),
    };

    if let Err(e) = result {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
