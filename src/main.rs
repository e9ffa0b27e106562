//! Jinks Templates CLI
//!
//! Usage:
//!   jinks-templates [OPTIONS] [FILE]
//!
//! Options:
//!   -c, --config <FILE>   Engine configuration (TOML format)
//!   -s, --sandbox <DIR>   Directory includes are resolved against
//!   -r, --raw             Print only the rendered text
//!   -v, --verbose         Debug logging and annotated template errors
//!   -h, --help            Print help

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jinks_templates::{Diagnostic, Engine, EngineConfig, RenderRequest, Response};

#[derive(Parser)]
#[command(name = "jinks-templates")]
#[command(about = "Render templates from JSON render requests")]
struct Cli {
    /// JSON request file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Engine configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sandbox root for includes, overriding the configuration
    #[arg(short, long)]
    sandbox: Option<PathBuf>,

    /// Print only the rendered text instead of the JSON response
    #[arg(short, long)]
    raw: bool,

    /// Debug logging and annotated template errors on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // If no input file and stdin is a terminal (interactive), show intro help
    if cli.input.is_none() && io::stdin().is_terminal() {
        print_intro();
        return;
    }

    let mut config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(root) = &cli.sandbox {
        config = config.with_sandbox_root(root);
    }

    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Read input
    let body = match &cli.input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => buffer,
                Err(e) => {
                    eprintln!("Error reading from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let result = RenderRequest::from_json(&body)
        .map_err(Diagnostic::from)
        .and_then(|request| {
            engine.render_request(&request).inspect_err(|diag| {
                if cli.verbose {
                    print_report(diag, &request);
                }
            })
        });

    let response = Response::from(result);
    if cli.raw {
        match response.result() {
            Some(text) => print!("{}", text),
            None => {
                let message = response.body["message"].as_str().unwrap_or("render failed");
                eprintln!("Error: {}", message);
            }
        }
    } else {
        println!("{}", response.body_string());
    }

    if !response.is_success() {
        std::process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` overrides the level chosen by `--verbose`
fn init_logging(verbose: bool) {
    let default = if verbose { "jinks_templates=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Annotate errors located in the request's own template
fn print_report(diag: &Diagnostic, request: &RenderRequest) {
    if diag.origin.is_some() {
        return;
    }
    if let (Some(template), Some(_)) = (&request.template, &diag.span) {
        eprintln!("{}", diag.report(template, "template"));
    }
}

fn print_intro() {
    println!(
        r#"Jinks Templates - render templates from JSON requests

USAGE:
    jinks-templates [OPTIONS] [FILE]
    echo '<request>' | jinks-templates

OPTIONS:
    -c, --config    Engine configuration (TOML file)
    -s, --sandbox   Directory includes are resolved against
    -r, --raw       Print only the rendered text
    -v, --verbose   Debug logging and annotated template errors
    -h, --help      Print help

REQUEST:
    {{"template": "<p>[[ $name ]]</p>", "params": {{"name": "World"}}, "mode": "html"}}

TEMPLATE SYNTAX:
    [[ $name ]]                    Interpolate a parameter
    [% if $a %] [% elif $b %]      Conditional branches
    [% else %] [% endif %]
    [% include "parts/nav.html" %] Include a file below the sandbox root

MODES:
    html      Escape & < > " ' in interpolated values
    css       Insert values verbatim
    xquery    Insert values verbatim
    anything else selects the default xml mode (verbatim)"#
    );
}
