use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rwaf_eval::{CandidatePolicy, Engine, EngineConfig, EngineMode, EvalError, Transaction};
use rwaf_parser::{RuleSet, parse_rules_path};

#[derive(Parser)]
#[command(name = "rwaf")]
#[command(about = "Parse, validate, and evaluate WAF rule files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a rule file or directory and print the rules as JSON
    Parse {
        /// Path to a rule YAML file or a directory of rule files
        path: PathBuf,

        /// Pretty-print JSON output
        #[arg(short, long, default_value_t = true)]
        pretty: bool,
    },

    /// Parse and compile rules, reporting every parse and configuration error
    Validate {
        /// Path to a rule YAML file or a directory of rule files
        path: PathBuf,

        /// List each error (not just the summary)
        #[arg(short, long)]
        verbose: bool,
    },

    /// Evaluate transactions against rules
    ///
    /// A transaction is a JSON object: scalar members are stored under their
    /// name, object members become collections (`{"args": {"id": "1"}}` is
    /// `ARGS:id`). Provide one with --tx, or NDJSON on stdin.
    Eval {
        /// Path to a rule YAML file or a directory of rule files
        #[arg(short, long)]
        rules: PathBuf,

        /// A single transaction as a JSON string (if omitted, reads NDJSON from stdin)
        #[arg(short, long)]
        tx: Option<String>,

        /// Engine mode
        #[arg(short, long, value_enum, default_value_t = ModeArg::On)]
        mode: ModeArg,

        /// Report every matching value of a rule instead of the first one
        #[arg(long)]
        all_matches: bool,

        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    On,
    DetectionOnly,
    Off,
}

impl From<ModeArg> for EngineMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::On => EngineMode::On,
            ModeArg::DetectionOnly => EngineMode::DetectionOnly,
            ModeArg::Off => EngineMode::Off,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { path, pretty } => cmd_parse(path, pretty),
        Commands::Validate { path, verbose } => cmd_validate(path, verbose),
        Commands::Eval {
            rules,
            tx,
            mode,
            all_matches,
            pretty,
        } => {
            let config = EngineConfig {
                mode: mode.into(),
                candidate_policy: if all_matches {
                    CandidatePolicy::AllMatches
                } else {
                    CandidatePolicy::FirstMatch
                },
            };
            cmd_eval(rules, tx, config, pretty)
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_parse(path: PathBuf, pretty: bool) {
    let set = load_rules(&path);
    print_warnings(&set.errors);
    print_json(&set, pretty);
}

fn cmd_validate(path: PathBuf, verbose: bool) {
    let set = load_rules(&path);
    let mut engine = Engine::new();
    let config_errors = match engine.add_collection(&set) {
        Ok(()) => Vec::new(),
        Err(EvalError::Configuration(errors)) => errors,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    println!("Parsed {} rules from {}", set.len(), path.display());
    println!("  Compiled:      {}", engine.rule_count());
    println!("  Parse errors:  {}", set.errors.len());
    println!("  Config errors: {}", config_errors.len());

    if verbose && !(set.errors.is_empty() && config_errors.is_empty()) {
        println!("\nErrors:");
        for err in &set.errors {
            println!("  - {err}");
        }
        for err in &config_errors {
            println!("  - {err}");
        }
    }

    if !set.errors.is_empty() || !config_errors.is_empty() {
        process::exit(1);
    }
}

fn cmd_eval(rules_path: PathBuf, tx_json: Option<String>, config: EngineConfig, pretty: bool) {
    let set = load_rules(&rules_path);
    let mut engine = Engine::with_config(config);
    if let Err(e) = engine.add_collection(&set) {
        eprintln!("Error compiling rules: {e}");
        process::exit(1);
    }

    eprintln!(
        "Loaded {} rules from {}",
        engine.rule_count(),
        rules_path.display()
    );

    if let Some(json_str) = tx_json {
        let value: serde_json::Value = match serde_json::from_str(&json_str) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Invalid JSON transaction: {e}");
                process::exit(1);
            }
        };

        let mut tx = Transaction::from_value("tx-1", &value);
        let result = engine.process(&mut tx);
        print_json(&result, pretty);
    } else {
        let stdin = io::stdin();
        let mut line_num = 0u64;
        let mut disrupted = 0u64;

        for line in stdin.lock().lines() {
            line_num += 1;
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    eprintln!("Error reading line {line_num}: {e}");
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let value: serde_json::Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Invalid JSON on line {line_num}: {e}");
                    continue;
                }
            };

            let mut tx = Transaction::from_value(format!("tx-{line_num}"), &value);
            let result = engine.process(&mut tx);
            if result.intervention.as_ref().is_some_and(|i| i.disruptive) {
                disrupted += 1;
            }
            print_json(&result, pretty);
        }

        eprintln!("Processed {line_num} transactions, {disrupted} disrupted.");
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_rules(path: &Path) -> RuleSet {
    let set = match parse_rules_path(path) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Error loading rules from {}: {e}", path.display());
            process::exit(1);
        }
    };
    log::debug!("parsed {} rules from {}", set.len(), path.display());

    if !set.errors.is_empty() {
        eprintln!(
            "Warning: {} parse errors while loading rules",
            set.errors.len()
        );
    }

    set
}

fn print_warnings(errors: &[String]) {
    if !errors.is_empty() {
        eprintln!("Warnings:");
        for err in errors {
            eprintln!("  - {err}");
        }
    }
}

fn print_json(value: &impl serde::Serialize, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match json {
        Ok(j) => println!("{j}"),
        Err(e) => {
            eprintln!("JSON serialization error: {e}");
            process::exit(1);
        }
    }
}
