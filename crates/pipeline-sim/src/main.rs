//! Command-line entry point for the pipeline board simulator

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use pipeline_board::{classify, BoardConfig};
use pipeline_sim::{run_simulator, SimulatorConfig};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("pipeline-sim")
        .version(pipeline_board::VERSION)
        .about("Pipeline board move simulator")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run seeded random moves and check board invariants")
                .arg(
                    Arg::new("moves")
                        .long("moves")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of moves to simulate"),
                )
                .arg(
                    Arg::new("prospects")
                        .long("prospects")
                        .default_value("40")
                        .value_parser(value_parser!(usize))
                        .help("Number of prospects on the board"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.2")
                        .value_parser(value_parser!(f64))
                        .help("Probability that a stage update fails"),
                )
                .arg(
                    Arg::new("max-in-flight")
                        .long("max-in-flight")
                        .default_value("1")
                        .value_parser(value_parser!(usize))
                        .help("Largest number of moves applied before settling"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("PATH")
                        .help("Board configuration file (TOML)"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("classify")
                .about("Show the stage each status label maps to")
                .arg(Arg::new("labels").num_args(1..).required(true)),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_board_config(path: Option<&String>) -> anyhow::Result<BoardConfig> {
    let Some(path) = path else {
        return Ok(BoardConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    BoardConfig::from_toml_str(&text).with_context(|| format!("parsing {path}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulatorConfig {
                seed: *args.get_one::<u64>("seed").context("seed")?,
                moves: *args.get_one::<u64>("moves").context("moves")?,
                prospects: *args.get_one::<usize>("prospects").context("prospects")?,
                failure_rate: *args.get_one::<f64>("failure-rate").context("failure-rate")?,
                max_in_flight: *args
                    .get_one::<usize>("max-in-flight")
                    .context("max-in-flight")?,
                stop_on_first_violation: args.get_flag("stop-on-violation"),
                board: load_board_config(args.get_one::<String>("config"))?,
            };
            config.validate()?;
            tracing::info!(seed = config.seed, moves = config.moves, "Starting simulation");

            let report = run_simulator(config).await;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("classify", args)) => {
            for label in args.get_many::<String>("labels").into_iter().flatten() {
                let c = classify(label);
                let note = if c.fallback { " (fallback)" } else { "" };
                println!("{label:?} -> {}{note}", c.key);
            }
        }
        _ => {
            cli().print_help()?;
        }
    }

    Ok(())
}
