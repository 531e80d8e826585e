//! Command-line front end: parse a rule file, run an analysis or a
//! transformation pass, print the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rulescope::dataflow::reachability::{ArgReachability, ArgReachabilityCtx};
use rulescope::dataflow::tuple_set::{TupleSet, TupleSetCtx};
use rulescope::dataflow::DataflowEngine;
use rulescope::parser::parse_program;
use rulescope::transforms::{CoiArgFilter, Pipeline, RuleExploder};
use rulescope::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rulescope", version, about = "Static analysis and specialization for Datalog rule sets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an analysis and print the derived facts.
    Analyze {
        /// Rule file.
        file: PathBuf,
        /// Which abstract domain to run.
        #[arg(long, value_enum, default_value = "reachability")]
        domain: Domain,
        /// Run the top-down analysis instead of bottom-up.
        #[arg(long)]
        top_down: bool,
    },
    /// Apply a transformation pass and print the new rule set.
    Transform {
        /// Rule file.
        file: PathBuf,
        /// Which pass to apply.
        #[arg(long, value_enum, default_value = "coi-filter")]
        pass: Pass,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum Domain {
    Reachability,
    TupleSet,
}

#[derive(Copy, Clone, ValueEnum)]
enum Pass {
    CoiFilter,
    Exploder,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();

    match cli.command {
        Command::Analyze {
            file,
            domain,
            top_down,
        } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let program = parse_program(&source)?;
            match domain {
                Domain::Reachability => {
                    let mut engine = DataflowEngine::<ArgReachability>::new(
                        ArgReachabilityCtx::new(),
                        &program.store,
                        &program.syms,
                        &program.rules,
                    );
                    if top_down {
                        engine.run_top_down();
                    } else {
                        engine.run_bottom_up();
                    }
                    print!("{}", engine.dump());
                }
                Domain::TupleSet => {
                    let mut engine = DataflowEngine::<TupleSet>::new(
                        TupleSetCtx::new(config.analysis.tuple_cutoff),
                        &program.store,
                        &program.syms,
                        &program.rules,
                    );
                    if top_down {
                        engine.run_top_down();
                    } else {
                        engine.run_bottom_up();
                    }
                    print!("{}", engine.dump());
                }
            }
        }
        Command::Transform { file, pass } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut program = parse_program(&source)?;
            let mut pipeline = Pipeline::new();
            let result = match pass {
                Pass::CoiFilter => {
                    let mut filter = CoiArgFilter::new();
                    pipeline.apply(
                        &mut filter,
                        &mut program.store,
                        &mut program.syms,
                        &program.rules,
                    )
                }
                Pass::Exploder => {
                    let mut exploder = RuleExploder::new(config.analysis.exploder_threshold);
                    pipeline.apply(
                        &mut exploder,
                        &mut program.store,
                        &mut program.syms,
                        &program.rules,
                    )
                }
            };
            print!("{}", result.display(&program.store, &program.syms));
        }
    }
    Ok(())
}
