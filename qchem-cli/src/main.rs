use std::{path::PathBuf, process::ExitCode, time::Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use qchem_core::{
    config::ConfigSystem,
    conventions,
    env::{Environment, OutputSink, Verbosity},
    hf::{Rhf, Uhf},
    method::{Method, Overrides},
    mp2::Mp2,
    system::ModelSystem,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: QcCommand,
}

#[derive(Subcommand, Debug)]
enum QcCommand {
    /// Closed-shell hartree fock
    #[command(name = "rhf")]
    RestrictedHartreeFock(RunArgs),
    /// Open-shell hartree fock
    #[command(name = "uhf")]
    UnrestrictedHartreeFock(RunArgs),
    /// MP2 correlation energy on top of a restricted hartree fock reference
    #[command(name = "mp2")]
    MollerPlesset {
        #[command(flatten)]
        run: RunArgs,
        /// Number of lowest occupied orbitals excluded from the correlation treatment
        #[arg(long, default_value_t = 0)]
        frozen: usize,
    },
    /// Checks every method surface against the naming convention
    #[command(name = "lint")]
    Lint,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// A path to the problem description (json)
    #[arg(long, short, required_unless_present = "env", conflicts_with = "env")]
    system: Option<PathBuf>,
    /// A path to an environment (json): the problem description together with
    /// verbosity, output and memory defaults. Other flags override its defaults.
    #[arg(long, short)]
    env: Option<PathBuf>,
    /// Verbosity of the output, from 0 (quiet) to 9
    #[arg(long, short, value_parser = clap::value_parser!(u8).range(0..=9))]
    verbose: Option<u8>,
    /// Write the output to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Memory budget in MB
    #[arg(long)]
    max_memory: Option<f64>,
    /// The maximum number of scf iterations before the calculation is considered
    /// to not converge
    #[arg(long)]
    max_cycle: Option<usize>,
    /// Converged once the energy changes by less than this between iterations
    #[arg(long)]
    conv_tol: Option<f64>,
    /// Print the result as json to stdout. Log lines go to stderr unless an
    /// output file is given.
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn environment(&self) -> anyhow::Result<Environment> {
        let mut env = match (&self.env, &self.system) {
            (Some(path), _) => Environment::load(path)
                .with_context(|| format!("could not load environment {}", path.display()))?,
            (None, Some(path)) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("could not open {}", path.display()))?;
                let config: ConfigSystem = serde_json::from_reader(std::io::BufReader::new(file))
                    .with_context(|| format!("could not parse {}", path.display()))?;
                Environment::new(ModelSystem::try_from(config)?)
            }
            (None, None) => anyhow::bail!("either --system or --env is required"),
        };
        log::info!(
            "loaded system {} ({} basis functions)",
            env.system().name(),
            env.system().n_basis()
        );

        if let Some(level) = self.verbose {
            env.set_verbosity(Verbosity::try_from(level)?);
        }
        if let Some(path) = &self.output {
            env.set_output(OutputSink::file(path)?);
        } else if self.json && self.env.is_none() {
            // keep stdout for the json document
            env.set_output(OutputSink::stderr());
        }
        if let Some(max_memory) = self.max_memory {
            env.set_max_memory(max_memory)?;
        }
        Ok(env)
    }

    fn rhf(&self, env: &Environment) -> anyhow::Result<Rhf> {
        let mut rhf = Rhf::new(env)?;
        if let Some(max_cycle) = self.max_cycle {
            rhf.set_max_cycle(max_cycle);
        }
        if let Some(conv_tol) = self.conv_tol {
            rhf.set_conv_tol(conv_tol)?;
        }
        Ok(rhf)
    }

    fn report<T: Serialize>(&self, output: &T) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(output)?);
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<ExitCode> {
    pretty_env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        QcCommand::RestrictedHartreeFock(args) => {
            let env = args.environment()?;
            let mut rhf = args.rhf(&env)?;

            let start = Instant::now();
            let output = rhf.kernel()?;
            log::info!(
                "hartree fock converged after {} iterations and {:0.2?}",
                output.iterations,
                start.elapsed()
            );
            rhf.analyze()?;
            rhf.output().flush()?;
            args.report(&*output)?;
        }

        QcCommand::UnrestrictedHartreeFock(args) => {
            let env = args.environment()?;
            let mut uhf = Uhf::new(&env)?;
            if let Some(max_cycle) = args.max_cycle {
                uhf.set_max_cycle(max_cycle);
            }
            if let Some(conv_tol) = args.conv_tol {
                uhf.set_conv_tol(conv_tol)?;
            }

            let start = Instant::now();
            let output = uhf.kernel()?;
            log::info!(
                "hartree fock converged after {} iterations and {:0.2?}",
                output.iterations,
                start.elapsed()
            );
            uhf.analyze()?;
            uhf.output().flush()?;
            args.report(&*output)?;
        }

        QcCommand::MollerPlesset { run: args, frozen } => {
            let env = args.environment()?;
            let mut rhf = args.rhf(&env)?;
            rhf.kernel()?;

            let mut mp2 = Mp2::new(&rhf)?;
            mp2.set_frozen(frozen);
            let output = mp2.kernel()?;
            mp2.output().flush()?;
            args.report(&*output)?;
        }

        QcCommand::Lint => {
            let mut n_violations = 0;
            for (type_name, operations, violations) in conventions::surfaces() {
                println!("{type_name}");
                for operation in operations {
                    println!("    {:<24} {}", operation.name, operation.capability());
                }
                for violation in &violations {
                    eprintln!("error: {violation}");
                }
                n_violations += violations.len();
            }

            if n_violations > 0 {
                eprintln!("{n_violations} operations violate the naming convention");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
