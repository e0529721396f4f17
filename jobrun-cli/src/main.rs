mod commands;
mod output;

use std::ffi::OsString;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use commands::run::RunArgs;
use commands::summary::SummaryArgs;

/// Run and inspect job templates locally
#[derive(Parser, Debug)]
#[command(name = "jobrun", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a step of a job template in a local session
    Run(RunArgs),
    /// Describe a job template without running it
    Summary(SummaryArgs),
}

impl Cli {
    /// Parse arguments, keeping each `--task-params` occurrence as its own set
    fn try_parse_grouped<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        if let (Command::Run(run), Some(run_matches)) =
            (&mut cli.command, matches.subcommand_matches("run"))
        {
            run.group_task_params(run_matches);
        }
        Ok(cli)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::try_parse_grouped(std::env::args_os()).unwrap_or_else(|e| e.exit());
    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Summary(args) => commands::summary::execute(args),
    }
}
