#![recursion_limit = "1024"]

use error_chain::quick_main;
use pidrec::errors::*;
use pidrec::pidfile::{self, DEFAULT_PIDFILE};
use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, serde::Serialize)]
struct Status<'a> {
    path: &'a Path,
    pid: u32,
}

#[derive(Debug, StructOpt)]
#[structopt(name = "pidrec", about = "Prints the pid stored in a pidfile")]
struct Arguments {
    /// Log what is happening to the pidfile.
    #[structopt(short, long)]
    verbose: bool,

    /// Pidfile location.
    #[structopt(long, env = "PIDREC_PIDFILE", parse(from_os_str))]
    pidfile: Option<PathBuf>,

    /// Print a JSON object instead of the bare pid.
    #[structopt(long)]
    json: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args = Arguments::from_args();
    init_logging(args.verbose);
    let path = args.pidfile.unwrap_or_else(|| DEFAULT_PIDFILE.clone());

    let pid = pidfile::read_pid(&path)?;
    if args.json {
        let status = serde_json::to_string(&Status { path: &path, pid })
            .chain_err(|| "Could not serialize pidfile status.")?;
        println!("{}", status);
    } else {
        println!("{}", pid);
    }
    Ok(())
}

quick_main!(run);
