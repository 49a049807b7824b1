//! The `mpish` command line shell.
//!
//! Runs a script file, a single `-e` command, or an interactive prompt,
//! with the script arguments exposed as `$argv0`, `$argv`, and `$argc`.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;
use flexi_logger::{DeferredNow, Logger, Record};
use log::error;

use mpish::{default_backend, Interp, Shell};

static LAUNCHER_RANK: OnceLock<String> = OnceLock::new();

/// Rank of this process as reported by the MPI launcher environment.
/// Unset for plain single-process runs.
fn launcher_rank() -> Option<String> {
    ["PMI_RANK", "OMPI_COMM_WORLD_RANK", "SLURM_PROCID"]
        .iter()
        .find_map(|key| std::env::var(key).ok())
}

/// Log line format; parallel runs get a rank discriminant so
/// interleaved stderr from mpiexec stays attributable.
fn log_format(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    match LAUNCHER_RANK.get() {
        Some(rank) => write!(
            w,
            "[rank {rank}] {} [{}] {}",
            record.level(),
            record.target(),
            record.args()
        ),
        None => write!(w, "{} [{}] {}", record.level(), record.target(), record.args()),
    }
}

#[derive(Parser, Debug)]
#[command(name = "mpish", version, about = "MPI message passing for scripts")]
struct Cli {
    /// Script file to run; starts an interactive prompt when omitted.
    script: Option<PathBuf>,

    /// Arguments passed to the script as $argv.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Evaluate a single command and exit.
    #[arg(short = 'e', long = "eval", conflicts_with = "script")]
    eval: Option<String>,

    /// Log level: error, warn, info, debug, or trace.
    #[arg(long, default_value = "warn")]
    log: String,
}

fn run(cli: Cli) -> mpish::Result<()> {
    let mut interp = Interp::new(default_backend());

    let argv0 = cli
        .script
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "mpish".to_string());
    interp.set_var("argv0", argv0);
    interp.set_var("argc", cli.args.len().to_string());
    interp.set_var("argv", cli.args.join(" "));
    interp.set_argv(cli.args.clone());

    let mut shell = Shell::new(interp);

    if let Some(command) = cli.eval {
        let result = shell.eval_script(&command)?;
        if !result.is_empty() {
            println!("{result}");
        }
        return Ok(());
    }

    if let Some(script) = cli.script {
        shell.run_file(&script)?;
        return Ok(());
    }

    repl(&mut shell)
}

/// Read-eval-print loop on stdin. Errors are printed and the prompt
/// continues, matching interactive shell behavior.
fn repl(shell: &mut Shell) -> mpish::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("% ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        match shell.eval_script(&line) {
            Ok(result) if !result.is_empty() => println!("{result}"),
            Ok(_) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Some(rank) = launcher_rank() {
        let _ = LAUNCHER_RANK.set(rank);
    }
    let _logger = match Logger::try_with_str(&cli.log)
        .map(|l| l.format(log_format))
        .and_then(|l| l.start())
    {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("mpish: cannot start logger: {err}");
            None
        }
    };

    if let Err(err) = run(cli) {
        error!("fatal: {err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}
