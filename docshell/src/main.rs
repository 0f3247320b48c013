use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docshell::{
    memory::IdKind,
    session::{RunOptions, Session, ShellError},
};

#[derive(Debug, Parser)]
#[command(name = "docshell", version)]
#[command(about = "Replays shell-style document commands against in-memory databases")]
struct Args {
    /// Script with one JSON command per line; reads stdin when omitted
    script: Option<PathBuf>,

    /// Stop at the first failing command and exit with status 1
    #[arg(long)]
    fail_fast: bool,

    /// Kind of _id generated for documents inserted without one
    #[arg(long, value_enum, default_value_t = IdArg::ObjectId)]
    id_kind: IdArg,

    /// Pretty-print results
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IdArg {
    #[value(name = "objectid")]
    ObjectId,
    Uuid,
}

impl From<IdArg> for IdKind {
    fn from(arg: IdArg) -> Self {
        match arg {
            IdArg::ObjectId => IdKind::ObjectId,
            IdArg::Uuid => IdKind::Uuid,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let options = RunOptions {
        fail_fast: args.fail_fast,
        pretty: args.pretty,
    };

    let mut session = Session::new(args.id_kind.into());
    let mut out = io::stdout().lock();
    let mut errors = io::stderr();

    let result = match &args.script {
        Some(path) => match File::open(path) {
            Ok(file) => session.run(BufReader::new(file), &mut out, &mut errors, options).await,
            Err(err) => Err(ShellError::Io(err)),
        },
        None => session.run(io::stdin().lock(), &mut out, &mut errors, options).await,
    };

    match result {
        Ok(summary) => {
            debug!(executed = summary.executed, failed = summary.failed, "script finished");
            ExitCode::SUCCESS
        }
        // The failed command was already reported on stderr as JSON.
        Err(ShellError::Aborted { line, .. }) => {
            debug!(line, "script aborted");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("docshell: {err}");
            ExitCode::FAILURE
        }
    }
}
