use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, ValueHint};

mod bom;
mod classify;
mod convert;
mod encoding;
mod files;
mod interrupt;
mod logging;
mod rewrite;

use classify::ContentSniffer;
use convert::{RunStatus, run_conversion};
use logging::ChangeLog;

const INTERRUPTED_EXIT: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "utf8ify",
    version,
    about = "Rewrite legacy-encoded text files as UTF-8, in place"
)]
struct Cli {
    #[arg(value_name = "ROOT", default_value = "./input", value_hint = ValueHint::DirPath)]
    root: PathBuf,
    #[arg(value_name = "DEBUG")]
    debug: Option<String>,
    #[arg(long = "change-log", value_name = "FILE", value_hint = ValueHint::FilePath)]
    change_log: Option<PathBuf>,
}

impl Cli {
    fn debug_enabled(&self) -> bool {
        self.debug.as_deref() == Some("true")
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_tracing(cli.debug_enabled());
    run(cli)
}

fn run(cli: Cli) -> Result<ExitCode> {
    files::validate_root(&cli.root)?;
    interrupt::install()?;

    let change_log = cli.change_log.map(ChangeLog::new);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let status = run_conversion(
        &cli.root,
        &ContentSniffer,
        change_log.as_ref(),
        interrupt::requested,
        &mut out,
    )?;

    match status {
        RunStatus::Completed(_) => {
            writeln!(out, "Conversion complete.")?;
            Ok(ExitCode::SUCCESS)
        }
        RunStatus::Interrupted(_) => {
            writeln!(out, "Conversion interrupted.")?;
            Ok(ExitCode::from(INTERRUPTED_EXIT))
        }
    }
}
