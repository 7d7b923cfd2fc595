use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing_subscriber::EnvFilter;

use crate::convert::ConversionOutcome;

const MAX_ENTRIES: usize = 500;

pub fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("utf8ify=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

#[derive(Debug, Serialize)]
pub struct ChangeLogEntry<'a> {
    pub timestamp: &'a str,
    pub path: &'a Path,
    pub outcome: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
    max_entries: usize,
}

impl ChangeLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_entries: MAX_ENTRIES,
        }
    }

    pub fn record(&self, file: &Path, outcome: &ConversionOutcome) -> Result<()> {
        self.ensure_parent()?;
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".into());
        let entry = ChangeLogEntry {
            timestamp: &timestamp,
            path: file,
            outcome: outcome.label(),
            encoding: outcome.encoding(),
        };
        let json = serde_json::to_string(&entry)?;
        let mut log = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        writeln!(log, "{json}")?;
        self.truncate()?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        Ok(())
    }

    fn truncate(&self) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let reader = BufReader::new(file);
        let lines: Vec<_> = reader.lines().collect::<Result<_, _>>()?;
        if lines.len() <= self.max_entries {
            return Ok(());
        }
        let keep = &lines[lines.len() - self.max_entries..];
        fs::write(&self.path, keep.join("\n") + "\n")?;
        Ok(())
    }
}
