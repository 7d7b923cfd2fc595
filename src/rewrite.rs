use std::fs::Permissions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::Builder;

pub const SCRATCH_PREFIX: &str = ".utf8ify-";

pub fn replace_contents(path: &Path, data: &[u8], permissions: &Permissions) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut scratch = Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile_in(dir)
        .with_context(|| format!("creating scratch file in {}", dir.display()))?;
    scratch
        .write_all(data)
        .with_context(|| format!("writing scratch file {}", scratch.path().display()))?;
    scratch
        .as_file()
        .sync_all()
        .with_context(|| format!("syncing scratch file {}", scratch.path().display()))?;
    scratch
        .as_file()
        .set_permissions(permissions.clone())
        .with_context(|| format!("setting permissions on {}", scratch.path().display()))?;

    scratch
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
