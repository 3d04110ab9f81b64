use std::io;
use std::io::Write;
use std::path::PathBuf;

/// Embedded guest-side runner. Baked into the binary at compile time so
/// the supervisor needs nothing but a Python interpreter on `PATH`
/// (spec §4.3 step 1).
const GUEST_RUNNER_SOURCE: &str = include_str!("../guest/guest_runner.py");

const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Materialize the embedded guest runner to a version-scoped cache
/// path and return it, creating the file only on first use.
pub fn materialized_guest_path() -> io::Result<PathBuf> {
    let mut dir = std::env::temp_dir();
    dir.push("cellward_guest");
    dir.push(CRATE_VERSION);
    std::fs::create_dir_all(&dir)?;

    let path = dir.join("guest_runner.py");
    if !path.exists() {
        let mut file = std::fs::File::create(&path)?;
        file.write_all(GUEST_RUNNER_SOURCE.as_bytes())?;
    }
    Ok(path)
}
