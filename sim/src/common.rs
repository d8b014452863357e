//! Logging setup and output-path helpers shared by the `mcl-sim` subcommands.

use std::error::Error;
use std::path::{Path, PathBuf};

/// Parse a level name, falling back to `info` with a note on stderr.
fn parse_level(name: &str) -> log::LevelFilter {
    name.parse().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{name}', using 'info'");
        log::LevelFilter::Info
    })
}

/// Install the global logger.
///
/// Records are stamped with local wall-clock time. When `log_file` is given, output is
/// appended to it (its parent directory is created if needed) instead of going to stderr.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(log_level))
        .format(|buf, record| {
            let stamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
            writeln!(buf, "{stamp} {:<5} {}", record.level(), record.args())
        });

    let target = match log_file {
        Some(path) => {
            prepare_output_file(path)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            env_logger::Target::Pipe(Box::new(file))
        }
        None => env_logger::Target::Stderr,
    };
    builder.target(target).try_init()?;
    Ok(())
}

/// Create the parent directory of an output file if it does not exist yet.
///
/// # Errors
/// Returns an error if the path names an existing directory or directory creation fails.
pub fn prepare_output_file(output: &Path) -> Result<(), Box<dyn Error>> {
    if output.is_dir() {
        return Err(format!(
            "Output path '{}' is a directory, expected a file.",
            output.display()
        )
        .into());
    }
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_output_file_creates_parent() {
        let dir = std::env::temp_dir().join(format!("mcl_sim_common_{}", std::process::id()));
        let file = dir.join("nested").join("out.csv");
        prepare_output_file(&file).unwrap();
        assert!(file.parent().unwrap().is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prepare_output_file_rejects_directory() {
        let dir = std::env::temp_dir();
        assert!(prepare_output_file(&dir).is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), log::LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), log::LevelFilter::Warn);
        assert_eq!(parse_level("loud"), log::LevelFilter::Info);
    }

    #[test]
    fn test_prepare_output_file_bare_name() {
        assert!(prepare_output_file(Path::new("results.csv")).is_ok());
    }
}
