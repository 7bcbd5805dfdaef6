//! Leveled logging capability and run log setup.
//!
//! Components that report progress take a [`Logger`] at construction.
//! [`LogFacade`] forwards to the `log` crate; [`init`] installs an
//! `env_logger` backend that writes every record to stdout and to
//! `log.txt` in the run's result directory.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::Arc,
};

use log::Level;
use parking_lot::Mutex;

use crate::error::RunError;

/// Something that accepts leveled messages.
pub trait Logger {
    fn log(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }
}

/// Forwards to the global `log` facade under a fixed target.
#[derive(Debug, Clone, Copy)]
pub struct LogFacade {
    target: &'static str,
}

impl LogFacade {
    pub const fn new(target: &'static str) -> Self {
        Self { target }
    }
}

impl Default for LogFacade {
    fn default() -> Self {
        Self::new("multistart")
    }
}

impl Logger for LogFacade {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: self.target, level, "{message}");
    }
}

/// Keeps messages in memory, for callers that collect progress lines
/// themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    records: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.lock().clone()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.records.lock().push((level, message.to_string()));
    }
}

/// Writes every record to a log file and to stdout.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stdout().flush()
    }
}

/// Installs the global logger for a run.
///
/// Records go to `<result_dir>/log.txt` and stdout, each line prefixed with
/// a local timestamp. The default filter is `info` unless `RUST_LOG` says
/// otherwise. Returns `Ok(false)` if a global logger was already installed,
/// in which case that logger stays in place, `log.txt` stays empty and a
/// warning says so.
pub fn init(result_dir: &Path) -> Result<bool, RunError> {
    install(result_dir, &LogFacade::default())
}

fn install(result_dir: &Path, reporter: &impl Logger) -> Result<bool, RunError> {
    let path = result_dir.join("log.txt");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| RunError::File {
            path: path.clone(),
            source,
        })?;

    let installed = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .is_ok();

    if !installed {
        reporter.log(
            Level::Warn,
            &format!(
                "global logger already set, nothing will be written to {}",
                path.display()
            ),
        );
    }
    Ok(installed)
}
