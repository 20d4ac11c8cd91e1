pub mod agent_core;
pub mod inference;
pub mod tools;

use std::path::{Path, PathBuf};

/// Return the platform-standard data directory for the router.
///
/// - macOS: `~/Library/Application Support/ana-router/`
/// - Windows: `{FOLDERID_RoamingAppData}\ana-router\`
/// - Linux: `$XDG_DATA_HOME/ana-router/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.ana-router/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("ana-router");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ana-router")
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// `<data_dir>/router.log`, rotated on startup.
    File,
    Stderr,
}

/// Initialize the tracing subscriber.
///
/// With [`LogTarget::File`]:
/// 1. Rotates existing logs (router.log → router.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh router.log with a line-flushing writer.
/// 3. Logs a startup banner with the log path.
///
/// `RUST_LOG` overrides the default `ana_router=info,warn` filter.
pub fn init_tracing(target: LogTarget) -> std::io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ana_router=info,warn"));

    match target {
        LogTarget::Stderr => {
            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .init();
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "=== ana-router starting ===");
        }
        LogTarget::File => {
            let log_dir = data_dir();
            std::fs::create_dir_all(&log_dir)?;
            let log_path = log_dir.join("router.log");

            rotate_log_file(&log_path, 3);

            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;

            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(FlushingWriter::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .init();

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                log_file = %log_path.display(),
                pid = std::process::id(),
                "=== ana-router starting ==="
            );
        }
    }
    Ok(())
}

/// Rotate log files: `router.log` → `router.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    // Shift: .{n-1} → .{n}
    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so log
/// lines survive an abort.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
