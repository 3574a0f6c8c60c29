//! Rotating file log for the hishtory client.
//!
//! Events are formatted by `tracing-subscriber` (one line per event, RFC 3339
//! timestamps, no colours) and appended to `hishtory.log` in the data
//! directory. When the file would grow past the size limit it is renamed to
//! `hishtory-<timestamp>.log` and a fresh file is started. Old backups beyond
//! the count or age limit are removed after each rotation.
//!
//! The level filter is read from `HISHTORY_LOG` (`EnvFilter` syntax) and
//! defaults to `info`.

use crate::error::{Error, Result};
use crate::paths::HishtoryPaths;
use chrono::{SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::Dispatch;
use tracing::dispatcher::SetGlobalDefaultError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable holding the log filter directive.
pub const LOG_FILTER_ENV: &str = "HISHTORY_LOG";

/// Size and retention limits for the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the active file would exceed this many bytes.
    pub max_size: u64,
    /// Number of rotated files to keep.
    pub max_backups: usize,
    /// Rotated files older than this are removed.
    pub max_age: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size: 1024 * 1024,
            max_backups: 10,
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Append-only file that rotates itself according to a [`RotationPolicy`].
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    policy: RotationPolicy,
    file: File,
    size: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, policy: RotationPolicy) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            policy,
            file,
            size,
        })
    }

    /// Rotated files, newest first.
    pub fn backups(&self) -> io::Result<Vec<PathBuf>> {
        let (Some(dir), Some(stem)) = (self.path.parent(), file_stem(&self.path)) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{stem}-");
        let mut backups: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".log"))
            })
            .collect();
        backups.sort();
        backups.reverse();
        Ok(backups)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let backup = self.backup_path();
        fs::rename(&self.path, &backup)?;
        self.file = open_append(&self.path)?;
        self.size = 0;
        self.prune()
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.9f").to_string();
        self.backup_path_at(&stamp)
    }

    /// `<stem>-<stamp>.log`, or `<stem>-<stamp>_<n>.log` when that is taken.
    ///
    /// `_` sorts after `.`, so names for one stamp order by creation.
    fn backup_path_at(&self, stamp: &str) -> PathBuf {
        let stem = file_stem(&self.path).unwrap_or("log");
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut candidate = dir.join(format!("{stem}-{stamp}.log"));
        let mut n = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{stem}-{stamp}_{n:03}.log"));
            n += 1;
        }
        candidate
    }

    fn prune(&self) -> io::Result<()> {
        let cutoff = SystemTime::now()
            .checked_sub(self.policy.max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        for (i, backup) in self.backups()?.into_iter().enumerate() {
            let expired = fs::metadata(&backup)
                .and_then(|m| m.modified())
                .is_ok_and(|modified| modified < cutoff);
            if i >= self.policy.max_backups || expired {
                fs::remove_file(&backup)?;
            }
        }
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = buf.len() as u64;
        if self.size > 0 && self.size + incoming > self.policy.max_size {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Cloneable writer shared by every event the subscriber emits.
#[derive(Clone)]
struct SharedLogFile(Arc<Mutex<RotatingFile>>);

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

impl<'a> MakeWriter<'a> for SharedLogFile {
    type Writer = SharedLogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Full RFC 3339 timestamps in local time.
struct Rfc3339Timer;

impl FormatTime for Rfc3339Timer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Handle to the rotating log.
///
/// Cheap to clone. Events can be sent through the convenience methods, by
/// running code inside [`LogHandle::in_scope`], or by installing the handle as
/// the global default subscriber.
#[derive(Clone)]
pub struct LogHandle {
    dispatch: Dispatch,
    path: PathBuf,
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LogHandle {
    /// Create the data directory and open the log file inside it.
    pub fn open(paths: &HishtoryPaths, policy: RotationPolicy) -> Result<Self> {
        paths.ensure_data_dir()?;
        let path = paths.log_file();
        let file = RotatingFile::open(&path, policy).map_err(|source| Error::LogOpen {
            path: path.clone(),
            source,
        })?;

        let filter =
            EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(SharedLogFile(Arc::new(Mutex::new(file))))
            .with_ansi(false)
            .with_timer(Rfc3339Timer)
            .finish();

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with this log as the default subscriber for the current thread.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this log the process-wide default subscriber.
    pub fn install_global(&self) -> std::result::Result<(), SetGlobalDefaultError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
    }

    pub fn debug(&self, msg: &str) {
        self.in_scope(|| tracing::debug!("{}", msg));
    }

    pub fn info(&self, msg: &str) {
        self.in_scope(|| tracing::info!("{}", msg));
    }

    pub fn warn(&self, msg: &str) {
        self.in_scope(|| tracing::warn!("{}", msg));
    }

    pub fn error(&self, msg: &str) {
        self.in_scope(|| tracing::error!("{}", msg));
    }
}

/// Lazily opened log for one data directory.
///
/// The handle is built on the first call to [`LogSink::get`] or
/// [`LogSink::try_get`]. Concurrent first callers block until that single
/// construction finishes and then share the same handle.
#[derive(Debug)]
pub struct LogSink {
    paths: HishtoryPaths,
    policy: RotationPolicy,
    handle: OnceCell<LogHandle>,
}

impl LogSink {
    pub fn new(paths: &HishtoryPaths) -> Self {
        Self::with_policy(paths, RotationPolicy::default())
    }

    pub fn with_policy(paths: &HishtoryPaths, policy: RotationPolicy) -> Self {
        Self {
            paths: paths.clone(),
            policy,
            handle: OnceCell::new(),
        }
    }

    /// The log handle, opening the file on first use.
    ///
    /// A failed open is not cached; the next call tries again.
    pub fn try_get(&self) -> Result<&LogHandle> {
        self.get_or_open(LogHandle::open)
    }

    fn get_or_open(
        &self,
        open: impl FnOnce(&HishtoryPaths, RotationPolicy) -> Result<LogHandle>,
    ) -> Result<&LogHandle> {
        self.handle.get_or_try_init(|| open(&self.paths, self.policy))
    }

    /// The log handle, opening the file on first use.
    ///
    /// # Panics
    ///
    /// Panics if the data directory or the log file cannot be created.
    pub fn get(&self) -> &LogHandle {
        match self.try_get() {
            Ok(handle) => handle,
            Err(e) => panic!("failed to initialize hishtory log: {e}"),
        }
    }
}

static GLOBAL_SINK: OnceCell<LogSink> = OnceCell::new();

/// The process-wide log under the user's hishtory directory.
///
/// # Panics
///
/// Panics if the home directory cannot be resolved or the log cannot be
/// opened. Nothing else can run without it.
pub fn logger() -> &'static LogHandle {
    GLOBAL_SINK
        .get_or_init(|| match HishtoryPaths::resolve() {
            Ok(paths) => LogSink::new(&paths),
            Err(e) => panic!("{e}"),
        })
        .get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    fn small_policy() -> RotationPolicy {
        RotationPolicy {
            max_size: 64,
            max_backups: 3,
            max_age: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_size, 1_048_576);
        assert_eq!(policy.max_backups, 10);
        assert_eq!(policy.max_age, Duration::from_secs(2_592_000));
    }

    #[test]
    fn test_rotates_when_size_exceeded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hishtory.log");
        let mut file = RotatingFile::open(&path, small_policy()).unwrap();

        file.write_all(&[b'a'; 40]).unwrap();
        assert!(file.backups().unwrap().is_empty());

        file.write_all(&[b'b'; 40]).unwrap();
        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0]).unwrap(), vec![b'a'; 40]);
        assert_eq!(fs::read(&path).unwrap(), vec![b'b'; 40]);
    }

    #[test]
    fn test_keeps_at_most_max_backups() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hishtory.log");
        let mut file = RotatingFile::open(&path, small_policy()).unwrap();

        for _ in 0..8 {
            file.write_all(&[b'x'; 60]).unwrap();
        }

        assert_eq!(file.backups().unwrap().len(), 3);
    }

    #[test]
    fn test_same_stamp_backups_order_by_creation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hishtory.log");
        let file = RotatingFile::open(&path, small_policy()).unwrap();
        let stamp = "2026-01-02T03-04-05.000000000";

        let created: Vec<PathBuf> = (0..3)
            .map(|i| {
                let backup = file.backup_path_at(stamp);
                fs::write(&backup, format!("rotation {i}")).unwrap();
                backup
            })
            .collect();

        assert_eq!(
            created[0].file_name().unwrap(),
            "hishtory-2026-01-02T03-04-05.000000000.log"
        );
        assert_eq!(
            created[2].file_name().unwrap(),
            "hishtory-2026-01-02T03-04-05.000000000_002.log"
        );
        let newest_first: Vec<PathBuf> = created.iter().rev().cloned().collect();
        assert_eq!(file.backups().unwrap(), newest_first);
    }

    #[test]
    fn test_prune_drops_oldest_of_same_stamp_backups() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hishtory.log");
        let policy = RotationPolicy {
            max_backups: 2,
            ..small_policy()
        };
        let file = RotatingFile::open(&path, policy).unwrap();

        let created: Vec<PathBuf> = (0..3)
            .map(|_| {
                let backup = file.backup_path_at("2026-01-02T03-04-05.000000000");
                fs::write(&backup, "").unwrap();
                backup
            })
            .collect();
        file.prune().unwrap();

        assert!(!created[0].exists());
        assert!(created[1].exists());
        assert!(created[2].exists());
    }

    #[test]
    fn test_oversized_first_write_goes_to_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hishtory.log");
        let mut file = RotatingFile::open(&path, small_policy()).unwrap();

        file.write_all(&[b'z'; 200]).unwrap();

        assert!(file.backups().unwrap().is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), 200);
    }

    #[test]
    fn test_handle_writes_formatted_lines() {
        let temp = TempDir::new().unwrap();
        let paths = HishtoryPaths::new(temp.path(), ".hishtory");
        let sink = LogSink::new(&paths);

        sink.get().info("recorded entry");
        sink.get().warn("upload failed");

        let contents = fs::read_to_string(paths.log_file()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("recorded entry"));
        assert!(lines[1].contains("WARN"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn test_concurrent_get_constructs_once() {
        let temp = TempDir::new().unwrap();
        let paths = HishtoryPaths::new(temp.path(), ".hishtory");
        let sink = LogSink::new(&paths);
        let barrier = Barrier::new(8);
        let opens = AtomicUsize::new(0);

        let addrs: Vec<usize> = thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        let handle = sink
                            .get_or_open(|paths, policy| {
                                opens.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                LogHandle::open(paths, policy)
                            })
                            .unwrap();
                        handle as *const LogHandle as usize
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(addrs.len(), 8);
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
        assert!(std::ptr::eq(sink.get(), addrs[0] as *const LogHandle));
    }

    #[test]
    fn test_failed_open_is_retried() {
        let temp = TempDir::new().unwrap();
        let paths = HishtoryPaths::new(temp.path(), ".hishtory");
        let sink = LogSink::new(&paths);
        let opens = AtomicUsize::new(0);

        let first = sink.get_or_open(|_, _| {
            opens.fetch_add(1, Ordering::SeqCst);
            Err(Error::HomeDir)
        });
        assert!(matches!(first, Err(Error::HomeDir)));

        sink.get_or_open(|paths, policy| {
            opens.fetch_add(1, Ordering::SeqCst);
            LogHandle::open(paths, policy)
        })
        .unwrap();
        sink.get_or_open(|paths, policy| {
            opens.fetch_add(1, Ordering::SeqCst);
            LogHandle::open(paths, policy)
        })
        .unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_try_get_reports_unwritable_directory() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("home");
        fs::write(&blocker, "").unwrap();
        let sink = LogSink::new(&HishtoryPaths::new(&blocker, ".hishtory"));

        assert!(matches!(sink.try_get(), Err(Error::CreateDir { .. })));
    }

    #[test]
    #[should_panic(expected = "failed to initialize hishtory log")]
    fn test_get_panics_on_construction_failure() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("home");
        fs::write(&blocker, "").unwrap();
        let sink = LogSink::new(&HishtoryPaths::new(&blocker, ".hishtory"));

        sink.get();
    }
}
