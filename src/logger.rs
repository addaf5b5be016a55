//! Size-rotated CSV data log.
//!
//! Every file starts with the same header row. Rows are only ever written
//! whole, and rotation happens between rows, so no record spans two files.
//! Files are named `<prefix>_<YYYYMMDD>_<HHMMSS>_<seq>.csv`; `seq` grows on
//! every rotation and files are opened with `create_new`, so an existing
//! file is never truncated.
//!
//! Errors that stop the loop also go to [`ErrorLog`], a plain text file
//! next to the CSV files that is only ever appended to.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::config::LogConfig;
use crate::error::LogError;
use crate::history::AveragedRecord;

/// Creates the log directory and any missing parents.
pub fn ensure_log_dir(path: &Path) -> Result<(), LogError> {
    std::fs::create_dir_all(path).map_err(|source| LogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Counts bytes on their way to the file.
#[derive(Debug)]
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

type Sink = csv::Writer<CountingWriter<BufWriter<File>>>;

/// Appends averaged records to the current CSV file and rotates by size.
pub struct LogWriter {
    directory: PathBuf,
    prefix: String,
    rotate_bytes: u64,
    header: Vec<String>,
    sequence: u32,
    path: PathBuf,
    sink: Sink,
}

impl LogWriter {
    /// Opens the first file in `config.directory` and writes the header.
    ///
    /// The directory must exist (see [`ensure_log_dir`]).
    pub fn create(
        config: &LogConfig,
        header: Vec<String>,
        now: NaiveDateTime,
    ) -> Result<Self, LogError> {
        let directory = config.directory().to_path_buf();
        let prefix = config.prefix.to_string();
        let (path, sink, sequence) = open_file(&directory, &prefix, &header, now, 0)?;
        tracing::info!(path = %path.display(), "opened log file");
        Ok(Self {
            directory,
            prefix,
            rotate_bytes: config.rotate_bytes,
            header,
            sequence,
            path,
            sink,
        })
    }

    /// Header for a channel/axis layout.
    ///
    /// `timestamp`, one column per channel, then `<axis>_output` and
    /// `<axis>_duty` per axis.
    pub fn header_for<'a>(
        channels: impl IntoIterator<Item = &'a str>,
        axes: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let mut header = vec!["timestamp".to_string()];
        header.extend(channels.into_iter().map(str::to_string));
        for axis in axes {
            header.push(format!("{axis}_output"));
            header.push(format!("{axis}_duty"));
        }
        header
    }

    /// Writes one row in header order and flushes it to the file.
    ///
    /// Gaps are written as empty fields; values keep full precision.
    pub fn append(&mut self, record: &AveragedRecord) -> Result<(), LogError> {
        let mut row = Vec::with_capacity(self.header.len());
        row.push(record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string());
        row.extend(record.temperatures.iter().map(|t| field(*t)));
        for (output, duty) in record.outputs.iter().zip(&record.duty) {
            row.push(field(*output));
            row.push(duty.to_string());
        }
        self.sink.write_record(&row)?;
        self.flush()
    }

    /// Pushes buffered rows to the OS.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.sink.flush().map_err(|source| LogError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Starts a new file if the current one reached the size threshold.
    ///
    /// Returns true if a rotation happened.
    pub fn rotate_if_needed(&mut self, now: NaiveDateTime) -> Result<bool, LogError> {
        self.flush()?;
        if self.bytes_written() < self.rotate_bytes {
            return Ok(false);
        }
        let (path, sink, sequence) = open_file(
            &self.directory,
            &self.prefix,
            &self.header,
            now,
            self.sequence + 1,
        )?;
        // the old file was flushed above; dropping it closes the handle
        drop(std::mem::replace(&mut self.sink, sink));
        let old_path = std::mem::replace(&mut self.path, path);
        self.sequence = sequence;
        tracing::info!(
            from = %old_path.display(),
            to = %self.path.display(),
            "rotated log file"
        );
        Ok(true)
    }

    /// Bytes flushed into the current file, header included.
    pub fn bytes_written(&self) -> u64 {
        self.sink.get_ref().count
    }

    /// Current file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotation counter of the current file.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Column names.
    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("path", &self.path)
            .field("sequence", &self.sequence)
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

/// File name of the error log inside the log directory.
pub const ERROR_LOG_NAME: &str = "error_log.txt";

/// Append-only text file of the errors that stopped the loop.
///
/// Each entry is a separator line, the local time, and the error followed
/// by its chain of causes.
#[derive(Clone, Debug)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    /// Error log at [`ERROR_LOG_NAME`] in `directory`.
    ///
    /// Nothing is created until the first entry is recorded.
    pub fn new(directory: &Path) -> Self {
        Self {
            path: directory.join(ERROR_LOG_NAME),
        }
    }

    /// Appends one entry, creating the file if needed.
    pub fn record(
        &self,
        now: NaiveDateTime,
        error: &dyn std::error::Error,
    ) -> Result<(), LogError> {
        let mut entry = format!(
            "{}\n{}\n{error}\n",
            "-".repeat(60),
            now.format("%Y-%m-%d %H:%M:%S")
        );
        let mut cause = error.source();
        while let Some(e) = cause {
            entry.push_str(&format!("  caused by: {e}\n"));
            cause = e.source();
        }

        let io_error = |source| LogError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_error)?;
        file.write_all(entry.as_bytes()).map_err(io_error)?;
        file.flush().map_err(io_error)
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn field(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn open_file(
    directory: &Path,
    prefix: &str,
    header: &[String],
    now: NaiveDateTime,
    first_sequence: u32,
) -> Result<(PathBuf, Sink, u32), LogError> {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let mut sequence = first_sequence;
    let (path, file) = loop {
        let path = directory.join(format!("{prefix}_{stamp}_{sequence:04}.csv"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => break (path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => sequence += 1,
            Err(source) => return Err(LogError::Io { path, source }),
        }
    };
    let mut sink = csv::Writer::from_writer(CountingWriter {
        inner: BufWriter::new(file),
        count: 0,
    });
    sink.write_record(header)?;
    sink.flush().map_err(|source| LogError::Io {
        path: path.clone(),
        source,
    })?;
    Ok((path, sink, sequence))
}
