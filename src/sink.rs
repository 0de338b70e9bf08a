//! # Session log sink
//!
//! Every session writes a human readable trace of its telemetry samples and
//! parameter notifications either to the shared console, colour-coded by
//! session identifier, or to a file that it owns exclusively.

use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::telemetry::TelemetrySample;
use crate::{Result, Value};

const RESET: &str = "\x1b[0m";

/// Console colours, indexed by session identifier
pub const COLORS: [&str; 4] = [
    "\x1b[34m", // blue
    "\x1b[31m", // red
    "\x1b[32m", // green
    "\x1b[30m", // black
];

enum Target {
    Console,
    File {
        path: PathBuf,
        writer: Mutex<LineWriter<File>>,
    },
}

/// # Line-oriented output of one session
///
/// All lines are prefixed with the session tag `[#id]`.
pub struct LogSink {
    id: u8,
    target: Target,
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("id", &self.id)
            .field("path", &self.path())
            .finish()
    }
}

impl LogSink {
    /// Sink writing coloured lines to stdout
    pub fn console(id: u8) -> Self {
        Self {
            id,
            target: Target::Console,
        }
    }

    /// Sink appending plain lines to `path`
    ///
    /// The file is created, or truncated if it exists. Returns
    /// [Error::IoError](crate::Error::IoError) if the file cannot be opened for writing.
    pub fn file(id: u8, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        Ok(Self {
            id,
            target: Target::File {
                path,
                writer: Mutex::new(LineWriter::new(file)),
            },
        })
    }

    /// Identifier of the session this sink belongs to
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Path of the log file, `None` for a console sink
    pub fn path(&self) -> Option<&Path> {
        match &self.target {
            Target::Console => None,
            Target::File { path, .. } => Some(path),
        }
    }

    /// Write one tagged line
    pub fn line(&self, message: &str) {
        match &self.target {
            Target::Console => {
                let color = COLORS[self.id as usize % COLORS.len()];
                println!("{}[#{}] {}{}", color, self.id, message, RESET);
            }
            Target::File { path, writer } => {
                let mut writer = match writer.lock() {
                    Ok(writer) => writer,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Err(e) = writeln!(writer, "[#{}] {}", self.id, message) {
                    log::warn!("[#{}] cannot write to {}: {}", self.id, path.display(), e);
                }
            }
        }
    }

    /// Report an observed parameter value
    pub fn param(&self, name: &str, value: &Value) {
        self.line(&format!("param {} = {}", name, value));
    }

    /// Report one telemetry sample
    pub fn telemetry(&self, sample: &TelemetrySample) {
        self.line(&sample.to_string());
    }
}
