// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::db::filename::{generate_filename, FileType};
use crate::storage::{File, Storage};

use log::{LevelFilter, Log, Metadata, Record};
use slog::{o, Drain, Level};

use std::sync::Mutex;

/// A `slog` based logger which can be used with `log` crate
///
/// See `slog` at https://github.com/slog-rs/slog
/// See `log` at https://github.com/rust-lang/log
pub struct Logger {
    inner: slog::Logger,
    level: LevelFilter,
}

impl Logger {
    /// Create a logger backend
    ///
    /// If `inner` is not `None`, use `inner` logger
    /// If `inner` is `None`
    ///     - In dev mode, use a std output
    ///     - In release mode, use the file `LOG` under `db_path`. The `LOG`
    ///       left by the last run is renamed to `LOG.old`.
    pub fn new<S: Storage>(
        inner: Option<slog::Logger>,
        level: LevelFilter,
        storage: &S,
        db_path: &str,
    ) -> Self {
        let inner = match inner {
            Some(l) => l,
            None => {
                if cfg!(debug_assertions) {
                    let decorator = slog_term::TermDecorator::new().build();
                    let drain = Mutex::new(slog_term::FullFormat::new(decorator).build()).fuse();
                    slog::Logger::root(drain, o!())
                } else {
                    Self::file_logger(storage, db_path)
                }
            }
        };
        Self { inner, level }
    }

    fn file_logger<S: Storage>(storage: &S, db_path: &str) -> slog::Logger {
        let log_file = generate_filename(db_path, FileType::InfoLog, 0);
        if storage.exists(&log_file) {
            let old = generate_filename(db_path, FileType::OldInfoLog, 0);
            let _ = storage.rename(&log_file, &old);
        }
        let _ = storage.mkdir_all(db_path);
        match storage.create(&log_file) {
            Ok(file) => {
                let drain = slog_async::Async::new(FileBasedDrain::new(file))
                    .build()
                    .fuse();
                slog::Logger::root(drain, o!())
            }
            // Logging is not worth failing the caller
            Err(_) => slog::Logger::root(slog::Discard, o!()),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, r: &Record) {
        if self.enabled(r.metadata()) {
            let level = log_to_slog_level(r.metadata().level());
            let args = r.args();
            let target = r.target();
            let module = r.module_path_static().unwrap_or("");
            let file = r.file_static().unwrap_or("");
            let line = r.line().unwrap_or(0);

            let s = slog::RecordStatic {
                location: &slog::RecordLocation {
                    file,
                    line,
                    column: 0,
                    function: "",
                    module,
                },
                level,
                tag: target,
            };
            if cfg!(debug_assertions) {
                let meta_info = format!("{}:{}", file, line);
                self.inner.log(&slog::Record::new(
                    &s,
                    args,
                    slog::b!("[location]" => meta_info),
                ))
            } else {
                self.inner.log(&slog::Record::new(&s, args, slog::b!()))
            }
        }
    }

    fn flush(&self) {}
}

fn log_to_slog_level(level: log::Level) -> Level {
    match level {
        log::Level::Trace => Level::Trace,
        log::Level::Debug => Level::Debug,
        log::Level::Info => Level::Info,
        log::Level::Warn => Level::Warning,
        log::Level::Error => Level::Error,
    }
}

// Writes every record as one line into a `File` from `Storage`
struct FileBasedDrain<F: File> {
    inner: Mutex<F>,
}

impl<F: File> FileBasedDrain<F> {
    fn new(f: F) -> Self {
        FileBasedDrain {
            inner: Mutex::new(f),
        }
    }
}

impl<F: File> Drain for FileBasedDrain<F> {
    type Ok = ();
    type Err = slog::Never;

    fn log(
        &self,
        record: &slog::Record,
        values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        if let Ok(mut file) = self.inner.lock() {
            let line = format!("[{}] {} {:?}\n", record.level(), record.msg(), values);
            // Ignore errors here
            let _ = file.write(line.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem::MemStorage;

    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_default_logger() {
        let s = MemStorage::default();
        let db_path = "test";
        let logger = Logger::new(None, LevelFilter::Debug, &s, db_path);
        // Ignore the error if the logger have been set
        let _ = log::set_logger(Box::leak(Box::new(logger)));
        log::set_max_level(LevelFilter::Debug);
        info!("Hello World");
        // Wait for the async logger print the result
        thread::sleep(Duration::from_millis(100));
    }

    #[test]
    fn test_file_logger_rotates_old_log() {
        let s = MemStorage::default();
        let db_path = "db";
        let log_file = generate_filename(db_path, FileType::InfoLog, 0);
        let mut f = s.create(&log_file).unwrap();
        f.write(b"last run").unwrap();
        {
            let inner = Logger::file_logger(&s, db_path);
            slog::info!(inner, "new run");
        }
        thread::sleep(Duration::from_millis(100));
        let mut old = s
            .open(generate_filename(db_path, FileType::OldInfoLog, 0))
            .unwrap();
        let mut buf = vec![];
        old.read_all(&mut buf).unwrap();
        assert_eq!(buf, b"last run");
        assert!(s.exists(&log_file));
    }
}
