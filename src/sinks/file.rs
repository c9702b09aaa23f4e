// 追記ファイルシンク
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::record::MeasurementRecord;
use crate::sinks::{OutputFormat, Sink, SinkError, csv_header_line, format_record};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub struct FileSink {
    path: PathBuf,
    format: OutputFormat,
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: PathBuf, format: OutputFormat) -> Self {
        Self { path, format, lock: Mutex::new(()) }
    }

    fn file_is_empty_or_absent(&self) -> bool {
        std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }
}

impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn emit(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        let _guard = self.lock.lock().unwrap_or_else(|poison| poison.into_inner());
        let needs_header = self.format == OutputFormat::Csv && self.file_is_empty_or_absent();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if needs_header {
            writeln!(file, "{}", csv_header_line())?;
        }
        writeln!(file, "{}", format_record(record, self.format)?)?;
        Ok(())
    }
}
