// 標準出力シンク
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::record::MeasurementRecord;
use crate::sinks::{OutputFormat, Sink, SinkError, format_record};

pub struct StdoutSink {
    format: OutputFormat,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl Sink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn emit(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        println!("{}", format_record(record, self.format)?);
        Ok(())
    }
}
