// 出力シンク
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
pub mod file;
pub mod gcloud;
pub mod stdout;
pub mod webhook;

use crate::record::{CSV_HEADER, MeasurementRecord};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("未知の出力形式です: {}", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o")]
    Io(#[from] std::io::Error),
    #[error("JSON変換に失敗しました")]
    Json(#[from] serde_json::Error),
    #[error("YAML変換に失敗しました")]
    Yaml(#[from] serde_yaml::Error),
    #[error("CSV書き込みに失敗しました")]
    Csv(#[from] csv::Error),
    #[error("webhookの送信に失敗しました")]
    Webhook(#[from] reqwest::Error),
    #[error("gcloud pub/subへの発行に失敗しました: {0}")]
    Gcloud(String),
}

/// レコードを一つ受け取り副作用を起こす。失敗はエラー値として返し、パニックしない。
pub trait Sink: Send {
    fn name(&self) -> &'static str;
    fn emit(&self, record: &MeasurementRecord) -> Result<(), SinkError>;
}

/// 指定フォーマットでレコードを文字列化する
pub fn format_record(record: &MeasurementRecord, format: OutputFormat) -> Result<String, SinkError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(record)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(record)?),
        OutputFormat::Csv => {
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
            writer.write_record(record.csv_fields())?;
            let bytes = writer.into_inner().map_err(|e| SinkError::Csv(e.into_error().into()))?;
            Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
        }
    }
}

pub fn csv_header_line() -> String {
    CSV_HEADER.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn json_omits_absent_fields() {
        let record = MeasurementRecord::new(Utc::now());
        let json = format_record(&record, OutputFormat::Json).unwrap();
        assert!(!json.contains("instant_power_w"));
    }

    #[test]
    fn csv_row_matches_header_width() {
        let record = MeasurementRecord::new(Utc::now());
        let row = format_record(&record, OutputFormat::Csv).unwrap();
        assert_eq!(row.split(',').count(), CSV_HEADER.len());
    }
}
