// 計測レコードのデータモデル
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// スマートメーター一回分の計測結果。`timestamp`以外に何も値が無ければ棄却する。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_power_kwh: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instant_power_w: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_a: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_r_a: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_t_a: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_cumulative_power_kwh: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_30min_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_30min_consumption_kwh: Option<Decimal>,
}

/// 出力先で共有するCSVの列順序と見出し
pub const CSV_HEADER: [&str; 10] = [
    "timestamp",
    "cumulative_power_kwh",
    "instant_power_w",
    "current_a",
    "current_r_a",
    "current_t_a",
    "historical_timestamp",
    "historical_cumulative_power_kwh",
    "recent_30min_timestamp",
    "recent_30min_consumption_kwh",
];

impl MeasurementRecord {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    /// `timestamp`以外に値が一つも無ければ転送しない
    pub fn has_payload(&self) -> bool {
        self.cumulative_power_kwh.is_some()
            || self.instant_power_w.is_some()
            || self.current_a.is_some()
            || self.historical_cumulative_power_kwh.is_some()
            || self.recent_30min_consumption_kwh.is_some()
    }

    /// CSV_HEADERの列順に対応する文字列表現。欠損は空文字列。
    pub fn csv_fields(&self) -> [String; 10] {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(|x| x.to_string()).unwrap_or_default()
        }
        [
            self.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
            opt(&self.cumulative_power_kwh),
            opt(&self.instant_power_w),
            opt(&self.current_a),
            opt(&self.current_r_a),
            opt(&self.current_t_a),
            self.historical_timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
            opt(&self.historical_cumulative_power_kwh),
            self.recent_30min_timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
            opt(&self.recent_30min_consumption_kwh),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_timestamp_has_no_payload() {
        let record = MeasurementRecord::new(Utc::now());
        assert!(!record.has_payload());
    }

    #[test]
    fn instant_power_counts_as_payload() {
        let mut record = MeasurementRecord::new(Utc::now());
        record.instant_power_w = Some(150);
        assert!(record.has_payload());
    }

    #[test]
    fn csv_fields_blank_absent_values() {
        let record = MeasurementRecord::new(Utc::now());
        let fields = record.csv_fields();
        assert_eq!(fields[1], "");
        assert_eq!(fields.len(), CSV_HEADER.len());
    }
}
