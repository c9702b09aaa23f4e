// Webhookシンク
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::record::MeasurementRecord;
use crate::sinks::{Sink, SinkError};
use std::time::Duration;

/// JSONエンコードしたレコードをPOSTする。フォーマットは常にJSON固定。
pub struct WebhookSink {
    url: String,
    client: reqwest::blocking::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("webhookクライアントの構築に失敗しました");
        Self { url: url.into(), client }
    }
}

impl Sink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn emit(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        self.client.post(&self.url).json(record).send()?.error_for_status()?;
        Ok(())
    }
}
