// Google Cloud Pub/Subシンク
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::record::MeasurementRecord;
use crate::sinks::{Sink, SinkError};
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use tokio::runtime::Runtime;

/// JSONエンコードしたレコードをPub/Subトピックへ発行する。
/// ワーカースレッドは非同期ランタイムを持たないため、シングルスレッドTokioランタイムと
/// 認証済みクライアントをシンクの生存期間中保持し、発行のたびに使い回す(毎回ブートストラップしない)。
pub struct GcloudSink {
    runtime: Runtime,
    client: Client,
    topic_name: String,
}

impl GcloudSink {
    pub fn new(project_id: impl Into<String>, topic_name: impl Into<String>) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SinkError::Gcloud(e.to_string()))?;
        let project_id = project_id.into();
        let client = runtime.block_on(async {
            let config = ClientConfig {
                project_id: Some(project_id),
                ..Default::default()
            };
            Client::new(config).await.map_err(|e| SinkError::Gcloud(e.to_string()))
        })?;
        Ok(Self {
            runtime,
            client,
            topic_name: topic_name.into(),
        })
    }

    fn publish(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        self.runtime.block_on(async {
            let topic = self.client.topic(&self.topic_name);
            let mut publisher = topic.new_publisher(None);
            let message = PubsubMessage { data: payload, ..Default::default() };
            let awaiter = publisher.publish(message).await;
            awaiter.get().await.map_err(|e| SinkError::Gcloud(e.to_string()))?;
            publisher.shutdown().await;
            Ok(())
        })
    }
}

impl Sink for GcloudSink {
    fn name(&self) -> &'static str {
        "gcloud"
    }

    fn emit(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(record)?;
        self.publish(payload)
    }
}
