// CLI/環境変数からの設定読み込み
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::sinks::OutputFormat;
use clap::{Parser, ValueEnum};
use std::net::Ipv6Addr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Schedule,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputSink {
    Stdout,
    File,
    Gcloud,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
    Csv,
}

impl From<Format> for OutputFormat {
    fn from(value: Format) -> Self {
        match value {
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
            Format::Csv => OutputFormat::Csv,
        }
    }
}

/// BルートWi-SUNスマートメーターからの計測収集エージェント
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// シリアルポートのデバイスパス
    #[arg(long, env = "SERIAL_PORT", default_value = "/dev/ttyUSB0")]
    pub serial_port: String,

    /// シリアルポートのボーレート
    #[arg(long, env = "SERIAL_RATE", default_value_t = 115_200)]
    pub serial_rate: u32,

    /// Bルート認証ID(32桁16進数)
    #[arg(long, env = "B_ROUTE_ID")]
    pub b_route_id: String,

    /// Bルート認証パスワード
    #[arg(long, env = "B_ROUTE_PASSWORD")]
    pub b_route_password: String,

    /// 計測値を解釈するタイムゾーン(IANA名)。E2/EAのメーター内時刻の解釈にのみ使う。
    #[arg(long, env = "LOCAL_TIMEZONE", default_value = "Asia/Tokyo")]
    pub local_timezone: String,

    /// 出力先。複数指定可。
    #[arg(long = "output", value_enum, num_args = 0.., default_values_t = vec![OutputSink::Stdout])]
    pub outputs: Vec<OutputSink>,

    /// 出力フォーマット
    #[arg(long, value_enum, default_value = "json")]
    pub format: Format,

    /// fileシンクの出力先パス
    #[arg(long, env = "DEFAULT_DATA_FILE")]
    pub file: Option<PathBuf>,

    /// gcloud Pub/SubのプロジェクトID
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub gcp_project: Option<String>,

    /// gcloud Pub/Subのトピック名
    #[arg(long, env = "GCP_TOPIC_NAME")]
    pub gcp_topic: Option<String>,

    /// webhook送信先URL
    #[arg(long, env = "DEFAULT_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// 動作モード
    #[arg(long, value_enum, default_value = "interval")]
    pub mode: Mode,

    /// cron形式のスケジュール(5フィールド、UTC)。mode=scheduleで使用。
    #[arg(short, long, default_value = "*/5 * * * *")]
    pub schedule: String,

    /// ポーリング間隔(秒)。mode=intervalで使用。
    #[arg(short, long, default_value_t = 300)]
    pub interval: u64,

    /// 既知の場合の論理チャンネル番号(省略時はアクティブスキャンで探す)
    #[arg(long)]
    pub meter_channel: Option<u8>,

    /// 既知の場合のPAN ID(省略時はアクティブスキャンで探す)
    #[arg(long)]
    pub meter_panid: Option<u16>,

    /// 既知の場合のスマートメーターIPv6アドレス(省略時はアクティブスキャンで探す)
    #[arg(long)]
    pub meter_ipv6: Option<Ipv6Addr>,

    /// デバッグログを有効にする
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("出力先にfileが指定されていますが--fileが未設定です")]
    MissingFilePath,
    #[error("出力先にgcloudが指定されていますが--gcp-project/--gcp-topicが未設定です")]
    MissingGcloudSettings,
    #[error("出力先にwebhookが指定されていますが--webhook-urlが未設定です")]
    MissingWebhookUrl,
    #[error("タイムゾーン名を解釈できません: {0}")]
    InvalidTimezone(String),
}

impl Args {
    /// `.env`を読み込んでからコマンドライン引数を解釈する
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Args::parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outputs.contains(&OutputSink::File) && self.file.is_none() {
            return Err(ConfigError::MissingFilePath);
        }
        if self.outputs.contains(&OutputSink::Gcloud)
            && (self.gcp_project.is_none() || self.gcp_topic.is_none())
        {
            return Err(ConfigError::MissingGcloudSettings);
        }
        if self.outputs.contains(&OutputSink::Webhook) && self.webhook_url.is_none() {
            return Err(ConfigError::MissingWebhookUrl);
        }
        self.local_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.local_timezone.clone()))?;
        Ok(())
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.local_timezone.parse().unwrap_or(chrono_tz::Asia::Tokyo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_file_sink_without_path() {
        let args = Args::parse_from([
            "agent",
            "--b-route-id",
            &"a".repeat(32),
            "--b-route-password",
            "password1234",
            "--output",
            "file",
        ]);
        assert!(matches!(args.validate(), Err(ConfigError::MissingFilePath)));
    }

    #[test]
    fn accepts_stdout_default() {
        let args = Args::parse_from([
            "agent",
            "--b-route-id",
            &"a".repeat(32),
            "--b-route-password",
            "password1234",
        ]);
        assert!(args.validate().is_ok());
    }
}
