// Bルートスマートメーター計測収集エージェント
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use anyhow::Context;
use broute_meter_agent::config::{Args, OutputSink};
use broute_meter_agent::dispatcher::Dispatcher;
use broute_meter_agent::poller::poll_once;
use broute_meter_agent::scheduler::Scheduler;
use broute_meter_agent::sinks::file::FileSink;
use broute_meter_agent::sinks::gcloud::GcloudSink;
use broute_meter_agent::sinks::stdout::StdoutSink;
use broute_meter_agent::sinks::webhook::WebhookSink;
use broute_meter_agent::sinks::Sink;
use broute_meter_agent::wisun::session::{Credentials, MeterHint};
use broute_meter_agent::wisun::{Session, Transaction, Transport};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> anyhow::Result<()> {
    let args = Args::load();
    args.validate().context("設定が不正です")?;
    init_logging(args.debug);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Ctrl-Cハンドラの登録に失敗しました")?;
    }

    let credentials = Credentials::new(&args.b_route_id, &args.b_route_password)
        .map_err(anyhow::Error::msg)
        .context("Bルート認証情報が不正です")?;
    let hint = MeterHint {
        channel: args.meter_channel,
        pan_id: args.meter_panid,
        ipv6: args.meter_ipv6,
    };

    let transport = Transport::new(&args.serial_port, args.serial_rate);
    let mut session = Session::new(transport, running.clone());
    let endpoint = session
        .connect(&credentials, &hint)
        .context("スマートメーターへの接続に失敗しました")?;
    tracing::info!(?endpoint, "スマートメーターに接続しました");

    let sinks = build_sinks(&args)?;
    let mut dispatcher = Dispatcher::start(sinks, running.clone());

    let scheduler = match args.mode {
        broute_meter_agent::config::Mode::Interval => Scheduler::interval(args.interval),
        broute_meter_agent::config::Mode::Schedule => {
            Scheduler::cron(&args.schedule).context("cron式の解釈に失敗しました")?
        }
    };
    let local_tz = args.timezone();

    let mut transaction = Transaction::new(&mut session, endpoint.ipv6, 1);
    while running.load(Ordering::SeqCst) {
        let record = poll_once(&mut transaction, local_tz, Utc::now());
        if record.has_payload() {
            dispatcher.submit(record);
        }
        if !scheduler.wait_for_next_tick(&running) {
            break;
        }
    }

    dispatcher.shutdown();
    session.close();
    Ok(())
}

fn build_sinks(args: &Args) -> anyhow::Result<Vec<Box<dyn Sink>>> {
    let format = args.format.into();
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    for output in &args.outputs {
        match output {
            OutputSink::Stdout => sinks.push(Box::new(StdoutSink::new(format))),
            OutputSink::File => {
                let path = args.file.clone().context("--fileが未設定です")?;
                sinks.push(Box::new(FileSink::new(path, format)));
            }
            OutputSink::Webhook => {
                let url = args.webhook_url.clone().context("--webhook-urlが未設定です")?;
                sinks.push(Box::new(WebhookSink::new(url)));
            }
            OutputSink::Gcloud => {
                let project = args.gcp_project.clone().context("--gcp-projectが未設定です")?;
                let topic = args.gcp_topic.clone().context("--gcp-topicが未設定です")?;
                let sink = GcloudSink::new(project, topic)
                    .map_err(|e| anyhow::anyhow!(e))
                    .context("gcloud pub/subクライアントの初期化に失敗しました")?;
                sinks.push(Box::new(sink));
            }
        }
    }
    Ok(sinks)
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
