// 出力ディスパッチャー(バウンデッドキュー + ワーカースレッド)
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::record::MeasurementRecord;
use crate::sinks::Sink;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const QUEUE_CAPACITY: usize = 256;
const TAKE_SLICE: Duration = Duration::from_secs(1);
const JOIN_DEADLINE: Duration = Duration::from_secs(2);

/// 計測レコードをキューに積み、単一のワーカースレッドが設定順にシンクへ配送する。
pub struct Dispatcher {
    sender: SyncSender<MeasurementRecord>,
    worker: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn start(sinks: Vec<Box<dyn Sink>>, running: Arc<AtomicBool>) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<MeasurementRecord>(QUEUE_CAPACITY);
        let worker_running = running.clone();
        let worker = thread::spawn(move || {
            loop {
                match receiver.recv_timeout(TAKE_SLICE) {
                    Ok(record) => {
                        for sink in &sinks {
                            if let Err(e) = sink.emit(&record) {
                                tracing::warn!(target: "dispatcher", sink = sink.name(), error = %e, "シンクへの出力に失敗しました");
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if !worker_running.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self { sender, worker: Some(worker), running }
    }

    /// レコードをキューへ積む。キューが満杯ならブロックする。
    pub fn submit(&self, record: MeasurementRecord) {
        if let Err(e) = self.sender.send(record) {
            tracing::warn!(target: "dispatcher", error = %e, "キューへの投入に失敗しました(ワーカー停止済み)");
        }
    }

    /// ワーカーに停止を指示し、2秒以内のjoinを試みる。
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let (done_tx, done_rx) = mpsc::channel();
            thread::spawn(move || {
                worker.join().ok();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(JOIN_DEADLINE).is_err() {
                tracing::warn!(target: "dispatcher", "ワーカーの終了待ちがタイムアウトしました");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::SinkError;
    use chrono::Utc;
    use std::sync::Mutex;

    struct RecordingSink(Arc<Mutex<Vec<MeasurementRecord>>>);

    impl Sink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn emit(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn delivers_records_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let mut dispatcher = Dispatcher::start(vec![Box::new(RecordingSink(seen.clone()))], running);

        for i in 0..3 {
            let mut record = MeasurementRecord::new(Utc::now());
            record.instant_power_w = Some(i);
            dispatcher.submit(record);
        }
        std::thread::sleep(Duration::from_millis(200));
        dispatcher.shutdown();

        let collected = seen.lock().unwrap();
        assert_eq!(collected.len(), 3);
        assert_eq!(collected[0].instant_power_w, Some(0));
        assert_eq!(collected[2].instant_power_w, Some(2));
    }
}
