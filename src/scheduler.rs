// ポーリングの周期を決めるスケジューラー
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use chrono::Utc;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const SLEEP_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("cron式が不正です: {0}")]
    InvalidCron(String),
}

/// 次回ティックまでの待機モード
pub enum Scheduler {
    Interval(Duration),
    Schedule(Box<CronSchedule>),
}

impl Scheduler {
    pub fn interval(seconds: u64) -> Self {
        Scheduler::Interval(Duration::from_secs(seconds))
    }

    /// 標準の5フィールドcron式(分 時 日 月 曜日)を受け取る。`cron`クレートが要求する秒フィールドは内部で`0`を補う。
    pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
        let with_seconds = format!("0 {}", expression.trim());
        CronSchedule::from_str(&with_seconds)
            .map(|schedule| Scheduler::Schedule(Box::new(schedule)))
            .map_err(|e| SchedulerError::InvalidCron(e.to_string()))
    }

    /// 次回発火までの秒数(概算)。ループのスリープ時間決定に使うだけで、スケジュールそのものの精度には影響しない。
    fn next_wait(&self) -> Duration {
        match self {
            Scheduler::Interval(duration) => *duration,
            Scheduler::Schedule(schedule) => {
                let now = Utc::now();
                schedule
                    .upcoming(Utc)
                    .take(1)
                    .next()
                    .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
                    .unwrap_or(Duration::ZERO)
            }
        }
    }

    /// 停止フラグを1秒以下の粒度で確認しながら次回ティックまで待つ。停止要求があれば即座に戻る。
    pub fn wait_for_next_tick(&self, running: &Arc<AtomicBool>) -> bool {
        let mut remaining = self.next_wait();
        while remaining > Duration::ZERO {
            if !running.load(Ordering::SeqCst) {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_mode_waits_then_reports_running() {
        let scheduler = Scheduler::interval(0);
        let running = Arc::new(AtomicBool::new(true));
        assert!(scheduler.wait_for_next_tick(&running));
    }

    #[test]
    fn stop_flag_interrupts_wait_immediately() {
        let scheduler = Scheduler::interval(5);
        let running = Arc::new(AtomicBool::new(false));
        assert!(!scheduler.wait_for_next_tick(&running));
    }

    #[test]
    fn rejects_invalid_cron_expression() {
        assert!(Scheduler::cron("not a cron expression").is_err());
    }

    #[test]
    fn accepts_five_field_cron_expression() {
        assert!(Scheduler::cron("*/5 * * * *").is_ok());
    }
}
