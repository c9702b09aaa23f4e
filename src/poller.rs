// スマートメーター一回分のポーリング(ティック)
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::property::{
    CumulativeAmountsPower, HistoricalCumulativeAmount, HistoryCollectionDay, InstantaneousCurrent,
    InstantaneousPower, ScheduledCumulativeAmount, UnitForCumulativeAmountsPower,
};
use crate::echonetlite::property;
use crate::record::MeasurementRecord;
use crate::wisun::Transaction;
use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;

/// 1ティック分のポーリングを実行する。各ステップは独立で、途中で失敗しても後続は続ける。
pub fn poll_once(transaction: &mut Transaction, local_tz: Tz, now: DateTime<Utc>) -> MeasurementRecord {
    let mut record = MeasurementRecord::new(now);

    // 1. E1 単位 -> 乗数。失敗時は1倍にフォールバックする。
    let unit = transaction
        .get(UnitForCumulativeAmountsPower::EPC)
        .ok()
        .and_then(|edata| UnitForCumulativeAmountsPower::try_from(&edata.as_edata()).ok())
        .unwrap_or_else(UnitForCumulativeAmountsPower::unknown);

    // 2. E0 積算電力量
    if let Ok(edata) = transaction.get(CumulativeAmountsPower::EPC)
        && let Ok(cumulative) = CumulativeAmountsPower::try_from(&edata.as_edata()) {
            record.cumulative_power_kwh = Some(cumulative.kwh(&unit));
        }

    // 3. E7 瞬時電力
    if let Ok(edata) = transaction.get(InstantaneousPower::EPC)
        && let Ok(power) = InstantaneousPower::try_from(&edata.as_edata()) {
            record.instant_power_w = Some(power.0);
        }

    // 4. E8 瞬時電流
    if let Ok(edata) = transaction.get(InstantaneousCurrent::EPC)
        && let Ok(current) = InstantaneousCurrent::try_from(&edata.as_edata()) {
            record.current_a = Some(current.representative());
            record.current_r_a = Some(current.r);
            record.current_t_a = current.t;
        }

    // 5. EA 定時積算電力量
    if let Ok(edata) = transaction.get(ScheduledCumulativeAmount::EPC)
        && let Ok(scheduled) = ScheduledCumulativeAmount::try_from(&edata.as_edata()) {
            record.historical_timestamp = Some(localize_to_utc(local_tz, scheduled.time_point.date(), {
                let t = scheduled.time_point.time();
                (t.hour(), t.minute(), t.second())
            }));
            record.historical_cumulative_power_kwh = Some(scheduled.kwh(&unit));
        }

    // 6. E2 30分値履歴。今日単独で試し、だめなら昨日も取得して連結する。
    let today_history = fetch_history(transaction, HistoryCollectionDay::Today);
    let mut delta = today_history
        .as_ref()
        .and_then(|today| recent_30min(None, today, local_tz, now, &unit));

    if delta.is_none()
        && let Some(today) = &today_history
            && let Some(yesterday) = fetch_history(transaction, HistoryCollectionDay::Yesterday) {
                delta = recent_30min(Some(&yesterday), today, local_tz, now, &unit);
            }

    if let Some((timestamp, consumption)) = delta {
        record.recent_30min_timestamp = Some(timestamp);
        record.recent_30min_consumption_kwh = Some(consumption);
    }

    record
}

fn fetch_history(
    transaction: &mut Transaction,
    which: HistoryCollectionDay,
) -> Option<HistoricalCumulativeAmount> {
    transaction.set(property::EPC_HISTORY_COLLECTION_DAY, &which.edt()).ok()?;
    let edata = transaction.get(HistoricalCumulativeAmount::EPC).ok()?;
    HistoricalCumulativeAmount::try_from(&edata.as_edata()).ok()
}

fn localize_to_utc(tz: Tz, date: chrono::NaiveDate, (h, m, s): (u32, u32, u32)) -> DateTime<Utc> {
    let naive = date.and_hms_opt(h, m, s).unwrap_or_else(|| date.and_hms_opt(0, 0, 0).unwrap());
    tz.from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

fn half_hour_timestamp(tz: Tz, date: NaiveDate, slot: usize) -> DateTime<Utc> {
    let minutes = (slot as u32) * 30;
    localize_to_utc(tz, date, (minutes / 60, minutes % 60, 0))
}

/// 直近30分の消費量を求める。存在すれば(最新時刻, 消費量kWh)を返す。
fn recent_30min(
    yesterday: Option<&HistoricalCumulativeAmount>,
    today: &HistoricalCumulativeAmount,
    tz: Tz,
    now: DateTime<Utc>,
    unit: &UnitForCumulativeAmountsPower,
) -> Option<(DateTime<Utc>, Decimal)> {
    let local_today = now.with_timezone(&tz).date_naive();
    let local_yesterday = local_today.pred_opt()?;

    let mut series: Vec<(NaiveDate, usize, Option<u32>)> = Vec::new();
    if let Some(yesterday) = yesterday {
        for (slot, reading) in yesterday.readings.iter().enumerate() {
            series.push((local_yesterday, slot, *reading));
        }
    }
    for (slot, reading) in today.readings.iter().enumerate() {
        series.push((local_today, slot, *reading));
    }

    let mut found: Vec<(NaiveDate, usize, u32)> = Vec::new();
    for (date, slot, reading) in series.into_iter().rev() {
        if let Some(value) = reading {
            found.push((date, slot, value));
            if found.len() == 2 {
                break;
            }
        }
    }
    if found.len() < 2 {
        return None;
    }
    let (latest_date, latest_slot, latest_value) = found[0];
    let (_, _, previous_value) = found[1];
    let consumption = Decimal::from(latest_value.saturating_sub(previous_value)) * unit.0;
    let timestamp = half_hour_timestamp(tz, latest_date, latest_slot);
    Some((timestamp, consumption))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(collection_day: u16, readings: Vec<Option<u32>>) -> HistoricalCumulativeAmount {
        HistoricalCumulativeAmount { collection_day, readings }
    }

    #[test]
    fn delta_from_two_latest_today_readings() {
        let mut readings = vec![None; 48];
        readings[10] = Some(1000);
        readings[11] = Some(1050);
        let today = history(0, readings);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let unit = UnitForCumulativeAmountsPower(Decimal::new(1, 1));
        let (timestamp, consumption) = recent_30min(None, &today, chrono_tz::Asia::Tokyo, now, &unit).unwrap();
        assert_eq!(consumption, Decimal::new(50, 1));
        assert_eq!(timestamp.with_timezone(&chrono_tz::Asia::Tokyo).time().hour(), 5);
    }

    #[test]
    fn falls_back_to_none_with_fewer_than_two_readings() {
        let mut readings = vec![None; 48];
        readings[10] = Some(1000);
        let today = history(0, readings);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let unit = UnitForCumulativeAmountsPower(Decimal::new(1, 1));
        assert!(recent_30min(None, &today, chrono_tz::Asia::Tokyo, now, &unit).is_none());
    }

    #[test]
    fn crosses_midnight_into_yesterday() {
        let mut today_readings = vec![None; 48];
        today_readings[0] = Some(2000);
        let mut yesterday_readings = vec![None; 48];
        yesterday_readings[47] = Some(1950);
        let today = history(0, today_readings);
        let yesterday = history(1, yesterday_readings);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 10, 0).unwrap();
        let unit = UnitForCumulativeAmountsPower(Decimal::new(1, 1));
        let (_, consumption) = recent_30min(Some(&yesterday), &today, chrono_tz::Asia::Tokyo, now, &unit).unwrap();
        assert_eq!(consumption, Decimal::new(50, 1));
    }
}
