// Echonetlite 低圧スマートメータークラス プロパティ
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::EchonetliteEdata;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;

/// 0xe0 積算電力量計測値(正方向計測値)
pub const EPC_CUMULATIVE_POWER: u8 = 0xe0;
/// 0xe1 積算電力量単位(正方向、逆方向計測値)
pub const EPC_CUMULATIVE_POWER_UNIT: u8 = 0xe1;
/// 0xe2 積算電力量計測値履歴1(正方向計測値)
pub const EPC_CUMULATIVE_POWER_HISTORY: u8 = 0xe2;
/// 0xe5 積算履歴収集日1
pub const EPC_HISTORY_COLLECTION_DAY: u8 = 0xe5;
/// 0xe7 瞬時電力計測値
pub const EPC_INSTANT_POWER: u8 = 0xe7;
/// 0xe8 瞬時電流計測値
pub const EPC_INSTANT_CURRENT: u8 = 0xe8;
/// 0xea 定時積算電力量計測値(正方向計測値)
pub const EPC_SCHEDULED_CUMULATIVE_POWER: u8 = 0xea;

/// 0xe2 に渡す「収集日」の値。0=今日、1=昨日。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum HistoryCollectionDay {
    Today,
    Yesterday,
}

impl HistoryCollectionDay {
    pub fn edt(self) -> [u8; 1] {
        match self {
            HistoryCollectionDay::Today => [0x00],
            HistoryCollectionDay::Yesterday => [0x01],
        }
    }
}

/// 六つのプロパティのうちデコードできたもの
#[derive(Clone, PartialEq, Debug)]
pub enum Properties {
    CumulativeAmountsPower(CumulativeAmountsPower),
    UnitForCumulativeAmountsPower(UnitForCumulativeAmountsPower),
    HistoricalCumulativeAmount(HistoricalCumulativeAmount),
    InstantaneousPower(InstantaneousPower),
    InstantaneousCurrent(InstantaneousCurrent),
    ScheduledCumulativeAmount(ScheduledCumulativeAmount),
}

impl<'a> TryFrom<&EchonetliteEdata<'a>> for Properties {
    type Error = String;

    fn try_from(edata: &EchonetliteEdata<'a>) -> Result<Self, Self::Error> {
        if let Ok(a) = CumulativeAmountsPower::try_from(edata) {
            Ok(Properties::CumulativeAmountsPower(a))
        } else if let Ok(a) = UnitForCumulativeAmountsPower::try_from(edata) {
            Ok(Properties::UnitForCumulativeAmountsPower(a))
        } else if let Ok(a) = HistoricalCumulativeAmount::try_from(edata) {
            Ok(Properties::HistoricalCumulativeAmount(a))
        } else if let Ok(a) = InstantaneousPower::try_from(edata) {
            Ok(Properties::InstantaneousPower(a))
        } else if let Ok(a) = InstantaneousCurrent::try_from(edata) {
            Ok(Properties::InstantaneousCurrent(a))
        } else if let Ok(a) = ScheduledCumulativeAmount::try_from(edata) {
            Ok(Properties::ScheduledCumulativeAmount(a))
        } else {
            Err(format!("UNKNOWN EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt))
        }
    }
}

/// 0xe0 積算電力量計測値(正方向計測値)。生の4バイト値、単位乗数はまだ適用していない。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct CumulativeAmountsPower(pub u32);

impl CumulativeAmountsPower {
    pub const EPC: u8 = EPC_CUMULATIVE_POWER;

    /// 単位乗数を適用してkWhにする
    pub fn kwh(&self, unit: &UnitForCumulativeAmountsPower) -> Decimal {
        Decimal::from(self.0) * unit.0
    }
}

impl<'a> TryFrom<&EchonetliteEdata<'a>> for CumulativeAmountsPower {
    type Error = String;

    fn try_from(edata: &EchonetliteEdata<'a>) -> Result<Self, Self::Error> {
        match edata.edt {
            &[a, b, c, d] if edata.epc == Self::EPC => Ok(Self(u32::from_be_bytes([a, b, c, d]))),
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for CumulativeAmountsPower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "積算電力量計測値(正方向計測値)={}", self.0)
    }
}

/// 0xe1 積算電力量単位(正方向、逆方向計測値)。未知の値は1.0倍として扱う。
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct UnitForCumulativeAmountsPower(pub Decimal);

impl UnitForCumulativeAmountsPower {
    pub const EPC: u8 = EPC_CUMULATIVE_POWER_UNIT;

    /// 未知の単位コードに対するフォールバック(×1倍)
    pub fn unknown() -> Self {
        Self(Decimal::new(1, 0))
    }
}

impl<'a> TryFrom<&EchonetliteEdata<'a>> for UnitForCumulativeAmountsPower {
    type Error = String;

    fn try_from(edata: &EchonetliteEdata<'a>) -> Result<Self, Self::Error> {
        if edata.epc != Self::EPC {
            return Err(format!("BAD EPC:0x{:X}", edata.epc));
        }
        match edata.edt {
            [0x00] => Ok(Self(Decimal::new(1, 0))),
            [0x01] => Ok(Self(Decimal::new(1, 1))),
            [0x02] => Ok(Self(Decimal::new(1, 2))),
            [0x03] => Ok(Self(Decimal::new(1, 3))),
            [0x04] => Ok(Self(Decimal::new(1, 4))),
            [0x0a] => Ok(Self(Decimal::new(10, 0))),
            [0x0b] => Ok(Self(Decimal::new(100, 0))),
            [0x0c] => Ok(Self(Decimal::new(1000, 0))),
            [0x0d] => Ok(Self(Decimal::new(10000, 0))),
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for UnitForCumulativeAmountsPower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "積算電力量単位(正方向、逆方向計測値)={} kwh", self.0)
    }
}

/// 0xe2 積算電力量計測値履歴1(正方向計測値)。48個の30分値、サンプル欠損はNone。
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct HistoricalCumulativeAmount {
    pub collection_day: u16,
    pub readings: Vec<Option<u32>>,
}

impl HistoricalCumulativeAmount {
    pub const EPC: u8 = EPC_CUMULATIVE_POWER_HISTORY;
    /// 欠損値を示すセンチネル
    const SENTINEL: u32 = 0xffff_fffe;
}

impl<'a> TryFrom<&EchonetliteEdata<'a>> for HistoricalCumulativeAmount {
    type Error = String;

    fn try_from(edata: &EchonetliteEdata<'a>) -> Result<Self, Self::Error> {
        if edata.epc != Self::EPC {
            return Err(format!("BAD EPC:0x{:X}", edata.epc));
        }
        // 2バイトの収集日 + 48 x 4バイトの読み値、計194バイト固定長
        if edata.edt.len() != 194 {
            return Err(format!(
                "BAD E2 length: expected 194 bytes, got {}",
                edata.edt.len()
            ));
        }
        let collection_day = u16::from_be_bytes([edata.edt[0], edata.edt[1]]);
        let readings = edata.edt[2..]
            .chunks_exact(4)
            .map(|quad| {
                let raw = u32::from_be_bytes(quad.try_into().unwrap());
                if raw == Self::SENTINEL { None } else { Some(raw) }
            })
            .collect();
        Ok(Self {
            collection_day,
            readings,
        })
    }
}

impl fmt::Display for HistoricalCumulativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "積算電力量計測値履歴1(正方向計測値) 収集日={} [{}]",
            self.collection_day,
            self.readings
                .iter()
                .map(|a| a.map_or("NA".to_string(), |n| n.to_string()))
                .collect::<Vec<String>>()
                .join(",")
        )
    }
}

/// 0xe7 瞬時電力計測値。単位はW、負の値もありうる。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct InstantaneousPower(pub i32);

impl InstantaneousPower {
    pub const EPC: u8 = EPC_INSTANT_POWER;
}

impl<'a> TryFrom<&EchonetliteEdata<'a>> for InstantaneousPower {
    type Error = String;

    fn try_from(edata: &EchonetliteEdata<'a>) -> Result<Self, Self::Error> {
        match edata.edt {
            &[a, b, c, d] if edata.epc == Self::EPC => {
                Ok(Self(i32::from_be_bytes([a, b, c, d])))
            }
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for InstantaneousPower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "瞬時電力={} W", self.0)
    }
}

/// 0xe8 瞬時電流計測値。単相2線式ではT相がNoneになる。
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct InstantaneousCurrent {
    pub r: Decimal,
    pub t: Option<Decimal>,
}

impl InstantaneousCurrent {
    pub const EPC: u8 = EPC_INSTANT_CURRENT;
    /// T相がこの値のときは単相2線式(T相なし)
    const SINGLE_PHASE_SENTINEL: i16 = 0x7ffe;

    /// 代表値。三相の場合はR+T、単相の場合はRそのもの。
    pub fn representative(&self) -> Decimal {
        match self.t {
            Some(t) => self.r + t,
            None => self.r,
        }
    }
}

impl<'a> TryFrom<&EchonetliteEdata<'a>> for InstantaneousCurrent {
    type Error = String;

    fn try_from(edata: &EchonetliteEdata<'a>) -> Result<Self, Self::Error> {
        match edata.edt {
            &[a, b, c, d] if edata.epc == Self::EPC => {
                let r_raw = i16::from_be_bytes([a, b]);
                let t_raw = i16::from_be_bytes([c, d]);
                let r = Decimal::new(r_raw as i64, 1);
                let t = if t_raw == Self::SINGLE_PHASE_SENTINEL {
                    None
                } else {
                    Some(Decimal::new(t_raw as i64, 1))
                };
                Ok(Self { r, t })
            }
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for InstantaneousCurrent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.t {
            None => write!(f, "瞬時電流:(1φ2W) {} A", self.r),
            Some(t) => write!(f, "瞬時電流:(1φ3W) R={} A, T={} A", self.r, t),
        }
    }
}

/// 0xea 定時積算電力量計測値(正方向計測値)
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ScheduledCumulativeAmount {
    pub time_point: NaiveDateTime,
    pub raw_value: u32,
}

impl ScheduledCumulativeAmount {
    pub const EPC: u8 = EPC_SCHEDULED_CUMULATIVE_POWER;

    pub fn kwh(&self, unit: &UnitForCumulativeAmountsPower) -> Decimal {
        Decimal::from(self.raw_value) * unit.0
    }
}

impl<'a> TryFrom<&EchonetliteEdata<'a>> for ScheduledCumulativeAmount {
    type Error = String;

    fn try_from(edata: &EchonetliteEdata<'a>) -> Result<Self, Self::Error> {
        match edata.edt {
            &[y0, y1, month, day, hour, minute, second, v0, v1, v2, v3]
                if edata.epc == Self::EPC =>
            {
                let year = u16::from_be_bytes([y0, y1]);
                let time_point = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
                    .ok_or_else(|| format!("BAD EA timestamp: {}-{}-{} {}:{}:{}", year, month, day, hour, minute, second))?;
                let raw_value = u32::from_be_bytes([v0, v1, v2, v3]);
                Ok(Self {
                    time_point,
                    raw_value,
                })
            }
            _ => Err(format!("BAD EPC:0x{:X} EDT:{:?}", edata.epc, edata.edt)),
        }
    }
}

impl fmt::Display for ScheduledCumulativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "定時積算電力量計測値(正方向計測値)={} ({})",
            self.time_point.format("%Y-%m-%d %H:%M:%S"),
            self.raw_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edata(epc: u8, edt: &[u8]) -> EchonetliteEdata<'_> {
        EchonetliteEdata {
            epc,
            pdc: edt.len() as u8,
            edt,
        }
    }

    #[test]
    fn instant_power_positive() {
        let e = edata(0xe7, &[0x00, 0x00, 0x00, 0x96]);
        let power = InstantaneousPower::try_from(&e).unwrap();
        assert_eq!(power.0, 150);
    }

    #[test]
    fn instant_power_negative() {
        let e = edata(0xe7, &[0xff, 0xff, 0xff, 0x9c]);
        let power = InstantaneousPower::try_from(&e).unwrap();
        assert_eq!(power.0, -100);
    }

    #[test]
    fn cumulative_with_unit_point_one() {
        let unit = UnitForCumulativeAmountsPower::try_from(&edata(0xe1, &[0x01])).unwrap();
        assert_eq!(unit.0, Decimal::new(1, 1));
        let cumulative = CumulativeAmountsPower::try_from(&edata(0xe0, &[0x00, 0x00, 0x03, 0xe8])).unwrap();
        assert_eq!(cumulative.kwh(&unit), Decimal::new(1000, 1));
    }

    #[test]
    fn single_phase_current() {
        let e = edata(0xe8, &[0x00, 0x64, 0x7f, 0xfe]);
        let current = InstantaneousCurrent::try_from(&e).unwrap();
        assert_eq!(current.r, Decimal::new(100, 1));
        assert_eq!(current.t, None);
        assert_eq!(current.representative(), Decimal::new(100, 1));
    }

    #[test]
    fn three_phase_current() {
        let e = edata(0xe8, &[0x00, 0x64, 0x00, 0x32]);
        let current = InstantaneousCurrent::try_from(&e).unwrap();
        assert_eq!(current.r, Decimal::new(100, 1));
        assert_eq!(current.t, Some(Decimal::new(50, 1)));
        assert_eq!(current.representative(), Decimal::new(150, 1));
    }

    #[test]
    fn scheduled_cumulative_amount() {
        let e = edata(
            0xea,
            &[0x07, 0xe8, 0x01, 0x0f, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x64],
        );
        let scheduled = ScheduledCumulativeAmount::try_from(&e).unwrap();
        assert_eq!(scheduled.time_point.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 10:00:00");
        let unit = UnitForCumulativeAmountsPower(Decimal::new(1, 1));
        assert_eq!(scheduled.kwh(&unit), Decimal::new(100, 1));
    }

    #[test]
    fn history_requires_exact_length() {
        assert!(HistoricalCumulativeAmount::try_from(&edata(0xe2, &[0; 10])).is_err());
    }

    #[test]
    fn history_decodes_sentinel_as_no_data() {
        let mut edt = vec![0u8; 194];
        edt[2..6].copy_from_slice(&0xffff_fffeu32.to_be_bytes());
        edt[6..10].copy_from_slice(&1000u32.to_be_bytes());
        let history = HistoricalCumulativeAmount::try_from(&edata(0xe2, &edt)).unwrap();
        assert_eq!(history.readings[0], None);
        assert_eq!(history.readings[1], Some(1000));
    }
}
