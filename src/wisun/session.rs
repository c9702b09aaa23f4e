// スマートメーターとのセッション管理(状態機械)
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::wisun::line::{RxLine, classify_line};
use crate::wisun::transport::{Transport, TransportError};
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o")]
    Io(#[from] TransportError),
    #[error("コマンド実行に失敗しました。 ER(hex) {0:X}")]
    Fail(u8),
    #[error("アクティブスキャンでスマートメーターが見つかりませんでした")]
    ScanTimedOut,
    #[error("PANA認証に失敗しました")]
    PanaSessionDisconnected,
    #[error("PANA認証がタイムアウトしました")]
    JoinTimedOut,
    #[error("停止要求により中断しました")]
    Stopped,
}

/// ルートB認証情報
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(id: impl Into<String>, password: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        let password = password.into();
        if id.len() != 32 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("B-route IDは32文字の16進数です".to_string());
        }
        if password.is_empty() {
            return Err("B-routeパスワードが空です".to_string());
        }
        Ok(Self { id, password })
    }
}

/// 接続先スマートメーターの手がかり。全て既知ならアクティブスキャンを省略する。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeterHint {
    pub channel: Option<u8>,
    pub pan_id: Option<u16>,
    pub ipv6: Option<Ipv6Addr>,
}

/// アクティブスキャン/設定で確定した接続先
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeterEndpoint {
    pub ipv6: Ipv6Addr,
    pub channel: u8,
    pub pan_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    PortOpen,
    CredentialsSet,
    Scanning,
    Scanned,
    RegistersSet,
    Joining,
    Joined,
    Failed,
}

const SCAN_WINDOW: Duration = Duration::from_secs(20);
const JOIN_WINDOW: Duration = Duration::from_secs(30);

/// スマートメーターとのPANAセッションを管理する。トランスポートを専有する。
pub struct Session {
    transport: Transport,
    state: SessionState,
    running: Arc<AtomicBool>,
}

impl Session {
    pub fn new(transport: Transport, running: Arc<AtomicBool>) -> Self {
        Self {
            transport,
            state: SessionState::Closed,
            running,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    fn stopping(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    fn send_command(&mut self, command: &str) -> Result<(), SessionError> {
        self.transport.send(command.as_bytes())?;
        Ok(())
    }

    /// 応答が`OK`になるまで読み、`FAIL`なら`Error::Fail`を返す。
    fn expect_ok(&mut self) -> Result<(), SessionError> {
        loop {
            let line = self.transport.read_line()?;
            match classify_line(&line) {
                RxLine::Ok => return Ok(()),
                RxLine::Fail(code) => return Err(SessionError::Fail(code)),
                _ => continue,
            }
        }
    }

    /// 指定の接続情報を使ってスマートメーターへ接続する。状態遷移の全体を駆動する。
    pub fn connect(
        &mut self,
        credentials: &Credentials,
        hint: &MeterHint,
    ) -> Result<MeterEndpoint, SessionError> {
        match self.try_connect(credentials, hint) {
            Ok(endpoint) => Ok(endpoint),
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    fn try_connect(
        &mut self,
        credentials: &Credentials,
        hint: &MeterHint,
    ) -> Result<MeterEndpoint, SessionError> {
        // 1. Closed -> PortOpen
        self.transport.open()?;
        self.state = SessionState::PortOpen;

        // 2. PortOpen -> CredentialsSet
        self.send_command("SKVER\r\n")?;
        self.expect_ok()?;
        self.send_command(&format!("SKSETRBID {}\r\n", credentials.id))?;
        self.expect_ok()?;
        self.send_command(&format!("SKSETPWD C {}\r\n", credentials.password))?;
        self.expect_ok()?;
        self.state = SessionState::CredentialsSet;

        let endpoint = if let (Some(channel), Some(pan_id), Some(ipv6)) =
            (hint.channel, hint.pan_id, hint.ipv6)
        {
            MeterEndpoint { ipv6, channel, pan_id }
        } else {
            self.active_scan()?
        };

        // 5. -> RegistersSet
        self.send_command(&format!("SKSREG S2 {:02X}\r\n", endpoint.channel))?;
        self.expect_ok()?;
        self.send_command(&format!("SKSREG S3 {:04X}\r\n", endpoint.pan_id))?;
        self.expect_ok()?;
        self.state = SessionState::RegistersSet;

        // 6. RegistersSet -> Joining -> Joined
        self.state = SessionState::Joining;
        let ipv6_text = endpoint.ipv6.segments().iter().map(|n| format!("{:04X}", n)).collect::<Vec<_>>().join(":");
        self.send_command(&format!("SKJOIN {}\r\n", ipv6_text))?;
        self.expect_ok()?;
        self.wait_for_join()?;
        self.state = SessionState::Joined;

        Ok(endpoint)
    }

    fn active_scan(&mut self) -> Result<MeterEndpoint, SessionError> {
        self.state = SessionState::Scanning;
        self.send_command("SKSCAN 2 FFFFFFFF 6\r\n")?;
        self.expect_ok()?;

        let deadline = Instant::now() + SCAN_WINDOW;
        let mut addr: Option<u64> = None;
        let mut channel: Option<u8> = None;
        let mut pan_id: Option<u16> = None;

        while Instant::now() < deadline {
            if self.stopping() {
                return Err(SessionError::Stopped);
            }
            let line = match self.transport.read_line() {
                Ok(line) => line,
                Err(_) => continue,
            };
            match classify_line(&line) {
                RxLine::Field(key, value) if key.eq_ignore_ascii_case("Addr") => {
                    addr = u64::from_str_radix(&value, 16).ok();
                }
                RxLine::Field(key, value) if key.eq_ignore_ascii_case("Channel") => {
                    channel = u8::from_str_radix(&value, 16).ok();
                }
                RxLine::Field(key, value) if key.eq_ignore_ascii_case("Pan ID") => {
                    pan_id = u16::from_str_radix(&value, 16).ok();
                }
                RxLine::Event(event) if event.code == 0x22 => break, // アクティブスキャン終了
                _ => continue,
            }
            if addr.is_some() && channel.is_some() && pan_id.is_some() {
                break;
            }
        }

        let (addr, channel, pan_id) = match (addr, channel, pan_id) {
            (Some(a), Some(c), Some(p)) => (a, c, p),
            _ => return Err(SessionError::ScanTimedOut),
        };

        self.state = SessionState::Scanned;
        let ipv6 = self.resolve_link_local(addr)?;
        Ok(MeterEndpoint { ipv6, channel, pan_id })
    }

    /// `SKLL64`で対向アドレスのリンクローカルIPv6表現を得る
    fn resolve_link_local(&mut self, addr: u64) -> Result<Ipv6Addr, SessionError> {
        self.send_command(&format!("SKLL64 {:016X}\r\n", addr))?;
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let line = self.transport.read_line()?;
            if let RxLine::Other(text) = classify_line(&line)
                && let Ok(ipv6) = text.parse::<Ipv6Addr>() {
                    return Ok(ipv6);
                }
        }
        // 応答が得られなければ仕様上のフォールバックとしてMACアドレスから直接導出する
        Ok(mac_to_link_local(addr))
    }

    fn wait_for_join(&mut self) -> Result<(), SessionError> {
        let deadline = Instant::now() + JOIN_WINDOW;
        while Instant::now() < deadline {
            if self.stopping() {
                return Err(SessionError::Stopped);
            }
            let line = match self.transport.read_line() {
                Ok(line) => line,
                Err(_) => continue,
            };
            match classify_line(&line) {
                RxLine::Event(event) if event.code == 0x25 => return Ok(()),
                RxLine::Event(event) if event.code == 0x24 => {
                    return Err(SessionError::PanaSessionDisconnected);
                }
                other => {
                    tracing::debug!(target: "session", "{:?}", other);
                    continue;
                }
            }
        }
        Err(SessionError::JoinTimedOut)
    }

    pub fn close(&mut self) {
        self.transport.close();
        self.state = SessionState::Closed;
    }
}

/// MACアドレスの最初のバイトの下位2bit目を反転した上でFE80::/64に埋め込む
fn mac_to_link_local(mac: u64) -> Ipv6Addr {
    let bits = 0xFE80_0000_0000_0000u128 << 64 | (mac as u128 ^ 0x0200_0000_0000_0000u128);
    Ipv6Addr::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_credentials() {
        assert!(Credentials::new("short", "password1234").is_err());
        assert!(Credentials::new("a".repeat(32), "").is_err());
        assert!(Credentials::new("a".repeat(32), "password1234").is_ok());
    }

    #[test]
    fn mac_address_maps_to_link_local() {
        let addr = mac_to_link_local(0x1234_5678_ABCD_ABCD);
        assert!(addr.segments()[0] == 0xFE80);
    }
}
