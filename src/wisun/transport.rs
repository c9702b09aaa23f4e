// シリアル通信層 (Wi-SUNモジュールとのUART接続)
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::io::{self, BufRead, BufReader};
use std::time::Duration;
use thiserror::Error;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("シリアルポートを開けません: {0}")]
    Open(#[from] serialport::Error),
    #[error("i/o エラー")]
    Io(#[from] io::Error),
}

/// Wi-SUNモジュールとのUART接続を専有するトランスポート層。
/// プロトコルの解釈は行わず、バイト列の送信と行単位の受信だけを提供する。
pub struct Transport {
    port_name: String,
    baud_rate: u32,
    reader: Option<BufReader<Box<dyn serialport::SerialPort>>>,
}

impl Transport {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            reader: None,
        }
    }

    pub fn open(&mut self) -> Result<(), TransportError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        self.reader = Some(BufReader::new(port));
        Ok(())
    }

    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// バイト列をそのまま送信する(テキストコマンドに加え、SKSENDTOの生バイナリ末尾もここを通る)
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            TransportError::Io(io::Error::new(io::ErrorKind::NotConnected, "port not open"))
        })?;
        let text = bytes.iter().map(|b| *b as char).filter(|c| c.is_ascii()).collect::<String>();
        tracing::trace!(target: "Tx->", "{}", text.escape_debug());
        reader.get_mut().write_all(bytes)?;
        Ok(())
    }

    /// CR/LF/CRLFで終端された一行を読む。読み取りタイムアウトは`io::ErrorKind::TimedOut`として伝播する。
    pub fn read_line(&mut self) -> Result<String, TransportError> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            TransportError::Io(io::Error::new(io::ErrorKind::NotConnected, "port not open"))
        })?;
        let mut buf = Vec::new();
        reader.read_until(b'\n', &mut buf)?;
        let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!(target: "<-Rx", "{}", line.escape_debug());
        Ok(line)
    }
}

use std::io::Write as _;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unopened_transport_errors_on_send_and_read() {
        let mut transport = Transport::new("/dev/null-does-not-exist", 115200);
        assert!(!transport.is_open());
        assert!(transport.send(b"SKVER\r\n").is_err());
        assert!(transport.read_line().is_err());
    }
}
