// Wi-SUNモジュール(SKSTACK/IP)との通信
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
pub mod line;
pub mod session;
pub mod transaction;
pub mod transport;

pub use session::{Credentials, MeterEndpoint, MeterHint, Session, SessionError, SessionState};
pub use transaction::{Transaction, TransactionError};
pub use transport::{Transport, TransportError};
