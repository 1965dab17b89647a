// Copyright 2026 Ringsight (https://github.com/ringsight)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Core error types

use crate::graph::{AccountId, TxId};
use thiserror::Error;

/// Result type for graph-model operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur while building, persisting or reading the graph model
#[derive(Debug, Error)]
pub enum GraphError {
    /// A transaction references an account that does not exist
    #[error("Unknown account: {0}")]
    UnknownAccount(AccountId),

    /// A transaction has identical source and destination
    #[error("Self-transfer rejected for account {0}")]
    SelfTransfer(AccountId),

    /// A transaction amount is negative or not finite
    #[error("Invalid amount {amount} on transaction {tx}")]
    InvalidAmount { tx: TxId, amount: f64 },

    /// An account id was inserted twice
    #[error("Duplicate account: {0}")]
    DuplicateAccount(AccountId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for GraphError {
    fn from(e: toml::de::Error) -> Self {
        GraphError::Config(e.to_string())
    }
}
