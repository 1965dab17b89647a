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

//! Ground-truth labels, kept out-of-band.
//!
//! The generator records which accounts and transactions belong to injected
//! fraud topologies here rather than on the graph objects themselves, so the
//! detector's inference path cannot read them by construction. The label map
//! is consumed only by training and evaluation.

use crate::error::GraphResult;
use crate::graph::{AccountId, TxId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Which injected topology marked an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudPattern {
    CyclicRing,
    FanOut,
    RapidFire,
}

/// Out-of-band ground truth for a generated graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelMap {
    fraud_accounts: BTreeSet<AccountId>,
    laundering_txs: BTreeSet<TxId>,
    patterns: BTreeMap<AccountId, FraudPattern>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_account(&mut self, id: AccountId, pattern: FraudPattern) {
        self.fraud_accounts.insert(id);
        self.patterns.insert(id, pattern);
    }

    pub fn mark_transaction(&mut self, id: TxId) {
        self.laundering_txs.insert(id);
    }

    pub fn is_fraud_account(&self, id: AccountId) -> bool {
        self.fraud_accounts.contains(&id)
    }

    pub fn is_laundering_tx(&self, id: TxId) -> bool {
        self.laundering_txs.contains(&id)
    }

    pub fn pattern(&self, id: AccountId) -> Option<FraudPattern> {
        self.patterns.get(&id).copied()
    }

    pub fn fraud_accounts(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.fraud_accounts.iter().copied()
    }

    pub fn fraud_account_count(&self) -> usize {
        self.fraud_accounts.len()
    }

    pub fn laundering_tx_count(&self) -> usize {
        self.laundering_txs.len()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> GraphResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GraphResult<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
