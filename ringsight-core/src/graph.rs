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

//! Transaction Graph Model
//!
//! Typed directed multigraph of accounts and transactions. The graph is
//! assembled through [`GraphBuilder`] and frozen into an immutable
//! [`TransactionGraph`] snapshot, so concurrent readers never observe a
//! partially-constructed state. Adjacency lists are kept per account for
//! efficient traversal in both directions.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Stable account identifier
pub type AccountId = u64;

/// Transaction identifier (dense, assigned in insertion order)
pub type TxId = u64;

/// Relation type of a transaction edge. Each relation gets its own learned
/// transform in the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Payment,
    Transfer,
    Withdrawal,
}

impl RelationType {
    /// All relation variants, in index order
    pub const ALL: [RelationType; 3] = [
        RelationType::Payment,
        RelationType::Transfer,
        RelationType::Withdrawal,
    ];

    /// Dense index used for per-relation weight lookup
    pub fn index(self) -> usize {
        match self {
            RelationType::Payment => 0,
            RelationType::Transfer => 1,
            RelationType::Withdrawal => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Payment => "payment",
            RelationType::Transfer => "transfer",
            RelationType::Withdrawal => "withdrawal",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account node. Ground-truth fraud labels deliberately do NOT live here;
/// they are kept in the out-of-band [`crate::labels::LabelMap`] so the
/// inference path cannot read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Account age in days (30..=1825 for generated populations)
    pub account_age_days: u32,
    /// Declared risk score in [0, 1]
    pub declared_risk: f64,
}

/// Directed transaction edge between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub src: AccountId,
    pub dst: AccountId,
    /// Non-negative amount
    pub amount: f64,
    /// Seconds since the start of the generation window
    pub timestamp: u64,
    pub relation: RelationType,
}

/// Builder for [`TransactionGraph`]. Validates every insertion; `build`
/// freezes the graph into an immutable snapshot.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    accounts: BTreeMap<AccountId, Account>,
    transactions: Vec<Transaction>,
    next_account: AccountId,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with the next dense id
    pub fn add_account(&mut self, account_age_days: u32, declared_risk: f64) -> AccountId {
        let id = self.next_account;
        self.next_account += 1;
        self.accounts.insert(
            id,
            Account {
                id,
                account_age_days,
                declared_risk,
            },
        );
        id
    }

    /// Insert an account with an explicit id (used when reloading snapshots)
    pub fn insert_account(&mut self, account: Account) -> GraphResult<()> {
        if self.accounts.contains_key(&account.id) {
            return Err(GraphError::DuplicateAccount(account.id));
        }
        self.next_account = self.next_account.max(account.id + 1);
        self.accounts.insert(account.id, account);
        Ok(())
    }

    /// Add a transaction edge. Both endpoints must already exist, the
    /// endpoints must differ and the amount must be finite and non-negative.
    pub fn add_transaction(
        &mut self,
        src: AccountId,
        dst: AccountId,
        amount: f64,
        timestamp: u64,
        relation: RelationType,
    ) -> GraphResult<TxId> {
        if !self.accounts.contains_key(&src) {
            return Err(GraphError::UnknownAccount(src));
        }
        if !self.accounts.contains_key(&dst) {
            return Err(GraphError::UnknownAccount(dst));
        }
        if src == dst {
            return Err(GraphError::SelfTransfer(src));
        }
        let id = self.transactions.len() as TxId;
        if !amount.is_finite() || amount < 0.0 {
            return Err(GraphError::InvalidAmount { tx: id, amount });
        }
        self.transactions.push(Transaction {
            id,
            src,
            dst,
            amount,
            timestamp,
            relation,
        });
        Ok(id)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Freeze the builder into an immutable snapshot
    pub fn build(self) -> TransactionGraph {
        TransactionGraph::from_parts(self.accounts, self.transactions)
    }
}

/// Immutable transaction-graph snapshot. Created once per generation run;
/// read-only for the detector and the explainer.
#[derive(Debug, Clone)]
pub struct TransactionGraph {
    accounts: BTreeMap<AccountId, Account>,
    transactions: Vec<Transaction>,
    outgoing: HashMap<AccountId, Vec<TxId>>,
    incoming: HashMap<AccountId, Vec<TxId>>,
}

/// Aggregate statistics over a graph snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub account_count: usize,
    pub transaction_count: usize,
    /// Transaction counts indexed by [`RelationType::index`]
    pub relation_counts: [usize; 3],
    pub total_volume: f64,
}

impl TransactionGraph {
    fn from_parts(
        accounts: BTreeMap<AccountId, Account>,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut outgoing: HashMap<AccountId, Vec<TxId>> = HashMap::new();
        let mut incoming: HashMap<AccountId, Vec<TxId>> = HashMap::new();
        for tx in &transactions {
            outgoing.entry(tx.src).or_default().push(tx.id);
            incoming.entry(tx.dst).or_default().push(tx.id);
        }
        Self {
            accounts,
            transactions,
            outgoing,
            incoming,
        }
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn contains_account(&self, id: AccountId) -> bool {
        self.accounts.contains_key(&id)
    }

    pub fn transaction(&self, id: TxId) -> Option<&Transaction> {
        self.transactions.get(id as usize)
    }

    /// Transaction ids leaving `id`, ascending
    pub fn outgoing(&self, id: AccountId) -> &[TxId] {
        self.outgoing.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transaction ids arriving at `id`, ascending
    pub fn incoming(&self, id: AccountId) -> &[TxId] {
        self.incoming.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, id: AccountId) -> usize {
        self.outgoing(id).len() + self.incoming(id).len()
    }

    /// Accounts in ascending id order
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Sorted account ids
    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.keys().copied().collect()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn stats(&self) -> GraphStats {
        let mut relation_counts = [0usize; 3];
        let mut total_volume = 0.0;
        for tx in &self.transactions {
            relation_counts[tx.relation.index()] += 1;
            total_volume += tx.amount;
        }
        GraphStats {
            account_count: self.accounts.len(),
            transaction_count: self.transactions.len(),
            relation_counts,
            total_volume,
        }
    }

    /// Save the snapshot as JSON, atomically (temp file + rename)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> GraphResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let data = GraphPersistence {
            accounts: self.accounts.values().cloned().collect(),
            transactions: self.transactions.clone(),
        };
        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &data)?;
        writer.flush()?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load a snapshot previously written by [`save_to_file`]. Feature
    /// vectors, amounts, timestamps and relation types round-trip exactly.
    ///
    /// [`save_to_file`]: TransactionGraph::save_to_file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GraphResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let data: GraphPersistence = serde_json::from_reader(reader)?;
        let accounts: BTreeMap<AccountId, Account> =
            data.accounts.into_iter().map(|a| (a.id, a)).collect();
        Ok(Self::from_parts(accounts, data.transactions))
    }
}

/// Persistence format
#[derive(Debug, Serialize, Deserialize)]
struct GraphPersistence {
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_account_builder() -> GraphBuilder {
        let mut builder = GraphBuilder::new();
        builder.add_account(400, 0.2);
        builder.add_account(900, 0.1);
        builder
    }

    #[test]
    fn test_builder_assigns_dense_ids() {
        let mut builder = GraphBuilder::new();
        assert_eq!(builder.add_account(100, 0.5), 0);
        assert_eq!(builder.add_account(200, 0.3), 1);
    }

    #[test]
    fn test_insert_account_rejects_duplicates() {
        let mut builder = GraphBuilder::new();
        builder
            .insert_account(Account {
                id: 5,
                account_age_days: 100,
                declared_risk: 0.4,
            })
            .unwrap();
        let err = builder
            .insert_account(Account {
                id: 5,
                account_age_days: 200,
                declared_risk: 0.1,
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateAccount(5)));
        // Fresh ids continue past explicitly inserted ones
        assert_eq!(builder.add_account(300, 0.2), 6);
    }

    #[test]
    fn test_transaction_requires_existing_accounts() {
        let mut builder = two_account_builder();
        let err = builder
            .add_transaction(0, 7, 100.0, 10, RelationType::Payment)
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownAccount(7)));
    }

    #[test]
    fn test_self_transfer_rejected() {
        let mut builder = two_account_builder();
        let err = builder
            .add_transaction(1, 1, 50.0, 10, RelationType::Transfer)
            .unwrap_err();
        assert!(matches!(err, GraphError::SelfTransfer(1)));
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let mut builder = two_account_builder();
        assert!(builder
            .add_transaction(0, 1, -1.0, 10, RelationType::Payment)
            .is_err());
        assert!(builder
            .add_transaction(0, 1, f64::NAN, 10, RelationType::Payment)
            .is_err());
    }

    #[test]
    fn test_adjacency() {
        let mut builder = two_account_builder();
        builder.add_account(30, 0.9);
        let t0 = builder
            .add_transaction(0, 1, 100.0, 10, RelationType::Payment)
            .unwrap();
        let t1 = builder
            .add_transaction(0, 2, 25.0, 20, RelationType::Transfer)
            .unwrap();
        let graph = builder.build();

        assert_eq!(graph.outgoing(0), &[t0, t1]);
        assert_eq!(graph.incoming(1), &[t0]);
        assert_eq!(graph.incoming(2), &[t1]);
        assert_eq!(graph.degree(0), 2);
        assert!(graph.outgoing(1).is_empty());
    }

    #[test]
    fn test_stats() {
        let mut builder = two_account_builder();
        builder
            .add_transaction(0, 1, 100.0, 10, RelationType::Payment)
            .unwrap();
        builder
            .add_transaction(1, 0, 40.0, 20, RelationType::Withdrawal)
            .unwrap();
        let stats = builder.build().stats();
        assert_eq!(stats.account_count, 2);
        assert_eq!(stats.transaction_count, 2);
        assert_eq!(stats.relation_counts, [1, 0, 1]);
        assert!((stats.total_volume - 140.0).abs() < 1e-9);
    }

    #[test]
    fn test_persistence_round_trip_exact() {
        let mut builder = GraphBuilder::new();
        builder.add_account(123, 0.123456789012345);
        builder.add_account(1825, 0.987654321);
        builder
            .add_transaction(0, 1, 1199.9999999, 3601, RelationType::Transfer)
            .unwrap();
        builder
            .add_transaction(1, 0, 0.01, 7200, RelationType::Withdrawal)
            .unwrap();
        let graph = builder.build();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        graph.save_to_file(&path).unwrap();
        let reloaded = TransactionGraph::load_from_file(&path).unwrap();

        assert_eq!(graph.account_count(), reloaded.account_count());
        for account in graph.accounts() {
            assert_eq!(Some(account), reloaded.account(account.id));
        }
        assert_eq!(graph.transactions(), reloaded.transactions());
        // Adjacency is rebuilt, not persisted
        assert_eq!(graph.outgoing(0), reloaded.outgoing(0));
        assert_eq!(graph.incoming(0), reloaded.incoming(0));
    }
}
