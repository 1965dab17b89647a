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

//! Per-account fraud-probability table.
//!
//! Scores are written once per scoring pass and kept outside the immutable
//! graph snapshot. This is also the serialized score artifact exchanged at
//! the system boundary.

use crate::error::GraphResult;
use crate::graph::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreTable {
    scores: BTreeMap<AccountId, f32>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: AccountId, probability: f32) {
        self.scores.insert(id, probability);
    }

    pub fn get(&self, id: AccountId) -> Option<f32> {
        self.scores.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AccountId, f32)> + '_ {
        self.scores.iter().map(|(&id, &p)| (id, p))
    }

    /// The `n` highest-scoring accounts, descending; ties resolve to the
    /// lower account id for stable output.
    pub fn top_n(&self, n: usize) -> Vec<(AccountId, f32)> {
        let mut entries: Vec<(AccountId, f32)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
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
