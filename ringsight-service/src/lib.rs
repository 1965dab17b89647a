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

//! Ringsight Service
//!
//! The facade the request-serving layer calls: `score(account_id)` and
//! `explain(account_id)`, backed by the trained detector, the explanation
//! engine and a per-operation result cache with TTL and single-flight
//! de-duplication.

pub mod cache;
pub mod service;

pub use cache::{BackendError, CacheBackend, CacheStats, ResultCache, ResultCacheConfig};
pub use service::{FraudService, ScoreOutcome, ServiceError};
