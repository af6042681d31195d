// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query orchestration for the Quarry plugin engine.
//!
//! Every dispatched query opens a generation. Candidate plugins are queried
//! concurrently; their answers flow through one channel into a single merge
//! task that debounces bursts, keeps the newest contribution per plugin, and
//! ranks the merged list. Consumers read [`QueryEvent`]s.

pub mod events;
pub mod generation;
pub mod merge;
pub mod orchestrator;
pub mod ranking;
pub mod records;

pub use events::QueryEvent;
pub use generation::Generation;
pub use orchestrator::{OrchestratorOptions, QueryOrchestrator};
pub use ranking::{RankingPolicy, TOPMOST_SCORE};
pub use records::{RecordKey, ResultRecords};
