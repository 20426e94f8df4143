//! Tracker update algorithm, cross-tracker aggregation and run orchestration (spec §4.8,
//! §4.9, §2, §5). `dg-core` defines the data model and codecs, `dg-store` reads and writes
//! trackers and the global map; this crate is where they're driven to actually update a
//! project's trackers from one run to the next.

pub mod main_aggregator;
pub mod ops;
pub mod orchestrator;
pub mod relevant_set;
pub mod report;
pub mod updater;

pub use main_aggregator::MainAggregator;
pub use ops::{export_relations_csv, merge_trackers, remove_key, RemoveKeyReport, TrackerDescriptor};
pub use orchestrator::{Orchestrator, ProjectLayout};
pub use relevant_set::compute_relevant_set;
pub use report::{RunReport, RunStatus, UpdateReport};
pub use updater::{StructuralMode, SuggestionMap, TrackerUpdater, UpdateParams};
