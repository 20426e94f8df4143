pub mod error;
pub mod grid;
pub mod key;
pub mod key_info;
pub mod priority;
pub mod relation;
pub mod tracker;

pub use error::CoreError;
pub use grid::GridCodec;
pub use key::KeyCodec;
pub use key_info::KeyInfo;
pub use priority::PriorityTable;
pub use relation::RelationChar;
pub use tracker::{TrackerData, TrackerKind};
