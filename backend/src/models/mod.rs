pub mod instrument;
pub mod marker;
pub mod snapshot;

pub use instrument::{FilterOption, InstrumentInfo};
pub use marker::{ChangeType, PositionChange, TradeMarker};
pub use snapshot::{DaySummary, PositionDetail, SnapshotData, UnderlyingRange};
