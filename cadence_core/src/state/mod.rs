//! Tick-indexed history of published values

pub mod accessor;
pub mod index;
pub mod table;

pub use accessor::StateAccessor;
pub use index::StateIndex;
pub use table::{
    CycleState, PeriodStatistics, StateDataId, StateTable, StateTableView, StateValue,
    MIN_STATE_TABLE_LENGTH, PERIOD, TIC, TOC,
};
