use super::index::StateIndex;
use super::table::{Column, StateTableView, StateValue, TableShared};
use crate::error::CadenceResult;
use std::fmt;
use std::sync::Arc;

/// Typed reader of one state table slot.
///
/// Cheap to clone and safe to use from any thread; reads never block the
/// writer and never return a row that is being overwritten.
pub struct StateAccessor<T> {
    shared: Arc<TableShared>,
    column: Arc<Column<T>>,
}

impl<T: StateValue> StateAccessor<T> {
    pub(crate) fn new(shared: Arc<TableShared>, column: Arc<Column<T>>) -> Self {
        Self { shared, column }
    }

    pub fn name(&self) -> &str {
        self.column.name()
    }

    /// Value committed at `index`, or `StaleIndex`
    pub fn get(&self, index: &StateIndex) -> CadenceResult<Arc<T>> {
        self.shared.read(&self.column, index)
    }

    /// Owned copy of the value committed at `index`
    pub fn get_value(&self, index: &StateIndex) -> CadenceResult<T> {
        self.get(index).map(|value| T::clone(&value))
    }

    /// Most recently committed value
    pub fn get_latest(&self) -> CadenceResult<Arc<T>> {
        self.read_at_offset(0)
    }

    /// Value committed `offset` advances ago
    pub fn read_at_offset(&self, offset: usize) -> CadenceResult<Arc<T>> {
        let index = self.shared.index_reader(offset)?;
        self.get(&index)
    }

    /// Latest value, or the initial value before the first advance
    pub fn latest_or_initial(&self) -> Arc<T> {
        self.get_latest()
            .unwrap_or_else(|_| self.column.initial().clone())
    }

    /// Value the slot was registered with
    pub fn initial(&self) -> Arc<T> {
        self.column.initial().clone()
    }

    pub fn latest_tick(&self) -> u64 {
        self.shared.now()
    }

    pub fn view(&self) -> StateTableView {
        StateTableView::from_shared(self.shared.clone())
    }
}

impl<T> Clone for StateAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            column: self.column.clone(),
        }
    }
}

impl<T> fmt::Debug for StateAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateAccessor")
            .field("name", &self.column.name())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
