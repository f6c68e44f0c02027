use super::accessor::StateAccessor;
use super::index::StateIndex;
use crate::error::{CadenceError, CadenceResult};
use arc_swap::ArcSwap;
use crossbeam::utils::CachePadded;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Values that can be published through a state table
pub trait StateValue: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> StateValue for T {}

/// Smallest buffer length that leaves one row between writer and readers
pub const MIN_STATE_TABLE_LENGTH: usize = 3;

pub const TIC: &str = "Tic";
pub const TOC: &str = "Toc";
pub const PERIOD: &str = "Period";

// Row tick while the writer is filling it.
const WRITING: u64 = u64::MAX;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// One named slot: a circular array of a single value type
pub(crate) struct Column<T> {
    name: String,
    rows: Box<[ArcSwap<T>]>,
    initial: Arc<T>,
}

impl<T> Column<T> {
    fn new(name: &str, length: usize, initial: T) -> Self {
        let initial = Arc::new(initial);
        let rows = (0..length)
            .map(|_| ArcSwap::new(initial.clone()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            name: name.to_string(),
            rows,
            initial,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn initial(&self) -> &Arc<T> {
        &self.initial
    }
}

struct ColumnEntry {
    name: String,
    type_name: &'static str,
    column: Arc<dyn Any + Send + Sync>,
}

/// Timing summary of the cycles recorded by a state table (seconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodStatistics {
    pub samples: u64,
    pub period_min: f64,
    pub period_max: f64,
    pub period_avg: f64,
    pub compute_min: f64,
    pub compute_max: f64,
    pub compute_avg: f64,
    /// Cycles whose compute time exceeded the expected period
    pub overruns: u64,
}

impl PeriodStatistics {
    fn record(&mut self, period: Option<f64>, compute: f64, overrun: bool) {
        self.samples += 1;
        let n = self.samples as f64;
        if self.samples == 1 {
            self.compute_min = compute;
            self.compute_max = compute;
        } else {
            self.compute_min = self.compute_min.min(compute);
            self.compute_max = self.compute_max.max(compute);
        }
        self.compute_avg += (compute - self.compute_avg) / n;

        // The first cycle has no predecessor, so periods lag samples by one.
        if let Some(period) = period {
            let m = (self.samples - 1) as f64;
            if self.samples == 2 {
                self.period_min = period;
                self.period_max = period;
            } else {
                self.period_min = self.period_min.min(period);
                self.period_max = self.period_max.max(period);
            }
            self.period_avg += (period - self.period_avg) / m;
        }
        if overrun {
            self.overruns += 1;
        }
    }
}

/// Part of a table visible to readers on any thread
pub(crate) struct TableShared {
    id: u64,
    name: String,
    length: usize,
    ticks: CachePadded<AtomicU64>,
    row_ticks: Box<[AtomicU64]>,
    delay: AtomicUsize,
    columns: RwLock<Vec<ColumnEntry>>,
    average_period: AtomicU64,
    statistics: Mutex<PeriodStatistics>,
}

impl TableShared {
    pub(crate) fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn stale(&self, ticks: u64, now: u64) -> CadenceError {
        CadenceError::StaleIndex {
            ticks,
            now,
            length: self.length,
        }
    }

    pub(crate) fn index_reader(&self, offset: usize) -> CadenceResult<StateIndex> {
        let now = self.now();
        let offset = offset as u64;
        if now == 0 || offset >= now || offset + 1 >= self.length as u64 {
            return Err(self.stale(now.saturating_sub(offset), now));
        }
        let ticks = now - offset;
        Ok(StateIndex::new(
            row_of(ticks, self.length),
            ticks,
            self.length,
        ))
    }

    pub(crate) fn index_delayed(&self) -> CadenceResult<StateIndex> {
        self.index_reader(self.delay.load(Ordering::Relaxed))
    }

    pub(crate) fn read<T>(&self, column: &Column<T>, index: &StateIndex) -> CadenceResult<Arc<T>> {
        let now = self.now();
        let position = index.position();
        if index.ticks() == 0
            || index.length() != self.length
            || position >= self.length
            || !index.is_valid_at(now)
        {
            return Err(self.stale(index.ticks(), now));
        }

        let row = &self.row_ticks[position];
        if row.load(Ordering::Acquire) != index.ticks() {
            return Err(self.stale(index.ticks(), now));
        }
        let value = column.rows[position].load_full();
        fence(Ordering::Acquire);
        if row.load(Ordering::Relaxed) != index.ticks() {
            return Err(self.stale(index.ticks(), now));
        }
        Ok(value)
    }

    fn find_column<T: StateValue>(
        self: &Arc<Self>,
        name: &str,
    ) -> CadenceResult<StateAccessor<T>> {
        let columns = self.columns.read();
        let entry = columns
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| {
                CadenceError::state_table(format!("no data named '{}' in '{}'", name, self.name))
            })?;
        let column = entry
            .column
            .clone()
            .downcast::<Column<T>>()
            .map_err(|_| CadenceError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
                found: entry.type_name,
            })?;
        Ok(StateAccessor::new(self.clone(), column))
    }

    fn data_names(&self) -> Vec<String> {
        self.columns
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    fn average_period(&self) -> f64 {
        f64::from_bits(self.average_period.load(Ordering::Relaxed))
    }
}

fn row_of(ticks: u64, length: usize) -> usize {
    ((ticks - 1) % length as u64) as usize
}

/// Typed handle to a slot, returned by [`StateTable::add_data`]
pub struct StateDataId<T> {
    table: u64,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateDataId<T> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for StateDataId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateDataId<T> {}

impl<T> fmt::Debug for StateDataId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDataId")
            .field("table", &self.table)
            .field("index", &self.index)
            .finish()
    }
}

trait CellWrite: Send {
    fn name(&self) -> &str;
    fn type_name(&self) -> &'static str;
    fn commit(&self, row: usize);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Cell<T> {
    current: T,
    column: Arc<Column<T>>,
}

impl<T: StateValue> CellWrite for Cell<T> {
    fn name(&self) -> &str {
        self.column.name()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn commit(&self, row: usize) {
        self.column.rows[row].store(Arc::new(self.current.clone()));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Tick-indexed circular buffer of named values with one writer.
///
/// The owning task writes the current value of its slots during a cycle and
/// calls [`advance`](StateTable::advance) once at the end, which commits every
/// slot into the next row and increments the tick. Readers obtain a
/// [`StateTableView`] or [`StateAccessor`] and never block the writer.
///
/// Every table carries the `Tic`, `Toc` and `Period` slots (seconds).
pub struct StateTable {
    shared: Arc<TableShared>,
    cells: Vec<Box<dyn CellWrite>>,
    finalized: bool,
    automatic_advance: bool,
    origin: Instant,
    cycle_start: Option<Instant>,
    last_tic: Option<f64>,
    window: VecDeque<f64>,
    window_sum: f64,
    expected_period: Option<f64>,
    tic: StateDataId<f64>,
    toc: StateDataId<f64>,
    period: StateDataId<f64>,
}

impl StateTable {
    pub fn new(name: &str, length: usize) -> CadenceResult<Self> {
        if length < MIN_STATE_TABLE_LENGTH {
            return Err(CadenceError::state_table(format!(
                "'{}': length {} is below the minimum of {}",
                name, length, MIN_STATE_TABLE_LENGTH
            )));
        }
        let shared = Arc::new(TableShared {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            length,
            ticks: CachePadded::new(AtomicU64::new(0)),
            row_ticks: (0..length).map(|_| AtomicU64::new(0)).collect(),
            delay: AtomicUsize::new(0),
            columns: RwLock::new(Vec::new()),
            average_period: AtomicU64::new(0f64.to_bits()),
            statistics: Mutex::new(PeriodStatistics::default()),
        });
        let placeholder = StateDataId {
            table: shared.id,
            index: 0,
            _marker: PhantomData,
        };
        let mut table = Self {
            shared,
            cells: Vec::new(),
            finalized: false,
            automatic_advance: true,
            origin: Instant::now(),
            cycle_start: None,
            last_tic: None,
            window: VecDeque::with_capacity(length),
            window_sum: 0.0,
            expected_period: None,
            tic: placeholder,
            toc: placeholder,
            period: placeholder,
        };
        table.tic = table.add_data(TIC, 0.0f64)?;
        table.toc = table.add_data(TOC, 0.0f64)?;
        table.period = table.add_data(PERIOD, 0.0f64)?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of rows of the circular buffer
    pub fn length(&self) -> usize {
        self.shared.length
    }

    /// Number of completed advances
    pub fn ticks(&self) -> u64 {
        self.shared.now()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Register a slot. Only allowed before [`finalize`](StateTable::finalize).
    pub fn add_data<T: StateValue>(&mut self, name: &str, initial: T) -> CadenceResult<StateDataId<T>> {
        if self.finalized {
            return Err(CadenceError::state_table(format!(
                "'{}': cannot add '{}' after finalization",
                self.shared.name, name
            )));
        }
        if self.cells.iter().any(|cell| cell.name() == name) {
            return Err(CadenceError::DuplicateName {
                kind: "state data",
                name: name.to_string(),
                owner: self.shared.name.clone(),
            });
        }

        let column = Arc::new(Column::new(name, self.shared.length, initial.clone()));
        self.shared.columns.write().push(ColumnEntry {
            name: name.to_string(),
            type_name: std::any::type_name::<T>(),
            column: column.clone(),
        });
        self.cells.push(Box::new(Cell {
            current: initial,
            column,
        }));
        Ok(StateDataId {
            table: self.shared.id,
            index: self.cells.len() - 1,
            _marker: PhantomData,
        })
    }

    /// Freeze the slot layout
    pub fn finalize(&mut self) {
        if !self.finalized {
            self.finalized = true;
            log::debug!(
                "State table '{}' finalized with {} slot(s), length {}",
                self.shared.name,
                self.cells.len(),
                self.shared.length
            );
        }
    }

    fn cell<T: StateValue>(&self, id: StateDataId<T>) -> CadenceResult<&Cell<T>> {
        let cell = self.lookup(id.table, id.index)?;
        cell.as_any()
            .downcast_ref::<Cell<T>>()
            .ok_or_else(|| CadenceError::TypeMismatch {
                name: cell.name().to_string(),
                expected: std::any::type_name::<T>(),
                found: cell.type_name(),
            })
    }

    fn cell_mut<T: StateValue>(&mut self, id: StateDataId<T>) -> CadenceResult<&mut Cell<T>> {
        let (name, found) = {
            let cell = self.lookup(id.table, id.index)?;
            (cell.name().to_string(), cell.type_name())
        };
        self.cells[id.index]
            .as_any_mut()
            .downcast_mut::<Cell<T>>()
            .ok_or(CadenceError::TypeMismatch {
                name,
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    fn lookup(&self, table: u64, index: usize) -> CadenceResult<&dyn CellWrite> {
        if table != self.shared.id {
            return Err(CadenceError::state_table(format!(
                "slot id does not belong to '{}'",
                self.shared.name
            )));
        }
        self.cells
            .get(index)
            .map(|cell| cell.as_ref())
            .ok_or_else(|| CadenceError::state_table(format!("no slot #{}", index)))
    }

    /// Set the value committed by the next advance
    pub fn write<T: StateValue>(&mut self, id: StateDataId<T>, value: T) -> CadenceResult<()> {
        self.cell_mut(id)?.current = value;
        Ok(())
    }

    /// Value the next advance will commit
    pub fn current<T: StateValue>(&self, id: StateDataId<T>) -> CadenceResult<&T> {
        Ok(&self.cell(id)?.current)
    }

    pub fn current_mut<T: StateValue>(&mut self, id: StateDataId<T>) -> CadenceResult<&mut T> {
        Ok(&mut self.cell_mut(id)?.current)
    }

    /// Mark the beginning of a cycle (records `Tic`)
    pub fn start(&mut self) {
        self.cycle_start = Some(Instant::now());
    }

    /// Commit every slot into the next row and increment the tick.
    ///
    /// Returns the new tick.
    pub fn advance(&mut self) -> u64 {
        if !self.finalized {
            self.finalize();
        }
        let end = Instant::now();
        let begin = self.cycle_start.take().unwrap_or(end);
        let tic = begin.duration_since(self.origin).as_secs_f64();
        let toc = end.duration_since(self.origin).as_secs_f64();
        let period = self.last_tic.map(|last| tic - last);
        self.last_tic = Some(tic);
        self.record_timing(tic, toc, period);

        let shared = &self.shared;
        let next = shared.now() + 1;
        let row = row_of(next, shared.length);
        let row_tick = &shared.row_ticks[row];

        row_tick.store(WRITING, Ordering::Relaxed);
        fence(Ordering::Release);
        for cell in &self.cells {
            cell.commit(row);
        }
        row_tick.store(next, Ordering::Release);
        shared.ticks.store(next, Ordering::Release);
        next
    }

    fn record_timing(&mut self, tic: f64, toc: f64, period: Option<f64>) {
        let (tic_id, toc_id, period_id) = (self.tic, self.toc, self.period);
        if let Ok(cell) = self.cell_mut(tic_id) {
            cell.current = tic;
        }
        if let Ok(cell) = self.cell_mut(toc_id) {
            cell.current = toc;
        }
        if let Ok(cell) = self.cell_mut(period_id) {
            cell.current = period.unwrap_or(0.0);
        }

        if let Some(period) = period {
            // The window covers the rows readers can still address.
            if self.window.len() + 1 >= self.shared.length {
                if let Some(oldest) = self.window.pop_front() {
                    self.window_sum -= oldest;
                }
            }
            self.window.push_back(period);
            self.window_sum += period;
            let average = self.window_sum / self.window.len() as f64;
            self.shared
                .average_period
                .store(average.to_bits(), Ordering::Relaxed);
        }

        let compute = toc - tic;
        let overrun = self.expected_period.is_some_and(|expected| compute > expected);
        self.shared.statistics.lock().record(period, compute, overrun);
    }

    /// `start` unless automatic advance was turned off
    pub fn start_if_automatic(&mut self) {
        if self.automatic_advance {
            self.start();
        }
    }

    /// `advance` unless automatic advance was turned off
    pub fn advance_if_automatic(&mut self) -> Option<u64> {
        if self.automatic_advance {
            Some(self.advance())
        } else {
            None
        }
    }

    /// With automatic advance off the component calls `start`/`advance` itself
    pub fn set_automatic_advance(&mut self, automatic: bool) {
        self.automatic_advance = automatic;
    }

    pub fn automatic_advance(&self) -> bool {
        self.automatic_advance
    }

    /// Period the owner aims for; compute times above it count as overruns
    pub fn set_expected_period(&mut self, period: Option<Duration>) {
        self.expected_period = period.map(|p| p.as_secs_f64());
    }

    pub fn accessor<T: StateValue>(&self, id: StateDataId<T>) -> CadenceResult<StateAccessor<T>> {
        let cell = self.cell(id)?;
        Ok(StateAccessor::new(self.shared.clone(), cell.column.clone()))
    }

    pub fn accessor_by_name<T: StateValue>(&self, name: &str) -> CadenceResult<StateAccessor<T>> {
        self.shared.find_column(name)
    }

    pub fn view(&self) -> StateTableView {
        StateTableView {
            shared: self.shared.clone(),
        }
    }

    pub fn get_index_reader(&self, offset: usize) -> CadenceResult<StateIndex> {
        self.shared.index_reader(offset)
    }

    /// Number of advances [`get_index_delayed`](StateTable::get_index_delayed) trails by
    pub fn set_delay(&mut self, delay: usize) -> CadenceResult<()> {
        if delay + 1 >= self.shared.length {
            return Err(CadenceError::state_table(format!(
                "'{}': delay {} does not fit a buffer of length {}",
                self.shared.name, delay, self.shared.length
            )));
        }
        self.shared.delay.store(delay, Ordering::Relaxed);
        Ok(())
    }

    pub fn delay(&self) -> usize {
        self.shared.delay.load(Ordering::Relaxed)
    }

    /// Index of the row written `delay` advances ago
    pub fn get_index_delayed(&self) -> CadenceResult<StateIndex> {
        self.shared.index_delayed()
    }

    pub fn data_names(&self) -> Vec<String> {
        self.shared.data_names()
    }

    pub fn tic_id(&self) -> StateDataId<f64> {
        self.tic
    }

    pub fn toc_id(&self) -> StateDataId<f64> {
        self.toc
    }

    pub fn period_id(&self) -> StateDataId<f64> {
        self.period
    }

    /// Mean period over the cycles still held in the buffer (seconds)
    pub fn average_period(&self) -> f64 {
        self.shared.average_period()
    }

    pub fn period_statistics(&self) -> PeriodStatistics {
        *self.shared.statistics.lock()
    }
}

impl fmt::Debug for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTable")
            .field("name", &self.shared.name)
            .field("length", &self.shared.length)
            .field("ticks", &self.ticks())
            .field("slots", &self.cells.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

/// What a component may do with its own table during a cycle.
///
/// Slot values are written freely. `start`/`advance` are only available
/// once automatic advance is off, so a row is never committed twice per cycle.
pub struct CycleState<'a> {
    table: &'a mut StateTable,
}

impl<'a> CycleState<'a> {
    pub(crate) fn new(table: &'a mut StateTable) -> Self {
        Self { table }
    }

    pub fn write<T: StateValue>(&mut self, id: StateDataId<T>, value: T) -> CadenceResult<()> {
        self.table.write(id, value)
    }

    pub fn current<T: StateValue>(&self, id: StateDataId<T>) -> CadenceResult<&T> {
        self.table.current(id)
    }

    pub fn current_mut<T: StateValue>(&mut self, id: StateDataId<T>) -> CadenceResult<&mut T> {
        self.table.current_mut(id)
    }

    pub fn ticks(&self) -> u64 {
        self.table.ticks()
    }

    pub fn get_index_reader(&self, offset: usize) -> CadenceResult<StateIndex> {
        self.table.get_index_reader(offset)
    }

    pub fn get_index_delayed(&self) -> CadenceResult<StateIndex> {
        self.table.get_index_delayed()
    }

    pub fn accessor<T: StateValue>(&self, id: StateDataId<T>) -> CadenceResult<StateAccessor<T>> {
        self.table.accessor(id)
    }

    pub fn view(&self) -> StateTableView {
        self.table.view()
    }

    pub fn automatic_advance(&self) -> bool {
        self.table.automatic_advance()
    }

    /// The loop reads the flag again right after `run` returns
    pub fn set_automatic_advance(&mut self, automatic: bool) {
        self.table.set_automatic_advance(automatic);
    }

    pub fn start(&mut self) -> CadenceResult<()> {
        self.manual("start")?;
        self.table.start();
        Ok(())
    }

    /// Commit the current values; returns the new tick
    pub fn advance(&mut self) -> CadenceResult<u64> {
        self.manual("advance")?;
        Ok(self.table.advance())
    }

    fn manual(&self, operation: &str) -> CadenceResult<()> {
        if self.table.automatic_advance() {
            return Err(CadenceError::state_table(format!(
                "'{}': {} is driven by the task while automatic advance is on",
                self.table.name(),
                operation
            )));
        }
        Ok(())
    }
}

/// Read-only handle to a state table, usable from any thread
#[derive(Clone)]
pub struct StateTableView {
    shared: Arc<TableShared>,
}

impl StateTableView {
    pub(crate) fn from_shared(shared: Arc<TableShared>) -> Self {
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn length(&self) -> usize {
        self.shared.length
    }

    /// Tick of the most recent complete write, 0 before the first advance
    pub fn latest_tick(&self) -> u64 {
        self.shared.now()
    }

    /// Index of the row written `offset` advances ago; 0 is the latest
    pub fn get_index_reader(&self, offset: usize) -> CadenceResult<StateIndex> {
        self.shared.index_reader(offset)
    }

    /// Index lagging the latest row by the table's delay
    pub fn get_index_delayed(&self) -> CadenceResult<StateIndex> {
        self.shared.index_delayed()
    }

    pub fn accessor<T: StateValue>(&self, name: &str) -> CadenceResult<StateAccessor<T>> {
        self.shared.find_column(name)
    }

    pub fn data_names(&self) -> Vec<String> {
        self.shared.data_names()
    }

    pub fn average_period(&self) -> f64 {
        self.shared.average_period()
    }

    pub fn period_statistics(&self) -> PeriodStatistics {
        *self.shared.statistics.lock()
    }
}

impl fmt::Debug for StateTableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTableView")
            .field("name", &self.shared.name)
            .field("latest_tick", &self.latest_tick())
            .finish()
    }
}
