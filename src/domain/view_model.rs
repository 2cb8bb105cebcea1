//! ViewModel — the sortable, filterable process table.
//!
//! Every rebuild re-projects the whole snapshot store into a fresh row set:
//!   SnapshotStore → FilterSpec → project → sort → rows
//!
//! Rebuilds are serialized through a single gate. Timer ticks skip while a
//! rebuild is in flight; explicit requests (filter changes) set a pending
//! flag so the in-flight rebuild runs once more with the latest filter.
//! The selected node name lives behind its own lock so row activation never
//! waits on a rebuild.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::filter::{CompileError, FilterInput, FilterSpec};
use super::projector::{project, Column, ColumnSchema, DisplayRow, SortType};
use super::snapshot_store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub column: usize,
    pub ascending: bool,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: 0,
            ascending: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SortError {
    #[error("no such column: {0}")]
    UnknownColumn(usize),
}

/// Result of one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RebuildOutcome {
    /// No machine has reported yet; the table is empty.
    NoData,
    Rebuilt {
        machines: usize,
        rows: usize,
        visible: usize,
        skipped: usize,
    },
}

/// Serializable snapshot of the table for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableView {
    pub columns: Vec<Column>,
    pub rows: Vec<DisplayRow>,
    pub sort: SortState,
    pub selected: Option<String>,
    pub filter: FilterInput,
    pub status: Option<RebuildOutcome>,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Table {
    rows: Vec<DisplayRow>,
    sort: SortState,
    status: Option<RebuildOutcome>,
    generated_at: Option<DateTime<Utc>>,
}

pub struct ViewModel {
    store: Arc<SnapshotStore>,
    schema: ColumnSchema,
    filter: RwLock<FilterSpec>,
    table: RwLock<Table>,
    selected: StdMutex<String>,
    rebuild_gate: Mutex<()>,
    rebuild_pending: AtomicBool,
}

impl ViewModel {
    pub fn new(store: Arc<SnapshotStore>, schema: ColumnSchema, filter: FilterSpec) -> Self {
        Self {
            store,
            schema,
            filter: RwLock::new(filter),
            table: RwLock::new(Table::default()),
            selected: StdMutex::new(String::new()),
            rebuild_gate: Mutex::new(()),
            rebuild_pending: AtomicBool::new(false),
        }
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Rebuild now, waiting for any in-flight rebuild to finish first.
    /// Requests that arrive meanwhile are drained before the gate is released.
    pub async fn rebuild(&self) -> RebuildOutcome {
        let gate = self.rebuild_gate.lock().await;
        self.rebuild_pending.store(false, Ordering::Release);
        let outcome = self.rebuild_once().await;
        self.drain(gate).await.unwrap_or(outcome)
    }

    /// Timer entry point: rebuild unless one is already running, in which
    /// case this tick is skipped.
    pub async fn try_rebuild(&self) -> Option<RebuildOutcome> {
        let Ok(gate) = self.rebuild_gate.try_lock() else {
            debug!("rebuild in progress, skipping tick");
            return None;
        };
        self.rebuild_pending.store(true, Ordering::Release);
        self.drain(gate).await
    }

    /// Ask for a rebuild that reflects current state. If one is in flight it
    /// picks the request up before releasing the gate, and this returns
    /// `None` without waiting.
    pub async fn request_rebuild(&self) -> Option<RebuildOutcome> {
        self.rebuild_pending.store(true, Ordering::Release);
        match self.rebuild_gate.try_lock() {
            Ok(gate) => self.drain(gate).await,
            Err(_) => {
                debug!("rebuild in progress, coalescing request");
                None
            }
        }
    }

    async fn drain<'a>(&'a self, mut gate: MutexGuard<'a, ()>) -> Option<RebuildOutcome> {
        let mut outcome = None;
        loop {
            while self.rebuild_pending.swap(false, Ordering::AcqRel) {
                outcome = Some(self.rebuild_once().await);
            }
            drop(gate);

            // A request may have landed between the last swap and the release.
            if !self.rebuild_pending.load(Ordering::Acquire) {
                return outcome;
            }
            match self.rebuild_gate.try_lock() {
                Ok(next) => gate = next,
                Err(_) => return outcome,
            }
        }
    }

    async fn rebuild_once(&self) -> RebuildOutcome {
        let snapshot = self.store.snapshot_all().await;

        if snapshot.is_empty() {
            let mut table = self.table.write().await;
            table.rows.clear();
            table.status = Some(RebuildOutcome::NoData);
            table.generated_at = Some(Utc::now());
            info!("no machines reporting");
            return RebuildOutcome::NoData;
        }

        let filter = self.filter.read().await.clone();
        let selected = self.selected_key();
        let machines = snapshot.len();

        let mut rows = Vec::new();
        let mut skipped = 0;
        for (machine, records) in snapshot {
            for record in records.iter() {
                match project(&self.schema, &machine, record) {
                    Ok(mut row) => {
                        row.ordinal = rows.len();
                        row.visible = filter.matches(&row.node_name, &machine);
                        row.selected = selected
                            .as_deref()
                            .is_some_and(|key| key == row.node_name);
                        rows.push(row);
                    }
                    Err(e) => {
                        skipped += 1;
                        warn!(
                            machine = %machine,
                            node = %record.node_name,
                            error = %e,
                            "skipping process row"
                        );
                    }
                }
            }
        }

        let outcome = RebuildOutcome::Rebuilt {
            machines,
            rows: rows.len(),
            visible: rows.iter().filter(|r| r.visible).count(),
            skipped,
        };

        let mut table = self.table.write().await;
        sort_rows(&mut rows, table.sort, &self.schema);
        table.rows = rows;
        table.status = Some(outcome);
        table.generated_at = Some(Utc::now());

        debug!(?outcome, "table rebuilt");
        outcome
    }

    /// Remember the clicked row. Applied to rows on the next rebuild.
    pub fn on_row_activated(&self, node_name: &str) {
        *self.selected.lock().unwrap_or_else(PoisonError::into_inner) = node_name.to_string();
    }

    pub fn clear_selection(&self) {
        self.selected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn selected_key(&self) -> Option<String> {
        let selected = self.selected.lock().unwrap_or_else(PoisonError::into_inner);
        (!selected.is_empty()).then(|| selected.clone())
    }

    /// Compile and install a new filter, then rebuild. On a compile error
    /// the previous filter stays active.
    pub async fn on_filter_changed(
        &self,
        input: &FilterInput,
    ) -> Result<Option<RebuildOutcome>, CompileError> {
        let spec = FilterSpec::from_input(input).inspect_err(|e| {
            warn!(error = %e, "rejected filter, keeping previous");
        })?;
        *self.filter.write().await = spec;
        info!(
            name = %input.name_filter_text,
            machine = %input.machine_filter_text,
            regex = input.is_regex,
            "filter updated"
        );
        Ok(self.request_rebuild().await)
    }

    pub async fn filter_input(&self) -> FilterInput {
        self.filter.read().await.input().clone()
    }

    /// Change the sort column/direction and re-sort the current rows.
    pub async fn set_sort(&self, column: usize, ascending: bool) -> Result<(), SortError> {
        if column >= self.schema.len() {
            return Err(SortError::UnknownColumn(column));
        }
        let mut table = self.table.write().await;
        table.sort = SortState { column, ascending };
        let mut rows = std::mem::take(&mut table.rows);
        sort_rows(&mut rows, table.sort, &self.schema);
        table.rows = rows;
        Ok(())
    }

    pub async fn sort(&self) -> SortState {
        self.table.read().await.sort
    }

    pub async fn rows(&self) -> Vec<DisplayRow> {
        self.table.read().await.rows.clone()
    }

    pub async fn view(&self) -> TableView {
        let filter = self.filter_input().await;
        let selected = self.selected_key();
        let table = self.table.read().await;
        TableView {
            columns: self.schema.columns.clone(),
            rows: table.rows.clone(),
            sort: table.sort,
            selected,
            filter,
            status: table.status,
            generated_at: table.generated_at,
        }
    }
}

/// Sort by one column. Ties fall back to projection order in both
/// directions, whatever order an earlier sort left the rows in.
fn sort_rows(rows: &mut [DisplayRow], sort: SortState, schema: &ColumnSchema) {
    let Some(column) = schema.get(sort.column) else {
        return;
    };
    let index = sort.column;

    rows.sort_by(|a, b| {
        let ordering = match column.sort_type {
            SortType::Numeric => compare_keys(a.sort_key(index), b.sort_key(index)),
            SortType::Text => a.cell(index).cmp(b.cell(index)),
        };
        let ordering = if sort.ascending {
            ordering
        } else {
            ordering.reverse()
        };
        ordering.then_with(|| a.ordinal.cmp(&b.ordinal))
    });
}

fn compare_keys(a: Option<f64>, b: Option<f64>) -> CmpOrdering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}
