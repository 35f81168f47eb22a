use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Mutex,
};
use tracing::debug;

use super::{validate_table_name, BackingStore, Filter, Row, StoreError};

/// How the next `delete_table` call should misbehave.
#[derive(Debug, Clone)]
pub enum DeleteFault {
    /// Refuse the delete, leaving the table in place.
    Refuse(StoreError),
    /// Drop the table, then report `StoreError` anyway (lost response).
    LoseResponse(StoreError),
    /// Never answer; the table stays in place.
    Stall,
}

/// Number of calls seen per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub range_selects: usize,
    pub updates: usize,
    pub deletes: usize,
}

/// In-process store: tables held in memory, with injectable faults.
/// Used for dry runs and as the store double in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    read_faults: Mutex<HashMap<(String, usize), StoreError>>,
    delete_faults: Mutex<VecDeque<DeleteFault>>,
    max_rows: Mutex<Option<usize>>,
    calls: Mutex<CallCounts>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        self.insert_table(table, rows);
        self
    }

    pub fn insert_table(&self, table: &str, rows: Vec<Row>) {
        self.tables
            .lock()
            .unwrap()
            .insert(table.to_string(), rows);
    }

    pub fn table(&self, table: &str) -> Option<Vec<Row>> {
        self.tables.lock().unwrap().get(table).cloned()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.lock().unwrap().contains_key(table)
    }

    /// Fail the read of `table` that starts at `offset`, every time it is requested.
    pub fn fail_read_at(&self, table: &str, offset: usize, err: StoreError) {
        self.read_faults
            .lock()
            .unwrap()
            .insert((table.to_string(), offset), err);
    }

    /// Serve at most `max_rows` rows per read whatever limit is asked for,
    /// like a PostgREST host with `max-rows` set.
    pub fn cap_rows_per_read(&self, max_rows: usize) {
        *self.max_rows.lock().unwrap() = Some(max_rows);
    }

    pub fn clear_read_faults(&self) {
        self.read_faults.lock().unwrap().clear();
    }

    /// Queue a fault for the next delete call; faults are consumed in order.
    pub fn fail_next_delete(&self, fault: DeleteFault) {
        self.delete_faults.lock().unwrap().push_back(fault);
    }

    pub fn calls(&self) -> CallCounts {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn range_select(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        validate_table_name(table)?;
        self.calls.lock().unwrap().range_selects += 1;

        if let Some(err) = self
            .read_faults
            .lock()
            .unwrap()
            .get(&(table.to_string(), offset))
        {
            return Err(err.clone());
        }

        let limit = match *self.max_rows.lock().unwrap() {
            Some(cap) => limit.min(cap),
            None => limit,
        };
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(rows.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn update(&self, table: &str, filter: &Filter, patch: &Row) -> Result<(), StoreError> {
        validate_table_name(table)?;
        self.calls.lock().unwrap().updates += 1;

        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let mut touched = 0;
        for row in rows.iter_mut().filter(|r| filter.matches(r)) {
            for (k, v) in patch {
                row.insert(k.clone(), v.clone());
            }
            touched += 1;
        }
        debug!(table, touched, "memory update");
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        validate_table_name(table)?;
        self.calls.lock().unwrap().deletes += 1;

        let fault = self.delete_faults.lock().unwrap().pop_front();
        match fault {
            Some(DeleteFault::Refuse(err)) => Err(err),
            Some(DeleteFault::Stall) => std::future::pending().await,
            Some(DeleteFault::LoseResponse(err)) => {
                self.tables.lock().unwrap().remove(table);
                Err(err)
            }
            None => match self.tables.lock().unwrap().remove(table) {
                Some(_) => Ok(()),
                None => Err(StoreError::TableNotFound(table.to_string())),
            },
        }
    }
}
