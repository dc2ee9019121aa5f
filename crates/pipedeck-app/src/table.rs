// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::{NewPipeline, PipelineId, PipelineRecord, TableRow};

/// Backing storage for the pipeline table. Order is significant: `list`
/// returns records in display order and `append` adds at the end.
pub trait RecordStore {
    fn list(&self) -> Result<Vec<PipelineRecord>>;
    fn append(&mut self, record: PipelineRecord) -> Result<()>;
    /// Replaces the record with the same id in place. Returns false when no
    /// record has that id.
    fn replace(&mut self, record: PipelineRecord) -> Result<bool>;
    /// Returns false when no record has that id.
    fn remove(&mut self, id: PipelineId) -> Result<bool>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    records: Vec<PipelineRecord>,
}

impl MemoryStore {
    pub fn new(records: Vec<PipelineRecord>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for record in &records {
            if !seen.insert(record.id) {
                bail!(
                    "duplicate pipeline id {} in seed records; every record needs a unique id",
                    record.id
                );
            }
        }
        Ok(Self { records })
    }
}

impl RecordStore for MemoryStore {
    fn list(&self) -> Result<Vec<PipelineRecord>> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: PipelineRecord) -> Result<()> {
        if self.records.iter().any(|existing| existing.id == record.id) {
            bail!("pipeline id {} already exists", record.id);
        }
        self.records.push(record);
        Ok(())
    }

    fn replace(&mut self, record: PipelineRecord) -> Result<bool> {
        let Some(slot) = self
            .records
            .iter_mut()
            .find(|existing| existing.id == record.id)
        else {
            return Ok(false);
        };
        *slot = record;
        Ok(true)
    }

    fn remove(&mut self, id: PipelineId) -> Result<bool> {
        let before = self.records.len();
        self.records.retain(|record| record.id != id);
        Ok(self.records.len() != before)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableCommand {
    Create(NewPipeline),
    Edit(PipelineRecord),
    SaveEdit(PipelineRecord),
    CancelEdit,
    Clone(usize),
    Delete(PipelineId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableEvent {
    RecordCreated(PipelineId),
    RecordUpdated(PipelineId),
    RecordCloned {
        source: PipelineId,
        clone: PipelineId,
    },
    RecordDeleted(PipelineId),
    EditOpened(PipelineId),
    EditClosed,
}

impl TableEvent {
    pub const fn changes_records(self) -> bool {
        matches!(
            self,
            Self::RecordCreated(_)
                | Self::RecordUpdated(_)
                | Self::RecordCloned { .. }
                | Self::RecordDeleted(_)
        )
    }
}

/// Authoritative ordered collection of pipeline records. Every mutation keys
/// on [`PipelineId`]; positions only appear in display projections and in
/// `clone`, which names the row the user is looking at.
#[derive(Debug)]
pub struct PipelineTable<S: RecordStore = MemoryStore> {
    store: S,
    working_copy: Option<PipelineRecord>,
    next_id: i64,
}

impl<S: RecordStore> PipelineTable<S> {
    pub fn new(store: S) -> Result<Self> {
        let next_id = store
            .list()?
            .iter()
            .map(|record| record.id.get())
            .max()
            .map_or(1, |max| max.saturating_add(1));
        Ok(Self {
            store,
            working_copy: None,
            next_id,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn list(&self) -> Result<Vec<PipelineRecord>> {
        self.store.list()
    }

    pub fn rows(&self) -> Result<Vec<TableRow>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .enumerate()
            .map(|(index, record)| TableRow {
                serial_no: index + 1,
                record,
            })
            .collect())
    }

    pub fn working_copy(&self) -> Option<&PipelineRecord> {
        self.working_copy.as_ref()
    }

    pub fn working_copy_mut(&mut self) -> Option<&mut PipelineRecord> {
        self.working_copy.as_mut()
    }

    pub fn is_editing(&self) -> bool {
        self.working_copy.is_some()
    }

    pub fn dispatch(&mut self, command: TableCommand) -> Result<Vec<TableEvent>> {
        match command {
            TableCommand::Create(input) => self.create(input),
            TableCommand::Edit(record) => Ok(self.edit(&record)),
            TableCommand::SaveEdit(working) => self.save_edit(working),
            TableCommand::CancelEdit => Ok(self.cancel_edit()),
            TableCommand::Clone(index) => self.clone_at(index),
            TableCommand::Delete(id) => self.delete(id),
        }
    }

    pub fn create(&mut self, input: NewPipeline) -> Result<Vec<TableEvent>> {
        let existing = self.store.list()?;
        let id = self.allocate_id(&existing)?;
        self.store.append(input.into_record(id))?;
        info!(id = id.get(), "pipeline created");
        Ok(vec![TableEvent::RecordCreated(id)])
    }

    pub fn edit(&mut self, record: &PipelineRecord) -> Vec<TableEvent> {
        self.working_copy = Some(record.clone());
        vec![TableEvent::EditOpened(record.id)]
    }

    pub fn save_edit(&mut self, working: PipelineRecord) -> Result<Vec<TableEvent>> {
        self.working_copy = None;
        let id = working.id;
        if !self.store.replace(working)? {
            debug!(id = id.get(), "save ignored; pipeline no longer exists");
            return Ok(vec![TableEvent::EditClosed]);
        }
        info!(id = id.get(), "pipeline updated");
        Ok(vec![TableEvent::RecordUpdated(id), TableEvent::EditClosed])
    }

    pub fn cancel_edit(&mut self) -> Vec<TableEvent> {
        self.working_copy = None;
        vec![TableEvent::EditClosed]
    }

    pub fn clone_at(&mut self, index: usize) -> Result<Vec<TableEvent>> {
        let existing = self.store.list()?;
        let Some(source) = existing.get(index).cloned() else {
            debug!(index, "clone ignored; no pipeline at that position");
            return Ok(Vec::new());
        };
        let id = self.allocate_id(&existing)?;
        let source_id = source.id;
        self.store.append(PipelineRecord { id, ..source })?;
        info!(source = source_id.get(), clone = id.get(), "pipeline cloned");
        Ok(vec![TableEvent::RecordCloned {
            source: source_id,
            clone: id,
        }])
    }

    pub fn delete(&mut self, id: PipelineId) -> Result<Vec<TableEvent>> {
        if !self.store.remove(id)? {
            debug!(id = id.get(), "delete ignored; pipeline not found");
            return Ok(Vec::new());
        }
        info!(id = id.get(), "pipeline deleted");
        Ok(vec![TableEvent::RecordDeleted(id)])
    }

    /// Next id above every id ever handed out; once the top of the id
    /// space is taken, the smallest unused positive id.
    fn allocate_id(&mut self, existing: &[PipelineRecord]) -> Result<PipelineId> {
        let taken: BTreeSet<i64> = existing.iter().map(|record| record.id.get()).collect();
        let floor = match taken.last() {
            Some(max) => max.checked_add(1),
            None => Some(1),
        };
        if let Some(floor) = floor {
            let candidate = self.next_id.max(floor);
            self.next_id = candidate.saturating_add(1);
            return Ok(PipelineId::new(candidate));
        }

        let candidate = (1..=i64::MAX)
            .find(|id| !taken.contains(id))
            .ok_or_else(|| anyhow!("pipeline id space exhausted"))?;
        warn!(id = candidate, "pipeline id counter exhausted; reusing free id");
        Ok(PipelineId::new(candidate))
    }
}
