// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use pipedeck_api::Client;
use pipedeck_app::{
    FetchKey, FetchRequest, MemoryStore, OptionItem, PipelineRecord, PipelineTable, PlotLink,
    SetupStep, SubmissionPayload, TableCommand, TableEvent, TableRow, fixture,
};
use pipedeck_tui::{AppRuntime, InternalEvent, SubmitOutcome};
use std::fs;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, info};

/// Where the table's starting rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed<'a> {
    Builtin,
    File(&'a Path),
    Empty,
}

pub fn load_seed(seed: Seed<'_>) -> Result<Vec<PipelineRecord>> {
    match seed {
        Seed::Builtin => fixture::seed_records(),
        Seed::Empty => Ok(Vec::new()),
        Seed::File(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read seed file {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| {
                format!(
                    "decode seed file {}; expected a JSON array of pipeline records",
                    path.display()
                )
            })
        }
    }
}

pub struct LiveRuntime {
    table: PipelineTable<MemoryStore>,
    client: Client,
    forward_submissions: bool,
}

impl LiveRuntime {
    pub fn new(
        records: Vec<PipelineRecord>,
        client: Client,
        forward_submissions: bool,
    ) -> Result<Self> {
        let store = MemoryStore::new(records).context("build pipeline table")?;
        Ok(Self {
            table: PipelineTable::new(store)?,
            client,
            forward_submissions,
        })
    }
}

impl AppRuntime for LiveRuntime {
    fn load_rows(&mut self) -> Result<Vec<TableRow>> {
        self.table.rows()
    }

    fn apply_table_command(&mut self, command: TableCommand) -> Result<Vec<TableEvent>> {
        self.table.dispatch(command)
    }

    fn working_copy(&self) -> Option<PipelineRecord> {
        self.table.working_copy().cloned()
    }

    fn fetch_options(&mut self, key: &FetchKey) -> Result<Vec<OptionItem>> {
        Ok(self.client.fetch(key)?)
    }

    fn spawn_fetch(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name(format!("fetch-{}", request.request_id))
            .spawn(move || {
                let outcome = client
                    .fetch(&request.key)
                    .map_err(|error| error.to_string());
                // The UI may have exited while the request was in flight.
                let _ = tx.send(InternalEvent::Fetch(request.complete(outcome)));
            })
            .map(|_| ())
            .map_err(|error| anyhow!("spawn fetch thread: {error}"))
    }

    fn submit_selection(&mut self, payload: &SubmissionPayload) -> Result<SubmitOutcome> {
        let body = serde_json::to_string(payload).context("encode submission")?;
        info!(payload = %body, forward = self.forward_submissions, "selection submitted");
        if !self.forward_submissions {
            return Ok(SubmitOutcome::Logged);
        }
        self.client.submit(payload)?;
        Ok(SubmitOutcome::Forwarded)
    }

    fn plot_link_url(&self, link: &PlotLink) -> String {
        self.client.plot_url(link)
    }

    fn setup_step_selected(&mut self, step: SetupStep) -> Result<()> {
        debug!(step = step.label(), "setup step picked");
        Ok(())
    }
}
