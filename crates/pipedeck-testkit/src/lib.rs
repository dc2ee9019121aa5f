// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use pipedeck_app::{
    NewPipeline, OptionId, OptionItem, PersonName, PipelineId, PipelineRecord, SetupStep,
};
use std::io::Read;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use time::{Date, Month};
use tiny_http::{Header, Response, Server};

const FIRST_NAMES: [&str; 10] = [
    "John", "Jane", "Priya", "Mateo", "Aiko", "Noor", "Lars", "Chidi", "Elena", "Omar",
];
const LAST_NAMES: [&str; 8] = [
    "Doe", "Okafor", "Lindqvist", "Tanaka", "Haddad", "Moreau", "Silva", "Kowalski",
];
const ENVIRONMENTS: [&str; 3] = ["Development", "Staging", "Production"];
const AUTHORS: [&str; 4] = ["Alice Smith", "Bob Johnson", "Carol Reyes", "Dev Patel"];

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn fixture_date() -> Date {
    Date::from_calendar_date(2023, Month::May, 15).expect("valid fixture date")
}

pub fn record(id: i64, first_name: &str) -> PipelineRecord {
    PipelineRecord {
        id: PipelineId::new(id),
        name: PersonName {
            first_name: first_name.to_owned(),
            last_name: "Doe".to_owned(),
        },
        environment: "Production".to_owned(),
        no_of_dags: 5,
        created_on: fixture_date(),
        created_by: "Alice Smith".to_owned(),
        flow: Vec::new(),
    }
}

pub fn option(id: &str, name: &str) -> OptionItem {
    OptionItem {
        id: OptionId::new(id),
        name: name.to_owned(),
    }
}

/// Writes `records` as a JSON seed file inside a fresh temp dir.
pub fn temp_seed_file(records: &[PipelineRecord]) -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("seed.json");
    let body = serde_json::to_string_pretty(records).context("encode seed records")?;
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok((dir, path))
}

/// Deterministic pipeline generator for tests that need many distinct rows.
#[derive(Debug, Clone)]
pub struct PipelineFaker {
    state: u64,
}

impl PipelineFaker {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub fn new_pipeline(&mut self) -> NewPipeline {
        let first_name = self.pick(&FIRST_NAMES);
        let last_name = self.pick(&LAST_NAMES);
        let environment = self.pick(&ENVIRONMENTS);
        let created_by = self.pick(&AUTHORS);
        let no_of_dags = self.int_n(20) as u32;
        let offset = self.int_n(365) as i64;
        let flow = SetupStep::ALL
            .into_iter()
            .filter(|_| self.int_n(2) == 1)
            .collect();

        NewPipeline {
            name: PersonName {
                first_name: first_name.to_owned(),
                last_name: last_name.to_owned(),
            },
            environment: environment.to_owned(),
            no_of_dags,
            created_on: fixture_date() + time::Duration::days(offset),
            created_by: created_by.to_owned(),
            flow,
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        (self.next_u64() % n as u64) as usize
    }

    fn pick<'a>(&mut self, values: &[&'a str]) -> &'a str {
        values[self.int_n(values.len())]
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl MockResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: String,
}

/// Serves one scripted response per incoming request, in order, on an
/// ephemeral localhost port.
pub struct MockServer {
    base_url: String,
    handle: JoinHandle<Result<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub fn start(responses: Vec<MockResponse>) -> Result<Self> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let base_url = format!("http://{}", server.server_addr());

        let handle = thread::spawn(move || -> Result<Vec<RecordedRequest>> {
            let mut seen = Vec::with_capacity(responses.len());
            for scripted in responses {
                let Some(mut request) = server
                    .recv_timeout(RECEIVE_TIMEOUT)
                    .context("receive mock request")?
                else {
                    bail!("mock server gave up waiting after {} requests", seen.len());
                };

                let mut body = String::new();
                request
                    .as_reader()
                    .read_to_string(&mut body)
                    .context("read mock request body")?;
                seen.push(RecordedRequest {
                    method: request.method().to_string(),
                    url: request.url().to_owned(),
                    body,
                });

                if !scripted.delay.is_zero() {
                    thread::sleep(scripted.delay);
                }
                let response = Response::from_string(scripted.body)
                    .with_status_code(scripted.status)
                    .with_header(
                        Header::from_bytes("Content-Type", "application/json")
                            .map_err(|()| anyhow!("invalid content type header"))?,
                    );
                // The client may already have hung up after a timeout.
                let _ = request.respond(response);
            }
            Ok(seen)
        });

        Ok(Self { base_url, handle })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits for every scripted response to be served and returns what the
    /// server saw.
    pub fn finish(self) -> Result<Vec<RecordedRequest>> {
        self.handle
            .join()
            .map_err(|_| anyhow!("mock server thread panicked"))?
    }
}
