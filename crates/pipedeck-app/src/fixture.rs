// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use time::{Date, Month};

use crate::{PersonName, PipelineId, PipelineRecord};

const SEED_ROWS: [(i64, &str, &str, u32, (i32, Month, u8), &str); 9] = [
    (1, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
    (2, "Jane", "Development", 3, (2023, Month::June, 20), "Bob Johnson"),
    (3, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
    (4, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
    (5, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
    (6, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
    (7, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
    (8, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
    (9, "John", "Production", 5, (2023, Month::May, 15), "Alice Smith"),
];

/// Built-in table contents used when no seed file is configured.
pub fn seed_records() -> Result<Vec<PipelineRecord>> {
    SEED_ROWS
        .iter()
        .map(
            |(id, first_name, environment, dags, (year, month, day), created_by)| -> Result<PipelineRecord> {
                Ok(PipelineRecord {
                    id: PipelineId::new(*id),
                    name: PersonName {
                        first_name: (*first_name).to_owned(),
                        last_name: "Doe".to_owned(),
                    },
                    environment: (*environment).to_owned(),
                    no_of_dags: *dags,
                    created_on: Date::from_calendar_date(*year, *month, *day)?,
                    created_by: (*created_by).to_owned(),
                    flow: Vec::new(),
                })
            },
        )
        .collect()
}
