// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use time::Date;
use time::macros::format_description;

use crate::{NewPipeline, PersonName, PipelineRecord, SetupStep};

pub const DEFAULT_ENVIRONMENT: &str = "Development";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineField {
    FirstName,
    LastName,
    Environment,
    NoOfDags,
    CreatedOn,
    CreatedBy,
}

impl PipelineField {
    pub const ALL: [Self; 6] = [
        Self::FirstName,
        Self::LastName,
        Self::Environment,
        Self::NoOfDags,
        Self::CreatedOn,
        Self::CreatedBy,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstName => "First Name",
            Self::LastName => "Last Name",
            Self::Environment => "Environment",
            Self::NoOfDags => "No of DAGs",
            Self::CreatedOn => "Created On",
            Self::CreatedBy => "Created By",
        }
    }
}

/// Raw text behind the create and edit dialogs. Values stay unparsed until
/// the dialog is saved so a half-typed number or date never reaches the
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFormInput {
    pub first_name: String,
    pub last_name: String,
    pub environment: String,
    pub no_of_dags: String,
    pub created_on: String,
    pub created_by: String,
    pub flow: Vec<SetupStep>,
}

impl PipelineFormInput {
    pub fn blank(today: Date) -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            environment: DEFAULT_ENVIRONMENT.to_owned(),
            no_of_dags: "0".to_owned(),
            created_on: today.to_string(),
            created_by: String::new(),
            flow: Vec::new(),
        }
    }

    pub fn from_record(record: &PipelineRecord) -> Self {
        Self {
            first_name: record.name.first_name.clone(),
            last_name: record.name.last_name.clone(),
            environment: record.environment.clone(),
            no_of_dags: record.no_of_dags.to_string(),
            created_on: record.created_on.to_string(),
            created_by: record.created_by.clone(),
            flow: record.flow.clone(),
        }
    }

    pub fn field(&self, field: PipelineField) -> &str {
        match field {
            PipelineField::FirstName => &self.first_name,
            PipelineField::LastName => &self.last_name,
            PipelineField::Environment => &self.environment,
            PipelineField::NoOfDags => &self.no_of_dags,
            PipelineField::CreatedOn => &self.created_on,
            PipelineField::CreatedBy => &self.created_by,
        }
    }

    pub fn field_mut(&mut self, field: PipelineField) -> &mut String {
        match field {
            PipelineField::FirstName => &mut self.first_name,
            PipelineField::LastName => &mut self.last_name,
            PipelineField::Environment => &mut self.environment,
            PipelineField::NoOfDags => &mut self.no_of_dags,
            PipelineField::CreatedOn => &mut self.created_on,
            PipelineField::CreatedBy => &mut self.created_by,
        }
    }

    /// Adds the step if absent, removes it otherwise. Returns whether the
    /// step is picked afterwards.
    pub fn toggle_step(&mut self, step: SetupStep) -> bool {
        if let Some(index) = self.flow.iter().position(|picked| *picked == step) {
            self.flow.remove(index);
            false
        } else {
            self.flow.push(step);
            true
        }
    }

    pub fn parse(&self) -> Result<NewPipeline> {
        Ok(NewPipeline {
            name: PersonName {
                first_name: self.first_name.trim().to_owned(),
                last_name: self.last_name.trim().to_owned(),
            },
            environment: self.environment.trim().to_owned(),
            no_of_dags: parse_dag_count(&self.no_of_dags)?,
            created_on: parse_created_on(&self.created_on)?,
            created_by: self.created_by.trim().to_owned(),
            flow: self.flow.clone(),
        })
    }

    /// Writes the parsed values over `record`, keeping its id. `record` is
    /// left untouched when any field fails to parse.
    pub fn apply_to(&self, record: &mut PipelineRecord) -> Result<()> {
        let parsed = self.parse()?;
        *record = parsed.into_record(record.id);
        Ok(())
    }
}

fn parse_dag_count(raw: &str) -> Result<u32> {
    raw.trim().parse::<u32>().with_context(|| {
        format!("No of DAGs must be a non-negative whole number, got {raw:?}")
    })
}

fn parse_created_on(raw: &str) -> Result<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("Created On must look like yyyy-MM-dd, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::{PipelineField, PipelineFormInput};
    use crate::{PersonName, PipelineId, PipelineRecord, SetupStep};
    use anyhow::Result;
    use time::{Date, Month};

    fn record() -> Result<PipelineRecord> {
        Ok(PipelineRecord {
            id: PipelineId::new(3),
            name: PersonName {
                first_name: "John".to_owned(),
                last_name: "Doe".to_owned(),
            },
            environment: "Production".to_owned(),
            no_of_dags: 5,
            created_on: Date::from_calendar_date(2023, Month::May, 15)?,
            created_by: "Alice Smith".to_owned(),
            flow: vec![SetupStep::DataTransformation],
        })
    }

    #[test]
    fn form_round_trips_record_values() -> Result<()> {
        let original = record()?;
        let form = PipelineFormInput::from_record(&original);
        assert_eq!(form.field(PipelineField::NoOfDags), "5");
        assert_eq!(form.field(PipelineField::CreatedOn), "2023-05-15");

        let mut copy = original.clone();
        form.apply_to(&mut copy)?;
        assert_eq!(copy, original);
        Ok(())
    }

    #[test]
    fn apply_to_keeps_id_and_updates_fields() -> Result<()> {
        let mut target = record()?;
        let mut form = PipelineFormInput::from_record(&target);
        *form.field_mut(PipelineField::FirstName) = "  Jane ".to_owned();
        *form.field_mut(PipelineField::NoOfDags) = "12".to_owned();

        form.apply_to(&mut target)?;
        assert_eq!(target.id, PipelineId::new(3));
        assert_eq!(target.name.first_name, "Jane");
        assert_eq!(target.no_of_dags, 12);
        Ok(())
    }

    #[test]
    fn invalid_dag_count_leaves_record_untouched() -> Result<()> {
        let original = record()?;
        let mut target = original.clone();
        let mut form = PipelineFormInput::from_record(&target);
        *form.field_mut(PipelineField::NoOfDags) = "-4".to_owned();

        let error = form
            .apply_to(&mut target)
            .expect_err("negative count should fail");
        assert!(error.to_string().contains("No of DAGs"));
        assert_eq!(target, original);
        Ok(())
    }

    #[test]
    fn invalid_date_is_rejected_with_expected_shape() {
        let mut form = PipelineFormInput::blank(Date::MIN);
        *form.field_mut(PipelineField::CreatedOn) = "15/05/2023".to_owned();
        let error = form.parse().expect_err("bad date should fail");
        assert!(error.to_string().contains("yyyy-MM-dd"));
    }

    #[test]
    fn blank_form_defaults() -> Result<()> {
        let today = Date::from_calendar_date(2026, Month::October, 18)?;
        let parsed = PipelineFormInput::blank(today).parse()?;
        assert_eq!(parsed.created_on, today);
        assert_eq!(parsed.no_of_dags, 0);
        assert_eq!(parsed.environment, "Development");
        assert!(parsed.flow.is_empty());
        Ok(())
    }

    #[test]
    fn toggle_step_adds_then_removes() {
        let mut form = PipelineFormInput::blank(Date::MIN);
        assert!(form.toggle_step(SetupStep::RunModel));
        assert!(form.toggle_step(SetupStep::DataExtraction));
        assert_eq!(
            form.flow,
            vec![SetupStep::RunModel, SetupStep::DataExtraction]
        );
        assert!(!form.toggle_step(SetupStep::RunModel));
        assert_eq!(form.flow, vec![SetupStep::DataExtraction]);
    }
}
