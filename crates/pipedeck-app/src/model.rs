// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::Date;

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewKind {
    Pipelines,
    Airflow,
}

impl ViewKind {
    pub const ALL: [Self; 2] = [Self::Pipelines, Self::Airflow];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pipelines => "pipelines",
            Self::Airflow => "airflow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pipelines" => Some(Self::Pipelines),
            "airflow" => Some(Self::Airflow),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pipelines => "pipelines",
            Self::Airflow => "airflow view",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    CreatePipeline,
    EditPipeline,
}

impl FormKind {
    pub const fn title(self) -> &'static str {
        match self {
            Self::CreatePipeline => "setup pipelines",
            Self::EditPipeline => "edit item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Form(FormKind),
}

/// Step offered by the create dialog. Picked steps are carried on the record
/// as opaque flow metadata; nothing in the core interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SetupStep {
    DataExtraction,
    DataTransformation,
    RunModel,
}

impl SetupStep {
    pub const ALL: [Self; 3] = [
        Self::DataExtraction,
        Self::DataTransformation,
        Self::RunModel,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::DataExtraction => "Data Extraction",
            Self::DataTransformation => "Data Transformation",
            Self::RunModel => "Run Model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub name: PersonName,
    pub environment: String,
    #[serde(rename = "noOfDAGs")]
    pub no_of_dags: u32,
    pub created_on: Date,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow: Vec<SetupStep>,
}

/// Fields of a record that does not exist yet; the table assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPipeline {
    pub name: PersonName,
    pub environment: String,
    pub no_of_dags: u32,
    pub created_on: Date,
    pub created_by: String,
    pub flow: Vec<SetupStep>,
}

impl NewPipeline {
    pub fn into_record(self, id: PipelineId) -> PipelineRecord {
        PipelineRecord {
            id,
            name: self.name,
            environment: self.environment,
            no_of_dags: self.no_of_dags,
            created_on: self.created_on,
            created_by: self.created_by,
            flow: self.flow,
        }
    }
}

/// Display projection of one record. `serial_no` is positional and is
/// recomputed on every read; nothing keys on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub serial_no: usize,
    pub record: PipelineRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAlign {
    Left,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub key: &'static str,
    pub header: &'static str,
    pub align: ColumnAlign,
}

pub const PIPELINE_COLUMNS: [ColumnSpec; 7] = [
    ColumnSpec {
        key: "serialNo",
        header: "S.No",
        align: ColumnAlign::Center,
    },
    ColumnSpec {
        key: "name.firstName",
        header: "First Name",
        align: ColumnAlign::Left,
    },
    ColumnSpec {
        key: "environment",
        header: "Environment",
        align: ColumnAlign::Left,
    },
    ColumnSpec {
        key: "noOfDAGs",
        header: "No of DAGs",
        align: ColumnAlign::Left,
    },
    ColumnSpec {
        key: "createdOn",
        header: "Created On",
        align: ColumnAlign::Left,
    },
    ColumnSpec {
        key: "createdBy",
        header: "Created By",
        align: ColumnAlign::Left,
    },
    ColumnSpec {
        key: "actions",
        header: "Actions",
        align: ColumnAlign::Left,
    },
];

impl TableRow {
    /// Cell text for each entry of [`PIPELINE_COLUMNS`], in order.
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.serial_no.to_string(),
            self.record.name.first_name.clone(),
            self.record.environment.clone(),
            self.record.no_of_dags.to_string(),
            self.record.created_on.to_string(),
            self.record.created_by.clone(),
            "e edit | c clone | d delete".to_owned(),
        ]
    }
}

/// One `{id, name}` entry of a cascade level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub id: OptionId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub selected_client_id: Option<OptionId>,
    pub selected_vessel_name: Option<String>,
    pub selected_parameter_ids: Vec<OptionId>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotLink {
    pub label: &'static str,
    pub path: &'static str,
}

impl PlotLink {
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path)
    }
}

// TODO: carry the current client/vessel/date selection once the plot views
// agree on a query-string scheme.
pub const PLOT_LINKS: [PlotLink; 4] = [
    PlotLink {
        label: "Show Bar Graph",
        path: "/pipelineuiview/bar_graph",
    },
    PlotLink {
        label: "Show Scatter Plot",
        path: "/pipelineuiview/scatter_plot",
    },
    PlotLink {
        label: "Show Histogram",
        path: "/pipelineuiview/histogram",
    },
    PlotLink {
        label: "Show Box Plot",
        path: "/pipelineuiview/box_plot",
    },
];
