// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::Date;
use tracing::{debug, warn};

use crate::{OptionId, OptionItem, SubmissionPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeLevel {
    Client,
    Vessel,
    Parameter,
}

impl CascadeLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Client => "clients",
            Self::Vessel => "vessels",
            Self::Parameter => "parameters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LevelStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// What a fetch was issued for. Vessel and parameter keys carry the
/// upstream selection so a completion can be checked against the state it
/// lands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchKey {
    Clients,
    Vessels { client: OptionId },
    Parameters { client: OptionId, vessel: OptionId },
}

impl FetchKey {
    pub const fn level(&self) -> CascadeLevel {
        match self {
            Self::Clients => CascadeLevel::Client,
            Self::Vessels { .. } => CascadeLevel::Vessel,
            Self::Parameters { .. } => CascadeLevel::Parameter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub request_id: u64,
    pub key: FetchKey,
}

impl FetchRequest {
    pub fn complete(self, outcome: Result<Vec<OptionItem>, String>) -> FetchCompletion {
        FetchCompletion {
            request_id: self.request_id,
            key: self.key,
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCompletion {
    pub request_id: u64,
    pub key: FetchKey,
    pub outcome: Result<Vec<OptionItem>, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Loaded(CascadeLevel),
    Failed { level: CascadeLevel, error: String },
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct LevelState {
    options: Vec<OptionItem>,
    status: LevelStatus,
    pending: Option<u64>,
}

impl LevelState {
    fn begin(&mut self, request_id: u64) {
        self.options.clear();
        self.status = LevelStatus::Loading;
        self.pending = Some(request_id);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Client → vessel → parameter selection chain plus the run's date range.
///
/// Changing a level clears it and everything below it before the fetch for
/// the new value goes out. Completions are applied only when they answer the
/// latest request of their level and their key still matches the current
/// upstream selection; anything else is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionState {
    clients: LevelState,
    vessels: LevelState,
    parameters: LevelState,
    selected_client_id: Option<OptionId>,
    selected_vessel_id: Option<OptionId>,
    selected_parameter_ids: Vec<OptionId>,
    start_date: Option<Date>,
    end_date: Option<Date>,
    next_request_id: u64,
}

impl SelectionState {
    pub fn clients(&self) -> &[OptionItem] {
        &self.clients.options
    }

    pub fn vessels(&self) -> &[OptionItem] {
        &self.vessels.options
    }

    pub fn available_parameters(&self) -> &[OptionItem] {
        &self.parameters.options
    }

    pub fn selected_client_id(&self) -> Option<&OptionId> {
        self.selected_client_id.as_ref()
    }

    pub fn selected_vessel_id(&self) -> Option<&OptionId> {
        self.selected_vessel_id.as_ref()
    }

    pub fn selected_parameter_ids(&self) -> &[OptionId] {
        &self.selected_parameter_ids
    }

    pub fn start_date(&self) -> Option<Date> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<Date> {
        self.end_date
    }

    pub fn status(&self, level: CascadeLevel) -> &LevelStatus {
        &self.level(level).status
    }

    pub fn vessel_enabled(&self) -> bool {
        self.selected_client_id.is_some()
    }

    pub fn parameters_enabled(&self) -> bool {
        self.selected_client_id.is_some() && self.selected_vessel_id.is_some()
    }

    pub fn is_parameter_selected(&self, id: &OptionId) -> bool {
        self.selected_parameter_ids.contains(id)
    }

    /// Starts (or restarts) the client fetch. Everything downstream is
    /// cleared because the client list it hangs off is being replaced.
    pub fn load_clients(&mut self) -> FetchRequest {
        let request_id = self.issue_request_id();
        self.clients.begin(request_id);
        self.selected_client_id = None;
        self.clear_vessel_level();
        FetchRequest {
            request_id,
            key: FetchKey::Clients,
        }
    }

    /// Returns `None` when `client` is not one of the loaded clients.
    pub fn select_client(&mut self, client: &OptionId) -> Option<FetchRequest> {
        if !contains_option(&self.clients.options, client) {
            return None;
        }

        let request_id = self.issue_request_id();
        self.selected_client_id = Some(client.clone());
        self.clear_vessel_level();
        self.vessels.begin(request_id);
        Some(FetchRequest {
            request_id,
            key: FetchKey::Vessels {
                client: client.clone(),
            },
        })
    }

    /// Returns `None` while no client is selected or when `vessel` is not in
    /// the current vessel list.
    pub fn select_vessel(&mut self, vessel: &OptionId) -> Option<FetchRequest> {
        let client = self.selected_client_id.clone()?;
        if !contains_option(&self.vessels.options, vessel) {
            return None;
        }

        let request_id = self.issue_request_id();
        self.selected_vessel_id = Some(vessel.clone());
        self.selected_parameter_ids.clear();
        self.parameters.begin(request_id);
        Some(FetchRequest {
            request_id,
            key: FetchKey::Parameters {
                client,
                vessel: vessel.clone(),
            },
        })
    }

    /// Multi-select semantics: `ids` is the complete new selection. Ids that
    /// are not among the available parameters are ignored, and the stored
    /// order follows the option list.
    pub fn set_selected_parameters<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a OptionId>,
    {
        let wanted: Vec<&OptionId> = ids.into_iter().collect();
        self.selected_parameter_ids = self
            .parameters
            .options
            .iter()
            .filter(|option| wanted.contains(&&option.id))
            .map(|option| option.id.clone())
            .collect();
    }

    /// Flips one parameter in the current selection. Returns whether it is
    /// selected afterwards.
    pub fn toggle_parameter(&mut self, id: &OptionId) -> bool {
        let mut next: Vec<OptionId> = self.selected_parameter_ids.clone();
        if let Some(index) = next.iter().position(|selected| selected == id) {
            next.remove(index);
        } else {
            next.push(id.clone());
        }
        self.set_selected_parameters(next.iter());
        self.is_parameter_selected(id)
    }

    pub fn set_start_date(&mut self, date: Option<Date>) {
        self.start_date = date;
    }

    pub fn set_end_date(&mut self, date: Option<Date>) {
        self.end_date = date;
    }

    pub fn apply(&mut self, completion: FetchCompletion) -> ApplyOutcome {
        let FetchCompletion {
            request_id,
            key,
            outcome,
        } = completion;
        let level = key.level();

        if !self.is_current(request_id, &key) {
            debug!(request_id, cascade = level.label(), ?key, "dropping stale fetch result");
            return ApplyOutcome::Stale;
        }

        let is_parameters = level == CascadeLevel::Parameter;
        let slot = self.level_mut(level);
        slot.pending = None;
        match outcome {
            Ok(options) => {
                slot.options = options;
                slot.status = LevelStatus::Loaded;
                if is_parameters {
                    self.selected_parameter_ids.clear();
                }
                ApplyOutcome::Loaded(level)
            }
            Err(error) => {
                warn!(request_id, cascade = level.label(), ?key, %error, "option fetch failed");
                slot.options.clear();
                slot.status = LevelStatus::Failed(error.clone());
                ApplyOutcome::Failed { level, error }
            }
        }
    }

    /// Snapshot of the current selection for the submit action. The vessel
    /// is resolved to its display name here rather than stored twice.
    pub fn submission(&self) -> SubmissionPayload {
        let selected_vessel_name = self.selected_vessel_id.as_ref().and_then(|id| {
            self.vessels
                .options
                .iter()
                .find(|vessel| &vessel.id == id)
                .map(|vessel| vessel.name.clone())
        });
        SubmissionPayload {
            selected_client_id: self.selected_client_id.clone(),
            selected_vessel_name,
            selected_parameter_ids: self.selected_parameter_ids.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    fn is_current(&self, request_id: u64, key: &FetchKey) -> bool {
        if self.level(key.level()).pending != Some(request_id) {
            return false;
        }
        match key {
            FetchKey::Clients => true,
            FetchKey::Vessels { client } => self.selected_client_id.as_ref() == Some(client),
            FetchKey::Parameters { client, vessel } => {
                self.selected_client_id.as_ref() == Some(client)
                    && self.selected_vessel_id.as_ref() == Some(vessel)
            }
        }
    }

    fn clear_vessel_level(&mut self) {
        self.vessels.reset();
        self.selected_vessel_id = None;
        self.parameters.reset();
        self.selected_parameter_ids.clear();
    }

    fn issue_request_id(&mut self) -> u64 {
        self.next_request_id = self.next_request_id.saturating_add(1);
        self.next_request_id
    }

    fn level(&self, level: CascadeLevel) -> &LevelState {
        match level {
            CascadeLevel::Client => &self.clients,
            CascadeLevel::Vessel => &self.vessels,
            CascadeLevel::Parameter => &self.parameters,
        }
    }

    fn level_mut(&mut self, level: CascadeLevel) -> &mut LevelState {
        match level {
            CascadeLevel::Client => &mut self.clients,
            CascadeLevel::Vessel => &mut self.vessels,
            CascadeLevel::Parameter => &mut self.parameters,
        }
    }
}

fn contains_option(options: &[OptionItem], id: &OptionId) -> bool {
    options.iter().any(|option| &option.id == id)
}
