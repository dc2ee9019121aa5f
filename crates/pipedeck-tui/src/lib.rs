// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use pipedeck_app::{
    AppCommand, AppEvent, AppMode, AppState, ApplyOutcome, CascadeLevel, ColumnAlign,
    FetchCompletion, FetchKey, FetchRequest, FormKind, LevelStatus, OptionId, OptionItem,
    PIPELINE_COLUMNS, PLOT_LINKS, PipelineField, PipelineFormInput, PipelineRecord, PlotLink,
    SetupStep, SubmissionPayload, TableCommand, TableEvent, TableRow, ViewKind,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::{Date, Month, OffsetDateTime};
use tracing::warn;

const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);

const COLUMN_WIDTHS: [Constraint; 7] = [
    Constraint::Length(5),
    Constraint::Min(10),
    Constraint::Min(11),
    Constraint::Length(10),
    Constraint::Length(10),
    Constraint::Min(12),
    Constraint::Length(27),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Recorded in the log only.
    Logged,
    /// Recorded and accepted by the submit endpoint.
    Forwarded,
}

/// Everything the console needs from the outside world. The table lives
/// behind this trait; the selection chain lives in [`AppState`] and only its
/// fetches cross over.
pub trait AppRuntime {
    fn load_rows(&mut self) -> Result<Vec<TableRow>>;
    fn apply_table_command(&mut self, command: TableCommand) -> Result<Vec<TableEvent>>;
    fn working_copy(&self) -> Option<PipelineRecord>;
    fn fetch_options(&mut self, key: &FetchKey) -> Result<Vec<OptionItem>>;
    /// Runs `request` and reports the result on `tx`. The default runs it
    /// inline; runtimes with a real network should move it off the UI
    /// thread.
    fn spawn_fetch(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let outcome = self
            .fetch_options(&request.key)
            .map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::Fetch(request.complete(outcome)))
            .map_err(|_| anyhow!("fetch event channel closed"))?;
        Ok(())
    }
    fn submit_selection(&mut self, payload: &SubmissionPayload) -> Result<SubmitOutcome>;
    fn plot_link_url(&self, link: &PlotLink) -> String;
    /// Called whenever a setup step is picked in the create dialog.
    fn setup_step_selected(&mut self, _step: SetupStep) -> Result<()> {
        Ok(())
    }
    fn today(&self) -> Date {
        OffsetDateTime::now_utc().date()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    Fetch(FetchCompletion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormSlot {
    Field(PipelineField),
    Step(SetupStep),
}

fn form_slots(kind: FormKind) -> Vec<FormSlot> {
    let fields = PipelineField::ALL.into_iter().map(FormSlot::Field);
    match kind {
        FormKind::CreatePipeline => fields
            .chain(SetupStep::ALL.into_iter().map(FormSlot::Step))
            .collect(),
        FormKind::EditPipeline => fields.collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormUiState {
    kind: FormKind,
    input: PipelineFormInput,
    slot_index: usize,
}

impl FormUiState {
    fn slot(&self) -> Option<FormSlot> {
        form_slots(self.kind).get(self.slot_index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AirflowControl {
    #[default]
    Client,
    Vessel,
    Parameters,
    StartDate,
    EndDate,
    Submit,
    Links,
}

impl AirflowControl {
    const ALL: [Self; 7] = [
        Self::Client,
        Self::Vessel,
        Self::Parameters,
        Self::StartDate,
        Self::EndDate,
        Self::Submit,
        Self::Links,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct AirflowUiState {
    focus: AirflowControl,
    client_cursor: usize,
    vessel_cursor: usize,
    parameter_cursor: usize,
    link_cursor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateTarget {
    Start,
    End,
}

impl DateTarget {
    const fn label(self) -> &'static str {
        match self {
            Self::Start => "start date",
            Self::End => "end date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct DatePickerUiState {
    target: Option<DateTarget>,
    original: Option<Date>,
    selected: Option<Date>,
}

impl DatePickerUiState {
    fn is_open(&self) -> bool {
        self.target.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    rows: Vec<TableRow>,
    table_cursor: usize,
    form: Option<FormUiState>,
    airflow: AirflowUiState,
    date_picker: DatePickerUiState,
    plot_urls: Vec<String>,
    help_visible: bool,
    status_token: u64,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();
    start_session(state, runtime, &mut view_data, &internal_tx);

    let result = event_loop(
        &mut terminal,
        state,
        runtime,
        &mut view_data,
        &internal_tx,
        &internal_rx,
    );

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn event_loop<R: AppRuntime>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    internal_rx: &Receiver<InternalEvent>,
) -> Result<()> {
    loop {
        process_internal_events(state, view_data, internal_tx, internal_rx);

        terminal
            .draw(|frame| render(frame, state, view_data))
            .context("draw frame")?;

        if !event::poll(Duration::from_millis(120)).context("poll event")? {
            continue;
        }
        if let Event::Key(key) = event::read().context("read event")?
            && handle_key_event(state, runtime, view_data, internal_tx, key)
        {
            return Ok(());
        }
    }
}

fn start_session<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.plot_urls = PLOT_LINKS
        .iter()
        .map(|link| runtime.plot_link_url(link))
        .collect();
    if let Err(error) = refresh_rows(runtime, view_data) {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("load failed: {error}"),
        );
    }
    refresh_clients(state, runtime, view_data, internal_tx);
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Fetch(completion) => {
                let outcome = state.selection.apply(completion);
                report_fetch_outcome(state, view_data, tx, outcome);
            }
        }
    }
}

fn report_fetch_outcome(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    outcome: ApplyOutcome,
) {
    match outcome {
        ApplyOutcome::Loaded(level) => match level {
            CascadeLevel::Client => view_data.airflow.client_cursor = 0,
            CascadeLevel::Vessel => view_data.airflow.vessel_cursor = 0,
            CascadeLevel::Parameter => view_data.airflow.parameter_cursor = 0,
        },
        ApplyOutcome::Failed { level, error } => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("{} fetch failed: {error}", level.label()),
            );
        }
        ApplyOutcome::Stale => {}
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn dispatch_command(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command);
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_token = view_data.status_token.saturating_add(1);
        schedule_status_clear(internal_tx, view_data.status_token);
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    if view_data.date_picker.is_open() {
        handle_date_picker_key(state, view_data, internal_tx, key);
        return false;
    }

    if let AppMode::Form(kind) = state.mode {
        handle_form_key(state, runtime, view_data, internal_tx, kind, key);
        return false;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Tab, _) | (KeyCode::BackTab, _) => {
            dispatch_command(state, view_data, internal_tx, AppCommand::NextView);
            return false;
        }
        (KeyCode::Char('?'), _) => {
            view_data.help_visible = true;
            return false;
        }
        _ => {}
    }

    match state.active_view {
        ViewKind::Pipelines => handle_pipelines_key(state, runtime, view_data, internal_tx, key),
        ViewKind::Airflow => handle_airflow_key(state, runtime, view_data, internal_tx, key),
    }
    false
}

fn handle_pipelines_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => {
            move_table_cursor(view_data, 1);
        }
        (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => {
            move_table_cursor(view_data, -1);
        }
        (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
            view_data.table_cursor = 0;
        }
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
            view_data.table_cursor = view_data.rows.len().saturating_sub(1);
        }
        (KeyCode::Char('n'), KeyModifiers::NONE) => {
            view_data.form = Some(FormUiState {
                kind: FormKind::CreatePipeline,
                input: PipelineFormInput::blank(runtime.today()),
                slot_index: 0,
            });
            dispatch_command(
                state,
                view_data,
                internal_tx,
                AppCommand::OpenForm(FormKind::CreatePipeline),
            );
        }
        (KeyCode::Char('e'), KeyModifiers::NONE) => {
            open_edit_form(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Char('c'), KeyModifiers::NONE) => {
            if view_data.rows.is_empty() {
                emit_status(state, view_data, internal_tx, "no row selected");
                return;
            }
            let index = view_data.table_cursor;
            let Some(events) = apply_table_change(
                state,
                runtime,
                view_data,
                internal_tx,
                TableCommand::Clone(index),
            ) else {
                return;
            };
            view_data.table_cursor = view_data.rows.len().saturating_sub(1);
            let status =
                describe_table_events(&events).unwrap_or_else(|| "nothing to clone".to_owned());
            emit_status(state, view_data, internal_tx, status);
        }
        (KeyCode::Char('d'), KeyModifiers::NONE) => {
            let Some(id) = view_data
                .rows
                .get(view_data.table_cursor)
                .map(|row| row.record.id)
            else {
                emit_status(state, view_data, internal_tx, "no row selected");
                return;
            };
            let Some(events) = apply_table_change(
                state,
                runtime,
                view_data,
                internal_tx,
                TableCommand::Delete(id),
            ) else {
                return;
            };
            let status = describe_table_events(&events)
                .unwrap_or_else(|| format!("pipeline {id} already gone"));
            emit_status(state, view_data, internal_tx, status);
        }
        _ => {}
    }
}

fn move_table_cursor(view_data: &mut ViewData, delta: isize) {
    view_data.table_cursor = step_cursor(view_data.table_cursor, view_data.rows.len(), delta);
}

fn step_cursor(cursor: usize, len: usize, delta: isize) -> usize {
    if len == 0 {
        return 0;
    }
    cursor
        .min(len - 1)
        .saturating_add_signed(delta)
        .min(len - 1)
}

fn refresh_rows<R: AppRuntime>(runtime: &mut R, view_data: &mut ViewData) -> Result<()> {
    view_data.rows = runtime.load_rows()?;
    view_data.table_cursor = view_data
        .table_cursor
        .min(view_data.rows.len().saturating_sub(1));
    Ok(())
}

/// Runs a table command and reloads the rows when it changed anything.
/// Returns `None` when the command itself failed; the failure is already on
/// the status line.
fn apply_table_change<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: TableCommand,
) -> Option<Vec<TableEvent>> {
    let events = match runtime.apply_table_command(command) {
        Ok(events) => events,
        Err(error) => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("table update failed: {error}"),
            );
            return None;
        }
    };

    if events.iter().any(|event| event.changes_records())
        && let Err(error) = refresh_rows(runtime, view_data)
    {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("reload failed: {error}"),
        );
    }
    Some(events)
}

fn describe_table_events(events: &[TableEvent]) -> Option<String> {
    events.iter().find_map(|event| match event {
        TableEvent::RecordCreated(id) => Some(format!("created pipeline {id}")),
        TableEvent::RecordUpdated(id) => Some(format!("saved pipeline {id}")),
        TableEvent::RecordCloned { source, clone } => {
            Some(format!("cloned pipeline {source} as {clone}"))
        }
        TableEvent::RecordDeleted(id) => Some(format!("deleted pipeline {id}")),
        TableEvent::EditOpened(_) | TableEvent::EditClosed => None,
    })
}

fn open_edit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(record) = view_data
        .rows
        .get(view_data.table_cursor)
        .map(|row| row.record.clone())
    else {
        emit_status(state, view_data, internal_tx, "no row selected");
        return;
    };

    if let Err(error) = runtime.apply_table_command(TableCommand::Edit(record)) {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("edit failed: {error}"),
        );
        return;
    }
    let Some(working) = runtime.working_copy() else {
        emit_status(state, view_data, internal_tx, "edit failed: no working copy");
        return;
    };

    view_data.form = Some(FormUiState {
        kind: FormKind::EditPipeline,
        input: PipelineFormInput::from_record(&working),
        slot_index: 0,
    });
    dispatch_command(
        state,
        view_data,
        internal_tx,
        AppCommand::OpenForm(FormKind::EditPipeline),
    );
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: FormKind,
    key: KeyEvent,
) {
    let slot = view_data.form.as_ref().and_then(FormUiState::slot);
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => cancel_form(state, runtime, view_data, internal_tx, kind),
        (KeyCode::Enter, _) | (KeyCode::Char('s'), KeyModifiers::CONTROL) => {
            save_form(state, runtime, view_data, internal_tx, kind);
        }
        (KeyCode::Tab, _) | (KeyCode::Down, _) => move_form_slot(view_data, 1),
        (KeyCode::BackTab, _) | (KeyCode::Up, _) => move_form_slot(view_data, -1),
        (KeyCode::Char(' '), _) if matches!(slot, Some(FormSlot::Step(_))) => {
            if let Some(FormSlot::Step(step)) = slot {
                toggle_form_step(state, runtime, view_data, internal_tx, step);
            }
        }
        (KeyCode::Backspace, _) => {
            if let (Some(FormSlot::Field(field)), Some(form)) = (slot, view_data.form.as_mut()) {
                form.input.field_mut(field).pop();
            }
        }
        (KeyCode::Char(ch), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
            if let (Some(FormSlot::Field(field)), Some(form)) = (slot, view_data.form.as_mut()) {
                form.input.field_mut(field).push(ch);
            }
        }
        _ => {}
    }
}

fn move_form_slot(view_data: &mut ViewData, delta: isize) {
    let Some(form) = view_data.form.as_mut() else {
        return;
    };
    let len = form_slots(form.kind).len() as isize;
    if len == 0 {
        return;
    }
    form.slot_index = (form.slot_index as isize + delta).rem_euclid(len) as usize;
}

fn toggle_form_step<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    step: SetupStep,
) {
    let Some(form) = view_data.form.as_mut() else {
        return;
    };
    let picked = form.input.toggle_step(step);
    if picked && let Err(error) = runtime.setup_step_selected(step) {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("{} hook failed: {error}", step.label()),
        );
        return;
    }
    let verb = if picked { "added" } else { "removed" };
    emit_status(
        state,
        view_data,
        internal_tx,
        format!("{} {verb}", step.label()),
    );
}

fn close_form(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    view_data.form = None;
    dispatch_command(state, view_data, internal_tx, AppCommand::CloseForm);
}

fn cancel_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: FormKind,
) {
    if kind == FormKind::EditPipeline
        && let Err(error) = runtime.apply_table_command(TableCommand::CancelEdit)
    {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("cancel failed: {error}"),
        );
        return;
    }
    close_form(state, view_data, internal_tx);
    let status = match kind {
        FormKind::CreatePipeline => "create canceled",
        FormKind::EditPipeline => "edit canceled",
    };
    emit_status(state, view_data, internal_tx, status);
}

fn save_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: FormKind,
) {
    let Some(input) = view_data.form.as_ref().map(|form| form.input.clone()) else {
        close_form(state, view_data, internal_tx);
        return;
    };

    let command = match kind {
        FormKind::CreatePipeline => input.parse().map(TableCommand::Create),
        FormKind::EditPipeline => {
            let Some(mut working) = runtime.working_copy() else {
                close_form(state, view_data, internal_tx);
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "edit session expired; nothing saved",
                );
                return;
            };
            input
                .apply_to(&mut working)
                .map(|()| TableCommand::SaveEdit(working))
        }
    };
    let command = match command {
        Ok(command) => command,
        Err(error) => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("form invalid: {error}"),
            );
            return;
        }
    };

    let Some(events) = apply_table_change(state, runtime, view_data, internal_tx, command) else {
        return;
    };
    close_form(state, view_data, internal_tx);
    if kind == FormKind::CreatePipeline {
        view_data.table_cursor = view_data.rows.len().saturating_sub(1);
    }
    let status = describe_table_events(&events)
        .unwrap_or_else(|| "pipeline no longer exists; nothing saved".to_owned());
    emit_status(state, view_data, internal_tx, status);
}

fn handle_airflow_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => {
            move_airflow_focus(view_data, 1);
        }
        (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => {
            move_airflow_focus(view_data, -1);
        }
        (KeyCode::Char('h'), KeyModifiers::NONE) | (KeyCode::Left, _) => {
            move_airflow_cursor(state, view_data, -1);
        }
        (KeyCode::Char('l'), KeyModifiers::NONE) | (KeyCode::Right, _) => {
            move_airflow_cursor(state, view_data, 1);
        }
        (KeyCode::Enter, _) => activate_airflow_control(state, runtime, view_data, internal_tx),
        (KeyCode::Char(' '), _) if view_data.airflow.focus == AirflowControl::Parameters => {
            toggle_focused_parameter(state, view_data, internal_tx);
        }
        (KeyCode::Char('r'), KeyModifiers::NONE) => {
            refresh_clients(state, runtime, view_data, internal_tx);
            emit_status(state, view_data, internal_tx, "reloading clients");
        }
        (KeyCode::Char('s'), KeyModifiers::NONE) => {
            submit_selection(state, runtime, view_data, internal_tx);
        }
        _ => {}
    }
}

fn move_airflow_focus(view_data: &mut ViewData, delta: isize) {
    let controls = AirflowControl::ALL;
    let current = controls
        .iter()
        .position(|control| *control == view_data.airflow.focus)
        .unwrap_or(0);
    view_data.airflow.focus = controls[step_cursor(current, controls.len(), delta)];
}

fn move_airflow_cursor(state: &AppState, view_data: &mut ViewData, delta: isize) {
    let selection = &state.selection;
    let airflow = &mut view_data.airflow;
    let (cursor, len) = match airflow.focus {
        AirflowControl::Client => (&mut airflow.client_cursor, selection.clients().len()),
        AirflowControl::Vessel => (&mut airflow.vessel_cursor, selection.vessels().len()),
        AirflowControl::Parameters => (
            &mut airflow.parameter_cursor,
            selection.available_parameters().len(),
        ),
        AirflowControl::Links => (&mut airflow.link_cursor, PLOT_LINKS.len()),
        AirflowControl::StartDate | AirflowControl::EndDate | AirflowControl::Submit => return,
    };
    *cursor = step_cursor(*cursor, len, delta);
}

fn option_at(options: &[OptionItem], cursor: usize) -> Option<OptionItem> {
    options
        .get(cursor.min(options.len().saturating_sub(1)))
        .cloned()
}

fn activate_airflow_control<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match view_data.airflow.focus {
        AirflowControl::Client => {
            let Some(client) = option_at(state.selection.clients(), view_data.airflow.client_cursor)
            else {
                emit_status(state, view_data, internal_tx, "no clients loaded; press r");
                return;
            };
            let Some(request) = state.selection.select_client(&client.id) else {
                return;
            };
            view_data.airflow.vessel_cursor = 0;
            view_data.airflow.parameter_cursor = 0;
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("client {} selected; loading vessels", client.name),
            );
            issue_fetch(state, runtime, view_data, internal_tx, request);
        }
        AirflowControl::Vessel => {
            if !state.selection.vessel_enabled() {
                emit_status(state, view_data, internal_tx, "pick a client first");
                return;
            }
            let Some(vessel) = option_at(state.selection.vessels(), view_data.airflow.vessel_cursor)
            else {
                emit_status(state, view_data, internal_tx, "no vessels for this client");
                return;
            };
            let Some(request) = state.selection.select_vessel(&vessel.id) else {
                return;
            };
            view_data.airflow.parameter_cursor = 0;
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("vessel {} selected; loading parameters", vessel.name),
            );
            issue_fetch(state, runtime, view_data, internal_tx, request);
        }
        AirflowControl::Parameters => toggle_focused_parameter(state, view_data, internal_tx),
        AirflowControl::StartDate => {
            open_date_picker(state, runtime, view_data, internal_tx, DateTarget::Start);
        }
        AirflowControl::EndDate => {
            open_date_picker(state, runtime, view_data, internal_tx, DateTarget::End);
        }
        AirflowControl::Submit => submit_selection(state, runtime, view_data, internal_tx),
        AirflowControl::Links => {
            let index = view_data
                .airflow
                .link_cursor
                .min(PLOT_LINKS.len().saturating_sub(1));
            let Some(link) = PLOT_LINKS.get(index).copied() else {
                return;
            };
            let url = view_data
                .plot_urls
                .get(index)
                .cloned()
                .unwrap_or_else(|| link.path.to_owned());
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("{}: {url}", link.label),
            );
        }
    }
}

fn toggle_focused_parameter(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if !state.selection.parameters_enabled() {
        emit_status(state, view_data, internal_tx, "pick a vessel first");
        return;
    }
    let Some(parameter) = option_at(
        state.selection.available_parameters(),
        view_data.airflow.parameter_cursor,
    ) else {
        emit_status(state, view_data, internal_tx, "no parameters for this vessel");
        return;
    };
    let selected = state.selection.toggle_parameter(&parameter.id);
    let verb = if selected { "selected" } else { "deselected" };
    emit_status(
        state,
        view_data,
        internal_tx,
        format!("{} {verb}", parameter.name),
    );
}

fn refresh_clients<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let request = state.selection.load_clients();
    view_data.airflow.client_cursor = 0;
    view_data.airflow.vessel_cursor = 0;
    view_data.airflow.parameter_cursor = 0;
    issue_fetch(state, runtime, view_data, internal_tx, request);
}

fn issue_fetch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    request: FetchRequest,
) {
    let fallback = request.clone();
    if let Err(error) = runtime.spawn_fetch(request, internal_tx.clone()) {
        warn!(%error, key = ?fallback.key, "could not start fetch");
        let outcome = state
            .selection
            .apply(fallback.complete(Err(format!("{error:#}"))));
        report_fetch_outcome(state, view_data, internal_tx, outcome);
    }
}

fn submit_selection<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let payload = state.selection.submission();
    let status = match runtime.submit_selection(&payload) {
        Ok(SubmitOutcome::Logged) => "selection logged".to_owned(),
        Ok(SubmitOutcome::Forwarded) => "selection submitted".to_owned(),
        Err(error) => format!("submit failed: {error}"),
    };
    emit_status(state, view_data, internal_tx, status);
}

fn open_date_picker<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    target: DateTarget,
) {
    let original = match target {
        DateTarget::Start => state.selection.start_date(),
        DateTarget::End => state.selection.end_date(),
    };
    view_data.date_picker = DatePickerUiState {
        target: Some(target),
        original,
        selected: Some(original.unwrap_or_else(|| runtime.today())),
    };
    emit_status(state, view_data, internal_tx, "date picker open");
}

fn set_selection_date(state: &mut AppState, target: DateTarget, date: Option<Date>) {
    match target {
        DateTarget::Start => state.selection.set_start_date(date),
        DateTarget::End => state.selection.set_end_date(date),
    }
}

fn handle_date_picker_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let (Some(target), Some(current)) =
        (view_data.date_picker.target, view_data.date_picker.selected)
    else {
        view_data.date_picker = DatePickerUiState::default();
        return;
    };

    let next = match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            view_data.date_picker = DatePickerUiState::default();
            emit_status(state, view_data, internal_tx, "date edit canceled");
            return;
        }
        (KeyCode::Enter, _) => {
            set_selection_date(state, target, Some(current));
            view_data.date_picker = DatePickerUiState::default();
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("{} set to {current}", target.label()),
            );
            return;
        }
        (KeyCode::Char('x'), _) => {
            set_selection_date(state, target, None);
            view_data.date_picker = DatePickerUiState::default();
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("{} cleared", target.label()),
            );
            return;
        }
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => shift_date_by_days(current, -1),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => shift_date_by_days(current, 1),
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => shift_date_by_days(current, 7),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => shift_date_by_days(current, -7),
        (KeyCode::Char('H'), _) => shift_date_by_months(current, -1),
        (KeyCode::Char('L'), _) => shift_date_by_months(current, 1),
        (KeyCode::Char('['), _) => shift_date_by_months(current, -12),
        (KeyCode::Char(']'), _) => shift_date_by_months(current, 12),
        _ => None,
    };

    if let Some(date) = next {
        view_data.date_picker.selected = Some(date);
    }
}

fn shift_date_by_days(date: Date, days: i64) -> Option<Date> {
    date.checked_add(time::Duration::days(days))
}

/// Day-of-month is clamped, so Jan 31 plus one month lands on the last day
/// of February.
fn shift_date_by_months(date: Date, months: i32) -> Option<Date> {
    let zero_based = i32::from(u8::from(date.month())) - 1 + months;
    let year = date.year().checked_add(zero_based.div_euclid(12))?;
    let month = Month::try_from((zero_based.rem_euclid(12) + 1) as u8).ok()?;
    let day = date.day().min(last_day_of_month(year, month)?);
    Date::from_calendar_date(year, month, day).ok()
}

fn last_day_of_month(year: i32, month: Month) -> Option<u8> {
    let next_year = if month == Month::December { year + 1 } else { year };
    let first_of_next = Date::from_calendar_date(next_year, month.next(), 1).ok()?;
    first_of_next.previous_day().map(|last| last.day())
}

fn status_text(state: &AppState) -> String {
    let (mode, hints) = match (state.mode, state.active_view) {
        (AppMode::Form(_), _) => (
            "FORM",
            "tab field | type to edit | space step | enter save | esc cancel",
        ),
        (AppMode::Nav, ViewKind::Pipelines) => (
            "NAV",
            "j/k move | n new | e edit | c clone | d delete | tab view | ? help | ctrl+q",
        ),
        (AppMode::Nav, ViewKind::Airflow) => (
            "NAV",
            "j/k focus | h/l move | enter pick | space toggle | r reload | s submit | tab view | ctrl+q",
        ),
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let selected = ViewKind::ALL
        .iter()
        .position(|view| *view == state.active_view)
        .unwrap_or(0);
    let tabs = Tabs::new(ViewKind::ALL.iter().map(|view| view.label()))
        .block(Block::default().title("pipedeck").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    match state.active_view {
        ViewKind::Pipelines => render_table(frame, layout[1], view_data),
        ViewKind::Airflow => {
            let body = Paragraph::new(render_airflow_text(state, view_data)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(ViewKind::Airflow.label()),
            );
            frame.render_widget(body, layout[1]);
        }
    }

    let status = Paragraph::new(status_text(state))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    if let Some(form) = &view_data.form {
        let area = centered_rect(60, 60, frame.area());
        frame.render_widget(Clear, area);
        let dialog = Paragraph::new(render_form_text(form))
            .block(Block::default().title(form.kind.title()).borders(Borders::ALL));
        frame.render_widget(dialog, area);
    }

    if view_data.date_picker.is_open() {
        let area = centered_rect(48, 30, frame.area());
        frame.render_widget(Clear, area);
        let picker = Paragraph::new(render_date_picker_text(&view_data.date_picker))
            .block(Block::default().title("date").borders(Borders::ALL));
        frame.render_widget(picker, area);
    }

    if view_data.help_visible {
        let area = centered_rect(76, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn aligned_cell<'a>(text: impl Into<String>, align: ColumnAlign) -> Cell<'a> {
    let alignment = match align {
        ColumnAlign::Left => Alignment::Left,
        ColumnAlign::Center => Alignment::Center,
    };
    Cell::from(Line::from(text.into()).alignment(alignment))
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let title = format!("{} ({})", ViewKind::Pipelines.label(), view_data.rows.len());
    if view_data.rows.is_empty() {
        let empty = Paragraph::new("no pipelines; press n to create one")
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, area);
        return;
    }

    let header = Row::new(PIPELINE_COLUMNS.iter().map(|column| {
        aligned_cell(column.header, column.align).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = view_data.rows.iter().enumerate().map(|(index, row)| {
        let style = if index == view_data.table_cursor {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        let cells = row
            .cells()
            .into_iter()
            .zip(PIPELINE_COLUMNS.iter())
            .map(|(text, column)| aligned_cell(text, column.align));
        Row::new(cells).style(style)
    });

    let table = Table::new(rows, COLUMN_WIDTHS)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn level_status_label(status: &LevelStatus) -> String {
    match status {
        LevelStatus::Idle => "idle".to_owned(),
        LevelStatus::Loading => "loading".to_owned(),
        LevelStatus::Loaded => "loaded".to_owned(),
        LevelStatus::Failed(error) => format!("failed: {error}"),
    }
}

fn focus_marker(view_data: &ViewData, control: AirflowControl) -> &'static str {
    if view_data.airflow.focus == control {
        "> "
    } else {
        "  "
    }
}

fn push_option_lines(
    lines: &mut Vec<String>,
    options: &[OptionItem],
    cursor: Option<usize>,
    is_chosen: impl Fn(&OptionId) -> bool,
    multi: bool,
) {
    if options.is_empty() {
        lines.push("      (none)".to_owned());
        return;
    }
    let cursor = cursor.map(|cursor| cursor.min(options.len() - 1));
    for (index, option) in options.iter().enumerate() {
        let pointer = if cursor == Some(index) { "›" } else { " " };
        let chosen = is_chosen(&option.id);
        let mark = match (multi, chosen) {
            (true, true) => "[x]",
            (true, false) => "[ ]",
            (false, true) => "(*)",
            (false, false) => "( )",
        };
        lines.push(format!("    {pointer} {mark} {}", option.name));
    }
}

fn render_airflow_text(state: &AppState, view_data: &ViewData) -> String {
    let selection = &state.selection;
    let airflow = &view_data.airflow;
    let cursor_for = |control: AirflowControl, cursor: usize| -> Option<usize> {
        (airflow.focus == control).then_some(cursor)
    };
    let mut lines = Vec::new();

    lines.push(format!(
        "{}client [{}]",
        focus_marker(view_data, AirflowControl::Client),
        level_status_label(selection.status(CascadeLevel::Client))
    ));
    push_option_lines(
        &mut lines,
        selection.clients(),
        cursor_for(AirflowControl::Client, airflow.client_cursor),
        |id| selection.selected_client_id() == Some(id),
        false,
    );

    let vessel_marker = focus_marker(view_data, AirflowControl::Vessel);
    if selection.vessel_enabled() {
        lines.push(format!(
            "{vessel_marker}vessel [{}]",
            level_status_label(selection.status(CascadeLevel::Vessel))
        ));
        push_option_lines(
            &mut lines,
            selection.vessels(),
            cursor_for(AirflowControl::Vessel, airflow.vessel_cursor),
            |id| selection.selected_vessel_id() == Some(id),
            false,
        );
    } else {
        lines.push(format!("{vessel_marker}vessel [disabled: pick a client]"));
    }

    let parameter_marker = focus_marker(view_data, AirflowControl::Parameters);
    if selection.parameters_enabled() {
        lines.push(format!(
            "{parameter_marker}parameters [{}] {} selected",
            level_status_label(selection.status(CascadeLevel::Parameter)),
            selection.selected_parameter_ids().len()
        ));
        push_option_lines(
            &mut lines,
            selection.available_parameters(),
            cursor_for(AirflowControl::Parameters, airflow.parameter_cursor),
            |id| selection.is_parameter_selected(id),
            true,
        );
    } else {
        lines.push(format!(
            "{parameter_marker}parameters [disabled: pick a vessel]"
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "{}start date: {}",
        focus_marker(view_data, AirflowControl::StartDate),
        format_optional_date(selection.start_date())
    ));
    lines.push(format!(
        "{}end date: {}",
        focus_marker(view_data, AirflowControl::EndDate),
        format_optional_date(selection.end_date())
    ));
    lines.push(format!(
        "{}[ submit ]",
        focus_marker(view_data, AirflowControl::Submit)
    ));

    lines.push(String::new());
    lines.push(format!(
        "{}plot links",
        focus_marker(view_data, AirflowControl::Links)
    ));
    let link_cursor = cursor_for(AirflowControl::Links, airflow.link_cursor);
    for (index, link) in PLOT_LINKS.iter().enumerate() {
        let pointer = if link_cursor == Some(index) { "›" } else { " " };
        let url = view_data
            .plot_urls
            .get(index)
            .map_or(link.path, String::as_str);
        lines.push(format!("    {pointer} {} → {url}", link.label));
    }

    lines.join("\n")
}

fn format_optional_date(date: Option<Date>) -> String {
    date.map_or_else(|| "-".to_owned(), |date| date.to_string())
}

fn render_form_text(form: &FormUiState) -> String {
    let mut lines = Vec::new();
    let mut steps_started = false;
    for (index, slot) in form_slots(form.kind).into_iter().enumerate() {
        let marker = if index == form.slot_index { "> " } else { "  " };
        match slot {
            FormSlot::Field(field) => {
                lines.push(format!(
                    "{marker}{}: {}",
                    field.label(),
                    form.input.field(field)
                ));
            }
            FormSlot::Step(step) => {
                if !steps_started {
                    steps_started = true;
                    lines.push(String::new());
                    lines.push("  setup steps".to_owned());
                }
                let mark = if form.input.flow.contains(&step) {
                    "x"
                } else {
                    " "
                };
                lines.push(format!("{marker}[{mark}] {}", step.label()));
            }
        }
    }
    lines.push(String::new());
    lines.push("tab/shift+tab field | enter save | esc cancel".to_owned());
    lines.join("\n")
}

fn render_date_picker_text(date_picker: &DatePickerUiState) -> String {
    let field = date_picker
        .target
        .map_or("-", DateTarget::label);
    let original = date_picker
        .original
        .map_or_else(|| "(empty)".to_owned(), |date| date.to_string());
    [
        format!("field: {field}"),
        format!("orig: {original}"),
        format!("pick: {}", format_optional_date(date_picker.selected)),
        String::new(),
        "h/l day | j/k week | H/L month | [/] year".to_owned(),
        "enter pick | x clear | esc cancel".to_owned(),
    ]
    .join("\n")
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | tab switch view | ? help\n\
pipelines: j/k move | g/G first/last | n new | e edit | c clone | d delete\n\
airflow: j/k focus | h/l move in list | enter pick/open | space toggle parameter\n\
airflow: r reload clients | s submit\n\
dialog: tab/shift+tab field | type to edit | space toggle step | enter or ctrl+s save | esc cancel\n\
date picker: h/l day j/k week H/L month [/] year enter pick x clear esc cancel"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AirflowControl, AppRuntime, InternalEvent, SubmitOutcome, ViewData, form_slots,
        handle_key_event, process_internal_events, render_airflow_text, render_form_text,
        shift_date_by_months, start_session, status_text, step_cursor,
    };
    use anyhow::{Result, bail};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use pipedeck_app::{
        AppMode, AppState, CascadeLevel, FetchKey, FetchRequest, FormKind, LevelStatus,
        MemoryStore, OptionId, OptionItem, PipelineRecord, PipelineTable, PlotLink, SetupStep,
        SubmissionPayload, TableCommand, TableEvent, TableRow, ViewKind,
    };
    use pipedeck_testkit::{option, record};
    use std::sync::mpsc;
    use time::{Date, Month};

    struct TestRuntime {
        table: PipelineTable,
        requests: Vec<FetchRequest>,
        submissions: Vec<SubmissionPayload>,
        submit_error: Option<String>,
        picked_steps: Vec<SetupStep>,
    }

    impl TestRuntime {
        fn new(records: Vec<PipelineRecord>) -> Self {
            let store = MemoryStore::new(records).expect("unique seed ids");
            Self {
                table: PipelineTable::new(store).expect("table should build"),
                requests: Vec::new(),
                submissions: Vec::new(),
                submit_error: None,
                picked_steps: Vec::new(),
            }
        }
    }

    impl AppRuntime for TestRuntime {
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
            bail!("unexpected inline fetch for {key:?}")
        }

        fn spawn_fetch(
            &mut self,
            request: FetchRequest,
            _tx: mpsc::Sender<InternalEvent>,
        ) -> Result<()> {
            self.requests.push(request);
            Ok(())
        }

        fn submit_selection(&mut self, payload: &SubmissionPayload) -> Result<SubmitOutcome> {
            if let Some(error) = &self.submit_error {
                bail!("{error}");
            }
            self.submissions.push(payload.clone());
            Ok(SubmitOutcome::Logged)
        }

        fn plot_link_url(&self, link: &PlotLink) -> String {
            link.url("http://mock.test")
        }

        fn setup_step_selected(&mut self, step: SetupStep) -> Result<()> {
            self.picked_steps.push(step);
            Ok(())
        }

        fn today(&self) -> Date {
            Date::from_calendar_date(2024, Month::January, 15).expect("valid date")
        }
    }

    struct Harness {
        state: AppState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: mpsc::Sender<InternalEvent>,
        rx: mpsc::Receiver<InternalEvent>,
    }

    impl Harness {
        fn new(records: Vec<PipelineRecord>) -> Self {
            let (tx, rx) = mpsc::channel();
            let mut harness = Self {
                state: AppState::default(),
                runtime: TestRuntime::new(records),
                view_data: ViewData::default(),
                tx,
                rx,
            };
            start_session(
                &mut harness.state,
                &mut harness.runtime,
                &mut harness.view_data,
                &harness.tx,
            );
            harness
        }

        fn press(&mut self, code: KeyCode) -> bool {
            self.press_with(code, KeyModifiers::NONE)
        }

        fn press_with(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
            let quit = handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                KeyEvent::new(code, modifiers),
            );
            self.pump();
            quit
        }

        fn press_times(&mut self, code: KeyCode, times: usize) {
            for _ in 0..times {
                self.press(code);
            }
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(KeyCode::Char(ch));
            }
        }

        fn pump(&mut self) {
            process_internal_events(&mut self.state, &mut self.view_data, &self.tx, &self.rx);
        }

        fn deliver(&mut self, index: usize, outcome: Result<Vec<OptionItem>, String>) {
            let request = self.runtime.requests[index].clone();
            self.tx
                .send(InternalEvent::Fetch(request.complete(outcome)))
                .expect("channel open");
            self.pump();
        }

        fn status(&self) -> &str {
            self.state.status_line.as_deref().unwrap_or("")
        }

        fn row_ids(&self) -> Vec<i64> {
            self.view_data
                .rows
                .iter()
                .map(|row| row.record.id.get())
                .collect()
        }

        /// Loads clients C1/C2, picks C1, loads its vessel and picks it,
        /// then loads two parameters. Leaves the airflow view active.
        fn with_loaded_parameters() -> Self {
            let mut harness = Self::new(Vec::new());
            harness.press(KeyCode::Tab);
            harness.deliver(
                0,
                Ok(vec![option("C1", "Acme"), option("C2", "Globex")]),
            );
            harness.press(KeyCode::Enter);
            harness.deliver(1, Ok(vec![option("V1", "Northern Star")]));
            harness.press(KeyCode::Char('j'));
            harness.press(KeyCode::Enter);
            harness.deliver(
                2,
                Ok(vec![option("P1", "Speed"), option("P2", "Draft")]),
            );
            harness.press(KeyCode::Char('j'));
            harness
        }
    }

    fn two_records() -> Vec<PipelineRecord> {
        vec![record(1, "John"), record(2, "Jane")]
    }

    #[test]
    fn tab_switches_between_views() {
        let mut harness = Harness::new(two_records());
        assert_eq!(harness.state.active_view, ViewKind::Pipelines);

        harness.press(KeyCode::Tab);
        assert_eq!(harness.state.active_view, ViewKind::Airflow);

        harness.press(KeyCode::Tab);
        assert_eq!(harness.state.active_view, ViewKind::Pipelines);
    }

    #[test]
    fn ctrl_q_quits_from_any_mode() {
        let mut harness = Harness::new(two_records());
        harness.press(KeyCode::Char('n'));
        assert!(harness.press_with(KeyCode::Char('q'), KeyModifiers::CONTROL));
    }

    #[test]
    fn session_start_loads_rows_and_requests_clients() {
        let harness = Harness::new(two_records());
        assert_eq!(harness.row_ids(), vec![1, 2]);
        assert_eq!(harness.runtime.requests.len(), 1);
        assert_eq!(harness.runtime.requests[0].key, FetchKey::Clients);
        assert_eq!(
            harness.state.selection.status(CascadeLevel::Client),
            &LevelStatus::Loading
        );
        assert_eq!(
            harness.view_data.plot_urls[0],
            "http://mock.test/pipelineuiview/bar_graph"
        );
    }

    #[test]
    fn clone_then_delete_keeps_serials_positional() {
        let mut harness = Harness::new(two_records());

        harness.press(KeyCode::Char('c'));
        assert_eq!(harness.row_ids(), vec![1, 2, 3]);
        assert_eq!(harness.view_data.table_cursor, 2);
        assert_eq!(harness.status(), "cloned pipeline 1 as 3");

        harness.press(KeyCode::Char('k'));
        harness.press(KeyCode::Char('d'));
        assert_eq!(harness.row_ids(), vec![1, 3]);
        let serials: Vec<usize> = harness
            .view_data
            .rows
            .iter()
            .map(|row| row.serial_no)
            .collect();
        assert_eq!(serials, vec![1, 2]);
        assert_eq!(harness.view_data.rows[1].record.name.first_name, "John");
    }

    #[test]
    fn delete_on_empty_table_reports_no_selection() {
        let mut harness = Harness::new(Vec::new());
        harness.press(KeyCode::Char('d'));
        assert_eq!(harness.status(), "no row selected");
        harness.press(KeyCode::Char('c'));
        assert_eq!(harness.status(), "no row selected");
    }

    #[test]
    fn create_dialog_collects_fields_and_steps() {
        let mut harness = Harness::new(two_records());

        harness.press(KeyCode::Char('n'));
        assert_eq!(harness.state.mode, AppMode::Form(FormKind::CreatePipeline));

        harness.type_text("Ada");
        harness.press(KeyCode::Tab);
        harness.type_text("Lovelace");
        harness.press_times(KeyCode::Tab, 5);
        harness.press(KeyCode::Char(' '));
        harness.press_times(KeyCode::Tab, 2);
        harness.press(KeyCode::Char(' '));
        harness.press(KeyCode::Enter);

        assert_eq!(harness.state.mode, AppMode::Nav);
        assert_eq!(harness.row_ids(), vec![1, 2, 3]);
        assert_eq!(harness.view_data.table_cursor, 2);
        let created = &harness.view_data.rows[2].record;
        assert_eq!(created.name.first_name, "Ada");
        assert_eq!(created.name.last_name, "Lovelace");
        assert_eq!(created.environment, "Development");
        assert_eq!(created.no_of_dags, 0);
        assert_eq!(created.created_on, harness.runtime.today());
        assert_eq!(
            created.flow,
            vec![SetupStep::DataExtraction, SetupStep::RunModel]
        );
        assert_eq!(
            harness.runtime.picked_steps,
            vec![SetupStep::DataExtraction, SetupStep::RunModel]
        );
        assert_eq!(harness.status(), "created pipeline 3");
    }

    #[test]
    fn create_with_bad_dag_count_keeps_dialog_open() {
        let mut harness = Harness::new(two_records());

        harness.press(KeyCode::Char('n'));
        harness.press_times(KeyCode::Tab, 3);
        harness.press(KeyCode::Backspace);
        harness.type_text("many");
        harness.press(KeyCode::Enter);

        assert_eq!(harness.state.mode, AppMode::Form(FormKind::CreatePipeline));
        assert!(harness.status().contains("No of DAGs"));
        assert_eq!(harness.row_ids(), vec![1, 2]);
    }

    #[test]
    fn create_cancel_commits_nothing() {
        let mut harness = Harness::new(two_records());
        harness.press(KeyCode::Char('n'));
        harness.type_text("Ghost");
        harness.press(KeyCode::Esc);

        assert_eq!(harness.state.mode, AppMode::Nav);
        assert!(harness.view_data.form.is_none());
        assert_eq!(harness.row_ids(), vec![1, 2]);
        assert_eq!(harness.status(), "create canceled");
    }

    #[test]
    fn edit_save_updates_only_target_row() -> Result<()> {
        let mut harness = Harness::new(two_records());
        let untouched = harness.runtime.table.list()?[0].clone();

        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Char('e'));
        assert_eq!(harness.state.mode, AppMode::Form(FormKind::EditPipeline));
        assert!(harness.runtime.table.is_editing());

        harness.press_times(KeyCode::Backspace, 4);
        harness.type_text("Joan");
        harness.press(KeyCode::Enter);

        let records = harness.runtime.table.list()?;
        assert_eq!(records[0], untouched);
        assert_eq!(records[1].name.first_name, "Joan");
        assert_eq!(records[1].id.get(), 2);
        assert!(!harness.runtime.table.is_editing());
        assert_eq!(harness.state.mode, AppMode::Nav);
        assert_eq!(harness.status(), "saved pipeline 2");
        Ok(())
    }

    #[test]
    fn edit_cancel_leaves_collection_unchanged() -> Result<()> {
        let mut harness = Harness::new(two_records());
        let before = harness.runtime.table.list()?;

        harness.press(KeyCode::Char('e'));
        harness.type_text("zzz");
        harness.press(KeyCode::Esc);

        assert_eq!(harness.runtime.table.list()?, before);
        assert!(!harness.runtime.table.is_editing());
        assert_eq!(harness.state.mode, AppMode::Nav);
        Ok(())
    }

    #[test]
    fn edit_with_bad_date_keeps_working_copy_open() -> Result<()> {
        let mut harness = Harness::new(two_records());
        let before = harness.runtime.table.list()?;

        harness.press(KeyCode::Char('e'));
        harness.press_times(KeyCode::Tab, 4);
        harness.type_text("x");
        harness.press(KeyCode::Enter);

        assert_eq!(harness.state.mode, AppMode::Form(FormKind::EditPipeline));
        assert!(harness.status().contains("Created On"));
        assert!(harness.runtime.table.is_editing());
        assert_eq!(harness.runtime.table.list()?, before);
        Ok(())
    }

    #[test]
    fn stale_vessel_response_is_discarded() {
        let mut harness = Harness::new(Vec::new());
        harness.press(KeyCode::Tab);
        harness.deliver(0, Ok(vec![option("C1", "Acme"), option("C2", "Globex")]));

        harness.press(KeyCode::Enter);
        assert_eq!(
            harness.runtime.requests[1].key,
            FetchKey::Vessels {
                client: OptionId::new("C1")
            }
        );
        harness.press(KeyCode::Char('l'));
        harness.press(KeyCode::Enter);
        assert_eq!(
            harness.runtime.requests[2].key,
            FetchKey::Vessels {
                client: OptionId::new("C2")
            }
        );

        harness.deliver(1, Ok(vec![option("VA", "Acme Vessel")]));
        assert!(harness.state.selection.vessels().is_empty());
        assert_eq!(
            harness.state.selection.status(CascadeLevel::Vessel),
            &LevelStatus::Loading
        );

        harness.deliver(2, Ok(vec![option("VB", "Globex Vessel")]));
        assert_eq!(
            harness.state.selection.vessels(),
            &[option("VB", "Globex Vessel")]
        );
    }

    #[test]
    fn changing_client_clears_downstream_before_fetch_resolves() {
        let mut harness = Harness::with_loaded_parameters();
        assert_eq!(harness.state.selection.available_parameters().len(), 2);

        harness.press_times(KeyCode::Char('k'), 2);
        harness.press(KeyCode::Char('l'));
        harness.press(KeyCode::Enter);

        let selection = &harness.state.selection;
        assert_eq!(selection.selected_client_id(), Some(&OptionId::new("C2")));
        assert!(selection.vessels().is_empty());
        assert_eq!(selection.selected_vessel_id(), None);
        assert!(selection.available_parameters().is_empty());
        assert!(selection.selected_parameter_ids().is_empty());
    }

    #[test]
    fn fetch_failure_is_reported_and_reload_retries() {
        let mut harness = Harness::new(Vec::new());
        harness.deliver(0, Err("connection refused".to_owned()));

        assert_eq!(harness.status(), "clients fetch failed: connection refused");
        assert!(harness.state.selection.clients().is_empty());

        harness.press(KeyCode::Tab);
        harness.press(KeyCode::Char('r'));
        assert_eq!(harness.runtime.requests.len(), 2);
        assert_eq!(harness.runtime.requests[1].key, FetchKey::Clients);

        harness.deliver(1, Ok(vec![option("C1", "Acme")]));
        assert_eq!(
            harness.state.selection.status(CascadeLevel::Client),
            &LevelStatus::Loaded
        );
    }

    #[test]
    fn vessel_pick_without_client_is_refused() {
        let mut harness = Harness::new(Vec::new());
        harness.press(KeyCode::Tab);
        harness.deliver(0, Ok(vec![option("C1", "Acme")]));
        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Enter);

        assert_eq!(harness.status(), "pick a client first");
        assert_eq!(harness.runtime.requests.len(), 1);
    }

    #[test]
    fn parameters_toggle_and_submit() {
        let mut harness = Harness::with_loaded_parameters();
        assert_eq!(harness.view_data.airflow.focus, AirflowControl::Parameters);

        harness.press(KeyCode::Char(' '));
        harness.press(KeyCode::Char('l'));
        harness.press(KeyCode::Char(' '));
        harness.press(KeyCode::Char('h'));
        harness.press(KeyCode::Char(' '));
        assert_eq!(
            harness.state.selection.selected_parameter_ids(),
            &[OptionId::new("P2")]
        );

        harness.press(KeyCode::Char('s'));
        assert_eq!(harness.status(), "selection logged");
        let payload = &harness.runtime.submissions[0];
        assert_eq!(payload.selected_client_id, Some(OptionId::new("C1")));
        assert_eq!(payload.selected_vessel_name.as_deref(), Some("Northern Star"));
        assert_eq!(payload.selected_parameter_ids, vec![OptionId::new("P2")]);
    }

    #[test]
    fn submit_failure_keeps_selection() {
        let mut harness = Harness::with_loaded_parameters();
        harness.press(KeyCode::Char(' '));
        harness.runtime.submit_error = Some("server said no".to_owned());
        let before = harness.state.selection.clone();

        harness.press(KeyCode::Char('s'));
        assert_eq!(harness.status(), "submit failed: server said no");
        assert_eq!(harness.state.selection, before);
        assert!(harness.runtime.submissions.is_empty());
    }

    #[test]
    fn date_picker_sets_and_clears_start_date() -> Result<()> {
        let mut harness = Harness::new(Vec::new());
        harness.press(KeyCode::Tab);
        harness.press_times(KeyCode::Char('j'), 3);
        assert_eq!(harness.view_data.airflow.focus, AirflowControl::StartDate);

        harness.press(KeyCode::Enter);
        assert!(harness.view_data.date_picker.is_open());
        harness.press(KeyCode::Char('l'));
        harness.press(KeyCode::Char('L'));
        harness.press(KeyCode::Enter);
        assert_eq!(
            harness.state.selection.start_date(),
            Some(Date::from_calendar_date(2024, Month::February, 16)?)
        );
        assert_eq!(harness.state.selection.end_date(), None);

        harness.press(KeyCode::Enter);
        assert_eq!(
            harness.view_data.date_picker.original,
            Some(Date::from_calendar_date(2024, Month::February, 16)?)
        );
        harness.press(KeyCode::Char('x'));
        assert_eq!(harness.state.selection.start_date(), None);
        assert!(!harness.view_data.date_picker.is_open());
        Ok(())
    }

    #[test]
    fn date_picker_escape_keeps_previous_value() -> Result<()> {
        let mut harness = Harness::new(Vec::new());
        harness.press(KeyCode::Tab);
        harness.press_times(KeyCode::Char('j'), 4);
        harness.press(KeyCode::Enter);
        harness.press(KeyCode::Char(']'));
        harness.press(KeyCode::Esc);

        assert_eq!(harness.state.selection.end_date(), None);
        assert_eq!(harness.status(), "date edit canceled");
        Ok(())
    }

    #[test]
    fn help_overlay_swallows_keys_until_closed() {
        let mut harness = Harness::new(two_records());
        harness.press(KeyCode::Char('?'));
        assert!(harness.view_data.help_visible);

        harness.press(KeyCode::Char('c'));
        assert_eq!(harness.row_ids(), vec![1, 2]);

        harness.press(KeyCode::Esc);
        assert!(!harness.view_data.help_visible);
    }

    #[test]
    fn default_spawn_fetch_reports_on_channel() {
        struct InlineRuntime;

        impl AppRuntime for InlineRuntime {
            fn load_rows(&mut self) -> Result<Vec<TableRow>> {
                Ok(Vec::new())
            }
            fn apply_table_command(&mut self, _command: TableCommand) -> Result<Vec<TableEvent>> {
                Ok(Vec::new())
            }
            fn working_copy(&self) -> Option<PipelineRecord> {
                None
            }
            fn fetch_options(&mut self, _key: &FetchKey) -> Result<Vec<OptionItem>> {
                Ok(vec![option("C1", "Acme")])
            }
            fn submit_selection(&mut self, _payload: &SubmissionPayload) -> Result<SubmitOutcome> {
                Ok(SubmitOutcome::Logged)
            }
            fn plot_link_url(&self, link: &PlotLink) -> String {
                link.path.to_owned()
            }
        }

        let (tx, rx) = mpsc::channel();
        let mut state = AppState::default();
        let mut view_data = ViewData::default();
        start_session(&mut state, &mut InlineRuntime, &mut view_data, &tx);
        process_internal_events(&mut state, &mut view_data, &tx, &rx);

        assert_eq!(state.selection.clients(), &[option("C1", "Acme")]);
        assert_eq!(view_data.plot_urls[3], "/pipelineuiview/box_plot");
    }

    #[test]
    fn shift_date_by_months_clamps_to_month_end() -> Result<()> {
        let jan_31 = Date::from_calendar_date(2024, Month::January, 31)?;
        assert_eq!(
            shift_date_by_months(jan_31, 1),
            Some(Date::from_calendar_date(2024, Month::February, 29)?)
        );
        assert_eq!(
            shift_date_by_months(jan_31, -1),
            Some(Date::from_calendar_date(2023, Month::December, 31)?)
        );
        assert_eq!(
            shift_date_by_months(Date::from_calendar_date(2024, Month::February, 29)?, 12),
            Some(Date::from_calendar_date(2025, Month::February, 28)?)
        );
        Ok(())
    }

    #[test]
    fn step_cursor_clamps_to_bounds() {
        assert_eq!(step_cursor(0, 0, 1), 0);
        assert_eq!(step_cursor(0, 3, -1), 0);
        assert_eq!(step_cursor(2, 3, 1), 2);
        assert_eq!(step_cursor(9, 3, -1), 1);
    }

    #[test]
    fn airflow_text_marks_disabled_levels() {
        let harness = Harness::new(Vec::new());
        let text = render_airflow_text(&harness.state, &harness.view_data);
        assert!(text.contains("> client [loading]"));
        assert!(text.contains("vessel [disabled: pick a client]"));
        assert!(text.contains("parameters [disabled: pick a vessel]"));
        assert!(text.contains("Show Box Plot → http://mock.test/pipelineuiview/box_plot"));
    }

    #[test]
    fn create_form_lists_fields_then_steps() {
        let slots = form_slots(FormKind::CreatePipeline);
        assert_eq!(slots.len(), 9);
        assert_eq!(form_slots(FormKind::EditPipeline).len(), 6);

        let mut harness = Harness::new(Vec::new());
        harness.press(KeyCode::Char('n'));
        let form = harness.view_data.form.as_ref().expect("form should be open");
        let text = render_form_text(form);
        assert!(text.contains("> First Name: "));
        assert!(text.contains("Created On: 2024-01-15"));
        assert!(text.contains("[ ] Data Transformation"));
    }

    #[test]
    fn status_text_shows_mode_status_and_hints() {
        let mut state = AppState::default();
        assert!(status_text(&state).starts_with("NAV | j/k move"));

        state.status_line = Some("saved pipeline 2".to_owned());
        assert!(status_text(&state).starts_with("NAV | saved pipeline 2 | "));

        state.mode = AppMode::Form(FormKind::EditPipeline);
        assert!(status_text(&state).starts_with("FORM | saved pipeline 2 | tab field"));
    }
}
