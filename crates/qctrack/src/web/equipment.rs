//! Equipment pages: the work queue, registration, test entry, search,
//! history and deletion.

use axum::extract::{Query, State};
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::session::CurrentUser;
use super::{AppState, RecordId};
use crate::activity::ActivityAction;
use crate::equipment::{Equipment, EquipmentStatus, NewEquipment, NewTest};
use crate::error::{Error, Result};
use crate::history::time_in_field;
use crate::search::{SearchFilter, SearchParams};
use crate::storage::{Flash, Registration, Storage};

/// Which slice of equipment the index page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Awaiting,
    Tested,
    All,
}

impl Tab {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("tested") => Self::Tested,
            Some("all") => Self::All,
            _ => Self::Awaiting,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Awaiting => "awaiting",
            Self::Tested => "tested",
            Self::All => "all",
        }
    }

    fn includes(self, equipment: &Equipment) -> bool {
        match self {
            Self::Awaiting => equipment.is_awaiting_test(),
            Self::Tested => equipment.has_been_tested(),
            Self::All => true,
        }
    }
}

/// Query string of the index page.
#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    tab: Option<String>,
}

/// Submitted registration form.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    equipment_type: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    serial: String,
}

/// Submitted test form.
#[derive(Debug, Deserialize)]
pub struct TestForm {
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    speed_mbps: String,
    #[serde(default)]
    signal_dbm: String,
    #[serde(default)]
    observations: String,
}

fn load_equipment(state: &AppState, id: i64) -> Result<Equipment> {
    state
        .with_storage(|storage| storage.get_equipment(id))?
        .ok_or_else(|| Error::not_found(format!("equipment {id}")))
}

/// `GET /`
pub async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<IndexQuery>,
) -> Result<Html<String>> {
    let tab = Tab::parse(query.tab.as_deref());
    let all = state.with_storage(Storage::list_equipment)?;

    let counts = json!({
        "awaiting": all.iter().filter(|e| Tab::Awaiting.includes(e)).count(),
        "tested": all.iter().filter(|e| Tab::Tested.includes(e)).count(),
        "all": all.len(),
    });
    let rows: Vec<Equipment> = all.into_iter().filter(|e| tab.includes(e)).collect();

    let mut context = state.page_context(&current)?;
    context.insert("tab", tab.as_str());
    context.insert("counts", &counts);
    context.insert("rows", &rows);
    state.render("index.html", &context)
}

/// `POST /equipment`
pub async fn register(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect> {
    let new = match NewEquipment::new(&form.equipment_type, &form.model, &form.serial) {
        Ok(new) => new,
        Err(e) if e.is_user_error() => {
            return state.flash_redirect(&current, &Flash::danger(e.to_string()), "/");
        }
        Err(e) => return Err(e),
    };

    let registration = state.with_storage(|storage| {
        let registration = storage.register_equipment(&new)?;
        let (action, verb) = if registration.is_retest() {
            (ActivityAction::EquipmentRetest, "flagged for retest")
        } else {
            (ActivityAction::EquipmentRegistered, "registered")
        };
        let equipment = registration.equipment();
        storage.log_activity(
            current.actor(),
            action,
            &format!("{} {} {} {}", equipment.serial, equipment.equipment_type, equipment.model, verb),
        )?;
        Ok(registration)
    })?;

    let flash = match &registration {
        Registration::Created(equipment) => {
            info!("Registered {} by {}", equipment.serial, current.user.username);
            Flash::success(format!("Equipment {} registered.", equipment.serial))
        }
        Registration::Retest(equipment) => {
            info!("{} flagged for retest by {}", equipment.serial, current.user.username);
            Flash::success(format!(
                "Equipment {} was already registered and is now awaiting a new test.",
                equipment.serial
            ))
        }
    };
    state.flash_redirect(&current, &flash, "/")
}

/// `POST /equipment/{id}/tests`
pub async fn record_test(
    State(state): State<AppState>,
    current: CurrentUser,
    RecordId(id): RecordId,
    Form(form): Form<TestForm>,
) -> Result<Redirect> {
    let equipment = load_equipment(&state, id)?;

    let test = match NewTest::parse(
        &form.outcome,
        &form.speed_mbps,
        &form.signal_dbm,
        &form.observations,
    ) {
        Ok(test) => test,
        Err(e) if e.is_user_error() => {
            let message = format!("Test for {} not saved: {}", equipment.serial, e);
            return state.flash_redirect(&current, &Flash::danger(message), "/");
        }
        Err(e) => return Err(e),
    };

    let record = state.with_storage(|storage| {
        let record = storage.record_test(id, &test, current.actor())?;
        storage.log_activity(
            current.actor(),
            ActivityAction::TestRecorded,
            &format!("{} {}", equipment.serial, record.outcome),
        )?;
        Ok(record)
    })?;

    info!(
        "Recorded {} for {} by {}",
        record.outcome, equipment.serial, current.user.username
    );
    let flash = Flash::success(format!(
        "Test for {} saved: {}.",
        equipment.serial,
        record.outcome.label()
    ));
    state.flash_redirect(&current, &flash, "/")
}

/// `GET /search`
pub async fn search(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Html<String>> {
    let filter = SearchFilter::from_params(&params);
    let offset = state.config.utc_offset();
    let results = state.with_storage(|storage| storage.search_equipment_at(&filter, offset))?;

    let statuses: Vec<_> = EquipmentStatus::ALL
        .iter()
        .map(|status| json!({ "value": status.as_str(), "label": status.label() }))
        .collect();

    let mut context = state.page_context(&current)?;
    context.insert("params", &params);
    context.insert("statuses", &statuses);
    context.insert("description", &filter.describe());
    context.insert("results", &results);
    state.render("search.html", &context)
}

/// `GET /equipment/{id}/history`
pub async fn history(
    State(state): State<AppState>,
    current: CurrentUser,
    RecordId(id): RecordId,
) -> Result<Html<String>> {
    let equipment = load_equipment(&state, id)?;
    let tests = state.with_storage(|storage| storage.tests_for(id))?;
    let entries = time_in_field(equipment.registered_at, &tests);

    let mut context = state.page_context(&current)?;
    context.insert("equipment", &equipment);
    context.insert("entries", &entries);
    state.render("history.html", &context)
}

/// `POST /equipment/{id}/delete`
pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    RecordId(id): RecordId,
) -> Result<Redirect> {
    let equipment = load_equipment(&state, id)?;

    state.with_storage(|storage| {
        storage.delete_equipment(id)?;
        storage.log_activity(
            current.actor(),
            ActivityAction::EquipmentDeleted,
            &format!(
                "{} {} {} with {} test(s)",
                equipment.serial, equipment.equipment_type, equipment.model, equipment.test_count
            ),
        )?;
        Ok(())
    })?;

    info!("Deleted {} by {}", equipment.serial, current.user.username);
    let flash = Flash::success(format!(
        "Equipment {} and its history were deleted.",
        equipment.serial
    ));
    state.flash_redirect(&current, &flash, "/search")
}
