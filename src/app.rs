use crate::{
    config::AppConfig,
    extension::{self, STATUS_ATTRIBUTE_ID},
    host::{
        ExtensionApi, ExtensionContext, HostEvent, ModalDialogs, ProfileAction, Registry,
        TableAttribute, PROFILE_ACTIONS,
    },
    library::{InstallState, Library, ModEntry, Profile, WAS_INSTALLED_ATTRIBUTE},
    logging::LogBuffer,
    reference::REFERENCE_FEATURE,
    store::{Action, AppState, Store},
};
use anyhow::{bail, Context, Result};
use std::{
    cell::Cell,
    path::PathBuf,
    rc::Rc,
    sync::{mpsc, Arc},
};

/// The terminal host: owns the store, the extension registrations and the
/// dialog surface, and runs the install pipeline for requested mods.
pub struct App {
    pub config: AppConfig,
    pub data_dir: PathBuf,
    pub store: Store,
    pub registry: Registry,
    pub dialogs: Rc<ModalDialogs>,
    pub logs: LogBuffer,
    pub selected: usize,
    pub filter: Option<String>,
    pub status: String,
    pub should_quit: bool,
    events: mpsc::Receiver<HostEvent>,
    dirty: Rc<Cell<bool>>,
    installs_requested: Vec<String>,
}

impl App {
    pub fn initialize(data_dir: PathBuf, config: AppConfig, logs: LogBuffer) -> Result<Self> {
        let library = Library::load_or_create(&data_dir).context("load library")?;
        log::info!(
            "Library loaded: {} profile(s), {} game(s)",
            library.profiles.len(),
            library.mods.len()
        );

        let store = Store::from_library(library);
        let dialogs = Rc::new(ModalDialogs::default());
        let (events_tx, events) = mpsc::channel();
        let api = ExtensionApi {
            store: store.clone(),
            events: events_tx,
            dialogs: dialogs.clone(),
        };

        let mut context = ExtensionContext::new(api);
        if !extension::init(&mut context) {
            log::warn!("Reference profile extension failed to initialize");
        }
        let registry = context.finish();

        let dirty = Rc::new(Cell::new(true));
        for attribute in &registry.mod_attributes {
            if let Some(hook) = &attribute.external_data {
                let dirty = dirty.clone();
                hook(Rc::new(move || dirty.set(true)));
            }
        }

        Ok(Self {
            config,
            data_dir,
            store,
            registry,
            dialogs,
            logs,
            selected: 0,
            filter: None,
            status: "Ready".to_string(),
            should_quit: false,
            events,
            dirty,
            installs_requested: Vec::new(),
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.store.state()
    }

    pub fn save(&self) -> Result<()> {
        self.state()
            .to_library()
            .save(&self.data_dir)
            .context("save library")
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.data_dir)
    }

    /// Clears and returns the re-render flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn active_profile(&self) -> Option<Arc<Profile>> {
        self.state().active_profile().cloned()
    }

    pub fn reference_profile(&self) -> Option<Arc<Profile>> {
        let state = self.state();
        let id = state.active_profile()?.feature_str(REFERENCE_FEATURE)?.to_string();
        state.profile_by_id(&id).cloned()
    }

    pub fn status_column(&self) -> Option<&TableAttribute<ModEntry>> {
        self.registry.mod_attribute(STATUS_ATTRIBUTE_ID)
    }

    /// Columns the table shows, honoring the column visibility setting.
    pub fn columns(&self) -> Vec<&TableAttribute<ModEntry>> {
        self.registry
            .mod_columns()
            .into_iter()
            .filter(|column| {
                !(column.is_toggleable
                    && column.id == STATUS_ATTRIBUTE_ID
                    && !self.config.show_reference_column)
            })
            .collect()
    }

    /// Mods of the active profile's game that pass the column filter.
    pub fn visible_mods(&self) -> Vec<ModEntry> {
        let state = self.state();
        let Some(profile) = state.active_profile() else {
            return Vec::new();
        };
        let selection: Vec<String> = self.filter.iter().cloned().collect();
        let column = self.status_column();
        state
            .game_mods(&profile.game_id)
            .into_iter()
            .filter(|entry| match (column, column.and_then(|c| c.filter.as_ref())) {
                (Some(column), Some(filter)) => filter.matches(&selection, &(column.calc)(entry)),
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub fn selected_mod(&self) -> Option<ModEntry> {
        self.visible_mods().into_iter().nth(self.selected)
    }

    pub fn clamp_selection(&mut self) {
        let len = self.visible_mods().len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.visible_mods().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    /// Routes an edit of the reference status column through its handler.
    /// Choices the column marks as disabled are refused.
    pub fn edit_status(&mut self, mods: &[ModEntry], value: Option<&str>) -> Result<()> {
        let Some(edit) = self.status_column().and_then(|column| column.edit.as_ref()) else {
            bail!("Reference Status column is not editable");
        };
        if let Some(value) = value {
            let choices = (edit.choices)();
            if choices.iter().any(|choice| choice.key == value && choice.disabled) {
                bail!("'{value}' cannot be chosen");
            }
        }
        let refs: Vec<&ModEntry> = mods.iter().collect();
        (edit.on_change_value)(&refs, value);
        self.poll_events();
        self.mark_dirty();
        Ok(())
    }

    pub fn toggle_selected(&mut self) {
        if let Some(entry) = self.selected_mod() {
            self.report_edit(&[entry], None);
        }
    }

    pub fn set_selected(&mut self, value: &str) {
        if let Some(entry) = self.selected_mod() {
            self.report_edit(&[entry], Some(value));
        }
    }

    fn report_edit(&mut self, mods: &[ModEntry], value: Option<&str>) {
        if let Err(err) = self.edit_status(mods, value) {
            self.status = err.to_string();
            log::warn!("Edit refused: {err}");
        }
    }

    pub fn profile_actions(&self) -> Vec<&ProfileAction> {
        self.registry.actions_in(PROFILE_ACTIONS)
    }

    pub fn run_profile_action(&self, title: &str, profile_ids: &[String]) -> bool {
        match self.registry.action_by_title(PROFILE_ACTIONS, title) {
            Some(action) => {
                (action.handler)(profile_ids);
                true
            }
            None => false,
        }
    }

    /// Runs the first profile action against the active profile.
    pub fn open_reference_dialog(&mut self) {
        let Some(active) = self.active_profile() else {
            self.status = "No active profile".to_string();
            return;
        };
        let title = self.profile_actions().first().map(|action| action.title.clone());
        let Some(title) = title else {
            self.status = "No profile actions registered".to_string();
            return;
        };
        self.run_profile_action(&title, &[active.id.clone()]);
    }

    pub fn cycle_profile(&mut self) {
        let state = self.state();
        let ids: Vec<&String> = state.profiles.keys().collect();
        if ids.is_empty() {
            return;
        }
        let current = state
            .active_profile
            .as_ref()
            .and_then(|id| ids.iter().position(|candidate| *candidate == id));
        let next = current.map(|index| (index + 1) % ids.len()).unwrap_or(0);
        let id = ids[next].clone();
        self.store.dispatch(Action::SetActiveProfile(Some(id.clone())));
        self.selected = 0;
        self.status = format!("Active profile: {id}");
        log::info!("Switched active profile to '{id}'");
        self.mark_dirty();
    }

    pub fn activate_profile(&mut self, id: &str) -> bool {
        if self.state().profile_by_id(id).is_none() {
            return false;
        }
        self.store.dispatch(Action::SetActiveProfile(Some(id.to_string())));
        log::info!("Switched active profile to '{id}'");
        true
    }

    /// Steps through no filter and each option of the column's filter.
    pub fn cycle_filter(&mut self) {
        let Some(filter) = self.status_column().and_then(|column| column.filter.as_ref()) else {
            return;
        };
        let values: Vec<String> = filter
            .options
            .iter()
            .map(|option| option.value.clone())
            .collect();
        let next = match &self.filter {
            None => values.first().cloned(),
            Some(current) => values
                .iter()
                .position(|value| value == current)
                .and_then(|index| values.get(index + 1).cloned()),
        };
        self.filter = next;
        self.selected = 0;
        self.status = match &self.filter {
            Some(value) => format!("Filter: {value}"),
            None => "Filter cleared".to_string(),
        };
    }

    pub fn toggle_reference_column(&mut self) -> Result<()> {
        self.config.show_reference_column = !self.config.show_reference_column;
        self.save_config()?;
        self.status = if self.config.show_reference_column {
            "Reference Status column shown".to_string()
        } else {
            "Reference Status column hidden".to_string()
        };
        Ok(())
    }

    /// Drains host events. Install requests are handed to the install
    /// pipeline.
    pub fn poll_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                HostEvent::StartInstallDownload { mod_id } => {
                    self.status = format!("Installing {mod_id}");
                    self.install_mod(&mod_id);
                    self.installs_requested.push(mod_id);
                }
            }
        }
    }

    pub fn take_install_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.installs_requested)
    }

    fn install_mod(&mut self, mod_id: &str) {
        let Some(game_id) = self.active_profile().map(|profile| profile.game_id.clone()) else {
            log::warn!("Install of '{mod_id}' skipped: no active profile");
            return;
        };
        if self.state().find_mod(&game_id, mod_id).is_none() {
            log::warn!("Install of '{mod_id}' skipped: not part of '{game_id}'");
            return;
        }
        log::info!("Installing '{mod_id}'");
        self.store.dispatch(Action::SetModInstallState {
            game_id: game_id.clone(),
            mod_id: mod_id.to_string(),
            state: Some(InstallState::Installing),
        });
        self.store.dispatch(Action::SetModInstallState {
            game_id: game_id.clone(),
            mod_id: mod_id.to_string(),
            state: Some(InstallState::Installed),
        });
        self.store.dispatch(Action::SetModAttribute {
            game_id,
            mod_id: mod_id.to_string(),
            key: WAS_INSTALLED_ATTRIBUTE.to_string(),
            value: serde_json::Value::Bool(true),
        });
        self.mark_dirty();
    }
}
