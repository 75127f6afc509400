//! Contracts between the host application and its extensions: the records an
//! extension registers, the dialog and event surfaces it calls into, and the
//! context handed to an extension's `init`.

use crate::{
    library::ModEntry,
    store::{AppState, Store},
};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    rc::Rc,
    sync::{mpsc, Arc},
};

pub const MODS_TABLE: &str = "mods";
pub const PROFILE_ACTIONS: &str = "profile-actions";

/// One-way messages into host subsystems. Senders never wait for a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    StartInstallDownload { mod_id: String },
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::StartInstallDownload { .. } => "start-install-download",
        }
    }
}

pub type EventSender = mpsc::Sender<HostEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogType {
    Question,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogChoice {
    pub id: String,
    pub text: String,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogAction {
    pub label: String,
}

impl DialogAction {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub kind: DialogType,
    pub title: String,
    pub text: String,
    pub choices: Vec<DialogChoice>,
    pub actions: Vec<DialogAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogResult {
    pub action: String,
    pub input: BTreeMap<String, bool>,
}

pub type DialogCallback = Box<dyn FnOnce(DialogResult)>;

/// Modal dialogs. `on_close` runs exactly once, when the user resolves the
/// dialog; it never runs if the dialog is rejected.
pub trait DialogHost {
    fn show_dialog(&self, request: DialogRequest, on_close: DialogCallback);
}

/// Render-ready copy of the open dialog.
#[derive(Debug, Clone)]
pub struct DialogView {
    pub request: DialogRequest,
    pub cursor: usize,
    pub selected: Option<usize>,
    pub action: usize,
}

struct PendingDialog {
    request: DialogRequest,
    cursor: usize,
    selected: Option<usize>,
    action: usize,
    on_close: DialogCallback,
}

impl PendingDialog {
    fn result(&self, action: &str) -> DialogResult {
        let input = self
            .request
            .choices
            .iter()
            .enumerate()
            .map(|(index, choice)| (choice.id.clone(), self.selected == Some(index)))
            .collect();
        DialogResult {
            action: action.to_string(),
            input,
        }
    }
}

/// Single-choice modal host. One dialog is open at a time; requests made
/// while another is open are rejected.
#[derive(Default)]
pub struct ModalDialogs {
    pending: RefCell<Option<PendingDialog>>,
}

impl DialogHost for ModalDialogs {
    fn show_dialog(&self, request: DialogRequest, on_close: DialogCallback) {
        let mut pending = self.pending.borrow_mut();
        if pending.is_some() {
            log::warn!("Dialog '{}' rejected: another dialog is open", request.title);
            return;
        }
        let selected = request.choices.iter().position(|choice| choice.value);
        let action = request.actions.len().saturating_sub(1);
        *pending = Some(PendingDialog {
            cursor: selected.unwrap_or(0),
            selected,
            action,
            request,
            on_close,
        });
    }
}

impl ModalDialogs {
    pub fn is_open(&self) -> bool {
        self.pending.borrow().is_some()
    }

    pub fn view(&self) -> Option<DialogView> {
        self.pending.borrow().as_ref().map(|pending| DialogView {
            request: pending.request.clone(),
            cursor: pending.cursor,
            selected: pending.selected,
            action: pending.action,
        })
    }

    pub fn move_cursor(&self, delta: isize) {
        if let Some(pending) = self.pending.borrow_mut().as_mut() {
            let len = pending.request.choices.len();
            if len == 0 {
                return;
            }
            let next = pending.cursor as isize + delta;
            pending.cursor = next.clamp(0, len as isize - 1) as usize;
        }
    }

    pub fn select_cursor(&self) {
        if let Some(pending) = self.pending.borrow_mut().as_mut() {
            if pending.cursor < pending.request.choices.len() {
                pending.selected = Some(pending.cursor);
            }
        }
    }

    /// Marks the choice with `id`, returning false when there is none.
    pub fn select_choice(&self, id: &str) -> bool {
        let mut slot = self.pending.borrow_mut();
        let Some(pending) = slot.as_mut() else {
            return false;
        };
        match pending.request.choices.iter().position(|choice| choice.id == id) {
            Some(index) => {
                pending.cursor = index;
                pending.selected = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn cycle_action(&self, delta: isize) {
        if let Some(pending) = self.pending.borrow_mut().as_mut() {
            let len = pending.request.actions.len() as isize;
            if len == 0 {
                return;
            }
            pending.action = (pending.action as isize + delta).rem_euclid(len) as usize;
        }
    }

    /// Resolves with the highlighted action button.
    pub fn confirm(&self) {
        let label = self.pending.borrow().as_ref().and_then(|pending| {
            pending
                .request
                .actions
                .get(pending.action)
                .map(|action| action.label.clone())
        });
        match label {
            Some(label) => self.resolve(&label),
            None => self.cancel(),
        }
    }

    /// Resolves with the first action, which hosts treat as the cancel button.
    pub fn cancel(&self) {
        let label = self.pending.borrow().as_ref().map(|pending| {
            pending
                .request
                .actions
                .first()
                .map(|action| action.label.clone())
                .unwrap_or_default()
        });
        if let Some(label) = label {
            self.resolve(&label);
        }
    }

    pub fn resolve(&self, action: &str) {
        let Some(pending) = self.pending.borrow_mut().take() else {
            return;
        };
        let result = pending.result(action);
        log::debug!("Dialog '{}' closed with '{action}'", pending.request.title);
        (pending.on_close)(result);
    }
}

/// Handles an extension keeps to reach the host after `init`.
#[derive(Clone)]
pub struct ExtensionApi {
    pub store: Store,
    pub events: EventSender,
    pub dialogs: Rc<dyn DialogHost>,
}

impl ExtensionApi {
    pub fn state(&self) -> Arc<AppState> {
        self.store.state()
    }

    pub fn emit(&self, event: HostEvent) {
        let name = event.name();
        if self.events.send(event).is_err() {
            log::debug!("No listener for host event '{name}'");
        }
    }
}

pub type RerenderCallback = Rc<dyn Fn()>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditChoice {
    pub key: String,
    pub text: String,
    pub icon: String,
    pub disabled: bool,
}

impl EditChoice {
    pub fn new(key: &str, text: &str, icon: &str) -> Self {
        Self {
            key: key.to_string(),
            text: text.to_string(),
            icon: icon.to_string(),
            disabled: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

pub struct EditSpec<T> {
    pub inline: bool,
    pub choices: Box<dyn Fn() -> Vec<EditChoice>>,
    /// Receives every edited row and the chosen key, or `None` for a toggle.
    pub on_change_value: Box<dyn Fn(&[&T], Option<&str>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsFilter {
    pub options: Vec<FilterOption>,
    pub multi: bool,
    pub raw: bool,
}

impl OptionsFilter {
    pub fn new(options: &[(&str, &str)], multi: bool, raw: bool) -> Self {
        Self {
            options: options
                .iter()
                .map(|(value, label)| FilterOption {
                    value: value.to_string(),
                    label: label.to_string(),
                })
                .collect(),
            multi,
            raw,
        }
    }

    /// An empty selection lets every row through.
    pub fn matches(&self, selected: &[String], value: &str) -> bool {
        selected.is_empty() || selected.iter().any(|wanted| wanted == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Table,
    Detail,
    Both,
}

pub struct TableAttribute<T> {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub position: i32,
    pub placement: Placement,
    pub is_toggleable: bool,
    pub calc: Box<dyn Fn(&T) -> String>,
    pub edit: Option<EditSpec<T>>,
    pub no_shrink: bool,
    pub is_sortable: bool,
    pub is_groupable: bool,
    pub filter: Option<OptionsFilter>,
    /// Hands the host's re-render trigger to the attribute.
    pub external_data: Option<Box<dyn Fn(RerenderCallback)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
    String,
    Boolean,
}

pub struct ProfileFeature {
    pub id: String,
    pub kind: FeatureType,
    pub icon: String,
    pub label: String,
    pub description: String,
    pub visible: Box<dyn Fn() -> bool>,
}

pub struct ProfileAction {
    pub group: String,
    pub position: i32,
    pub icon: String,
    pub title: String,
    pub handler: Box<dyn Fn(&[String])>,
}

/// Everything registered by the extensions, owned by the host.
#[derive(Default)]
pub struct Registry {
    pub features: Vec<ProfileFeature>,
    pub mod_attributes: Vec<TableAttribute<ModEntry>>,
    pub actions: Vec<ProfileAction>,
}

impl Registry {
    pub fn actions_in(&self, group: &str) -> Vec<&ProfileAction> {
        let mut actions: Vec<&ProfileAction> = self
            .actions
            .iter()
            .filter(|action| action.group == group)
            .collect();
        actions.sort_by_key(|action| action.position);
        actions
    }

    pub fn action_by_title(&self, group: &str, title: &str) -> Option<&ProfileAction> {
        self.actions
            .iter()
            .find(|action| action.group == group && action.title == title)
    }

    pub fn mod_attribute(&self, id: &str) -> Option<&TableAttribute<ModEntry>> {
        self.mod_attributes.iter().find(|attribute| attribute.id == id)
    }

    /// Table columns in display order.
    pub fn mod_columns(&self) -> Vec<&TableAttribute<ModEntry>> {
        let mut columns: Vec<&TableAttribute<ModEntry>> = self
            .mod_attributes
            .iter()
            .filter(|attribute| attribute.placement != Placement::Detail)
            .collect();
        columns.sort_by_key(|attribute| attribute.position);
        columns
    }

    pub fn feature(&self, id: &str) -> Option<&ProfileFeature> {
        self.features.iter().find(|feature| feature.id == id)
    }
}

type OnceCallback = Box<dyn FnOnce(&ExtensionApi)>;

pub struct ExtensionContext {
    api: ExtensionApi,
    registry: Registry,
    once: Vec<OnceCallback>,
}

impl ExtensionContext {
    pub fn new(api: ExtensionApi) -> Self {
        Self {
            api,
            registry: Registry::default(),
            once: Vec::new(),
        }
    }

    pub fn api(&self) -> &ExtensionApi {
        &self.api
    }

    pub fn register_profile_feature(&mut self, feature: ProfileFeature) {
        self.registry.features.push(feature);
    }

    pub fn register_table_attribute(&mut self, table: &str, attribute: TableAttribute<ModEntry>) {
        if table != MODS_TABLE {
            log::warn!("Ignoring attribute '{}' for unknown table '{table}'", attribute.id);
            return;
        }
        self.registry.mod_attributes.push(attribute);
    }

    pub fn register_action(&mut self, action: ProfileAction) {
        self.registry.actions.push(action);
    }

    /// Deferred until every extension has been initialized.
    pub fn once<F>(&mut self, callback: F)
    where
        F: FnOnce(&ExtensionApi) + 'static,
    {
        self.once.push(Box::new(callback));
    }

    /// Runs the deferred callbacks and hands over the registrations.
    pub fn finish(self) -> Registry {
        let ExtensionContext {
            api,
            registry,
            once,
        } = self;
        for callback in once {
            callback(&api);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn request() -> DialogRequest {
        DialogRequest {
            kind: DialogType::Question,
            title: "Pick".to_string(),
            text: String::new(),
            choices: vec![
                DialogChoice {
                    id: "a".to_string(),
                    text: "A".to_string(),
                    value: false,
                },
                DialogChoice {
                    id: "b".to_string(),
                    text: "B".to_string(),
                    value: true,
                },
            ],
            actions: vec![DialogAction::new("Cancel"), DialogAction::new("Continue")],
        }
    }

    fn capture() -> (Rc<RefCell<Vec<DialogResult>>>, DialogCallback) {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        (results, Box::new(move |result| sink.borrow_mut().push(result)))
    }

    #[test]
    fn modal_starts_on_preselected_choice_and_primary_action() {
        let dialogs = ModalDialogs::default();
        let (results, callback) = capture();
        dialogs.show_dialog(request(), callback);

        let view = dialogs.view().expect("dialog open");
        assert_eq!(view.selected, Some(1));
        assert_eq!(view.cursor, 1);
        assert_eq!(view.action, 1);

        dialogs.confirm();
        assert!(!dialogs.is_open());
        let results = results.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, "Continue");
        assert_eq!(results[0].input.get("b"), Some(&true));
        assert_eq!(results[0].input.get("a"), Some(&false));
    }

    #[test]
    fn modal_selection_and_cancel() {
        let dialogs = ModalDialogs::default();
        let (results, callback) = capture();
        dialogs.show_dialog(request(), callback);
        dialogs.move_cursor(-5);
        dialogs.select_cursor();
        assert!(!dialogs.select_choice("zzz"));
        dialogs.cancel();

        let results = results.borrow();
        assert_eq!(results[0].action, "Cancel");
        assert_eq!(results[0].input.get("a"), Some(&true));
    }

    #[test]
    fn second_dialog_is_rejected_while_one_is_open() {
        let dialogs = ModalDialogs::default();
        let (first, callback) = capture();
        dialogs.show_dialog(request(), callback);
        let (second, callback) = capture();
        dialogs.show_dialog(request(), callback);

        dialogs.resolve("Continue");
        dialogs.resolve("Continue");
        assert_eq!(first.borrow().len(), 1);
        assert!(second.borrow().is_empty());
    }

    #[test]
    fn action_cycle_wraps() {
        let dialogs = ModalDialogs::default();
        let (_, callback) = capture();
        dialogs.show_dialog(request(), callback);
        dialogs.cycle_action(1);
        assert_eq!(dialogs.view().map(|view| view.action), Some(0));
        dialogs.cycle_action(-1);
        assert_eq!(dialogs.view().map(|view| view.action), Some(1));
    }

    #[test]
    fn options_filter_passes_everything_without_selection() {
        let filter = OptionsFilter::new(&[("Enabled", "Enabled")], true, false);
        assert!(filter.matches(&[], "Disabled"));
        assert!(filter.matches(&["Enabled".to_string()], "Enabled"));
        assert!(!filter.matches(&["Enabled".to_string()], "Disabled"));
    }

    #[test]
    fn once_callbacks_run_on_finish() {
        let (events, _rx) = mpsc::channel();
        let api = ExtensionApi {
            store: Store::new(AppState::default()),
            events,
            dialogs: Rc::new(ModalDialogs::default()),
        };
        let ran = Rc::new(Cell::new(false));
        let mut context = ExtensionContext::new(api);
        {
            let ran = ran.clone();
            context.once(move |_| ran.set(true));
        }
        assert!(!ran.get());
        let registry = context.finish();
        assert!(ran.get());
        assert!(registry.actions.is_empty());
    }
}
