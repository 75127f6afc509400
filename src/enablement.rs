use crate::{
    host::{ExtensionApi, HostEvent},
    library::{InstallState, ModEntry},
    reference::ReferenceResolver,
    store::Action,
};

pub const ENABLED_VALUE: &str = "enabled";

/// What an edit of the reference status column asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditValue<'a> {
    /// The toggle was clicked; no value was picked.
    Toggle,
    /// A value was picked from the choices.
    Explicit(&'a str),
}

impl<'a> From<Option<&'a str>> for EditValue<'a> {
    fn from(value: Option<&'a str>) -> Self {
        match value {
            Some(value) => EditValue::Explicit(value),
            None => EditValue::Toggle,
        }
    }
}

/// Applies one edit to every mod in order. Each mod is handled on its own
/// against the state current at that point; ineligible mods are skipped.
pub fn change_enabled(
    api: &ExtensionApi,
    resolver: &ReferenceResolver,
    mods: &[&ModEntry],
    value: EditValue<'_>,
) {
    for entry in mods {
        change_mod_enabled(api, resolver, entry, value);
    }
}

fn change_mod_enabled(
    api: &ExtensionApi,
    resolver: &ReferenceResolver,
    entry: &ModEntry,
    value: EditValue<'_>,
) {
    if matches!(entry.state, None | Some(InstallState::Installing)) {
        log::debug!("Skipping edit of '{}': install in progress", entry.id);
        return;
    }

    let state = api.state();
    let Some(reference) = resolver.resolve(&state) else {
        log::debug!("Skipping edit of '{}': no reference profile", entry.id);
        return;
    };

    match value {
        EditValue::Toggle if entry.state == Some(InstallState::Downloaded) => {
            log::info!("Requesting install of '{}'", entry.id);
            api.emit(HostEvent::StartInstallDownload {
                mod_id: entry.id.clone(),
            });
        }
        EditValue::Toggle => {
            let enabled = !reference.is_mod_enabled(&entry.id);
            set_enabled(api, &reference.id, &entry.id, enabled);
        }
        EditValue::Explicit(value) => {
            set_enabled(api, &reference.id, &entry.id, value == ENABLED_VALUE);
        }
    }
}

fn set_enabled(api: &ExtensionApi, profile_id: &str, mod_id: &str, enabled: bool) {
    log::info!(
        "{} '{mod_id}' in reference profile '{profile_id}'",
        if enabled { "Enabling" } else { "Disabling" }
    );
    api.store.dispatch(Action::set_mod_enabled(profile_id, mod_id, enabled));
}
