use crate::{
    host::{DialogAction, DialogChoice, DialogRequest, DialogResult, DialogType, ExtensionApi},
    library::Profile,
    reference::REFERENCE_FEATURE,
    store::{Action, AppState},
};
use serde_json::Value;

/// Choice id that clears the reference.
pub const NONE_CHOICE: &str = "__none";
pub const CANCEL_LABEL: &str = "Cancel";
pub const CONTINUE_LABEL: &str = "Continue";

const DIALOG_TITLE: &str = "Select Reference Profile";
const DIALOG_TEXT: &str = "Please select another profile that should serve as a reference to compare against. \
Remember that you have to enable the \"Reference Status\" column on the mods table to see anything.";

/// Handler for the "Set Reference Profile" action. Asks the user to pick the
/// reference for the first selected profile and stores the answer on it.
pub fn select_reference(api: &ExtensionApi, base_profile_ids: &[String]) {
    let state = api.state();
    let Some(profile) = base_profile_ids
        .first()
        .and_then(|id| state.profile_by_id(id))
    else {
        log::debug!("Reference selection skipped: no base profile in {base_profile_ids:?}");
        return;
    };

    let request = reference_request(&state, profile);
    let choice_order: Vec<String> = request
        .choices
        .iter()
        .map(|choice| choice.id.clone())
        .collect();
    let profile_id = profile.id.clone();
    let handle = api.clone();
    api.dialogs.show_dialog(
        request,
        Box::new(move |result| apply_selection(&handle, &profile_id, &choice_order, result)),
    );
}

/// "None" first, then every other profile of the same game. The current
/// reference is pre-selected.
pub fn reference_request(state: &AppState, profile: &Profile) -> DialogRequest {
    let current = profile.feature_str(REFERENCE_FEATURE);
    let mut choices = vec![DialogChoice {
        id: NONE_CHOICE.to_string(),
        text: "None".to_string(),
        value: current.is_none(),
    }];
    choices.extend(
        state
            .game_profiles(&profile.game_id)
            .filter(|candidate| candidate.id != profile.id)
            .map(|candidate| DialogChoice {
                id: candidate.id.clone(),
                text: candidate.name.clone(),
                value: current == Some(candidate.id.as_str()),
            }),
    );

    DialogRequest {
        kind: DialogType::Question,
        title: DIALOG_TITLE.to_string(),
        text: DIALOG_TEXT.to_string(),
        choices,
        actions: vec![
            DialogAction::new(CANCEL_LABEL),
            DialogAction::new(CONTINUE_LABEL),
        ],
    }
}

fn apply_selection(
    api: &ExtensionApi,
    profile_id: &str,
    choice_order: &[String],
    result: DialogResult,
) {
    if result.action != CONTINUE_LABEL {
        log::debug!("Reference selection for '{profile_id}' cancelled");
        return;
    }
    let Some(pick) = choice_order
        .iter()
        .find(|id| result.input.get(id.as_str()).copied().unwrap_or(false))
    else {
        log::debug!("Reference selection for '{profile_id}' confirmed without a choice");
        return;
    };

    let value = if pick == NONE_CHOICE {
        log::info!("Clearing reference profile of '{profile_id}'");
        None
    } else {
        log::info!("Reference profile of '{profile_id}' set to '{pick}'");
        Some(Value::String(pick.clone()))
    };
    api.store.dispatch(Action::set_feature(profile_id, REFERENCE_FEATURE, value));
}
