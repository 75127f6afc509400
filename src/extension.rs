//! Registration of the reference profile feature with the host: the profile
//! feature, the "Reference Status" column, the profile action and the state
//! listener that keeps the column fresh.

use crate::{
    enablement::{self, EditValue},
    host::{
        EditChoice, EditSpec, ExtensionApi, ExtensionContext, FeatureType, OptionsFilter,
        Placement, ProfileAction, ProfileFeature, TableAttribute, MODS_TABLE, PROFILE_ACTIONS,
    },
    library::ModEntry,
    notifier::ChangeNotifier,
    reference::{self, ReferenceResolver, Status, REFERENCE_FEATURE},
    selector,
    store::Subtree,
};
use std::rc::Rc;

pub const STATUS_ATTRIBUTE_ID: &str = "ref-profile-enabled";
pub const SET_REFERENCE_TITLE: &str = "Set Reference Profile";

pub fn init(context: &mut ExtensionContext) -> bool {
    let resolver = Rc::new(ReferenceResolver::new());
    let notifier = Rc::new(ChangeNotifier::new(resolver.clone()));

    context.register_profile_feature(reference_feature());
    let attribute = make_status_attribute(context.api(), resolver, notifier.clone());
    context.register_table_attribute(MODS_TABLE, attribute);
    let action = make_select_reference_action(context.api());
    context.register_action(action);

    context.once(move |api| {
        api.store
            .on_state_change(Subtree::Profiles, move |prev, cur| {
                notifier.profiles_changed(cur, &prev.profiles, &cur.profiles)
            });
    });

    true
}

fn reference_feature() -> ProfileFeature {
    ProfileFeature {
        id: REFERENCE_FEATURE.to_string(),
        kind: FeatureType::String,
        icon: "reference".to_string(),
        label: "Reference".to_string(),
        description: "Reference Profile".to_string(),
        visible: Box::new(|| true),
    }
}

pub fn make_status_attribute(
    api: &ExtensionApi,
    resolver: Rc<ReferenceResolver>,
    notifier: Rc<ChangeNotifier>,
) -> TableAttribute<ModEntry> {
    let calc: Box<dyn Fn(&ModEntry) -> String> = {
        let api = api.clone();
        let resolver = resolver.clone();
        Box::new(move |entry| reference::mod_status(&resolver, &api.state(), entry).to_string())
    };
    let on_change_value: Box<dyn Fn(&[&ModEntry], Option<&str>)> = {
        let api = api.clone();
        Box::new(move |mods, value| {
            enablement::change_enabled(&api, &resolver, mods, EditValue::from(value))
        })
    };

    TableAttribute {
        id: STATUS_ATTRIBUTE_ID.to_string(),
        name: "Reference Status".to_string(),
        description: "Is mod enabled in reference profile".to_string(),
        icon: "check-o".to_string(),
        position: 25,
        placement: Placement::Table,
        is_toggleable: true,
        calc,
        edit: Some(EditSpec {
            inline: true,
            choices: Box::new(status_choices),
            on_change_value,
        }),
        no_shrink: true,
        is_sortable: false,
        is_groupable: true,
        filter: Some(OptionsFilter::new(
            &[
                (Status::Enabled.label(), "Enabled"),
                (Status::Disabled.label(), "Disabled"),
                (Status::Uninstalled.label(), "Uninstalled"),
            ],
            true,
            false,
        )),
        external_data: Some(Box::new(move |on_change| notifier.set_callback(on_change))),
    }
}

fn status_choices() -> Vec<EditChoice> {
    vec![
        EditChoice::new(enablement::ENABLED_VALUE, "Enabled", "toggle-enabled"),
        EditChoice::new("disabled", "Disabled", "toggle-disabled"),
        EditChoice::new("uninstalled", "Uninstalled", "toggle-uninstalled").disabled(),
        EditChoice::new("noprofile", "N/A", "not-available").disabled(),
    ]
}

fn make_select_reference_action(api: &ExtensionApi) -> ProfileAction {
    let api = api.clone();
    ProfileAction {
        group: PROFILE_ACTIONS.to_string(),
        position: 150,
        icon: "deploy".to_string(),
        title: SET_REFERENCE_TITLE.to_string(),
        handler: Box::new(move |profile_ids| selector::select_reference(&api, profile_ids)),
    }
}
