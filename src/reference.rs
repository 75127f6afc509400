use crate::{
    library::{InstallState, ModEntry, Profile, Profiles},
    store::AppState,
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    sync::Arc,
};

/// Profile feature holding the id of the reference profile.
pub const REFERENCE_FEATURE: &str = "reference_profile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    NeverInstalled,
    Uninstalled,
    Installing,
    Enabled,
    Disabled,
    NotAvailable,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::NeverInstalled => "Never Installed",
            Status::Uninstalled => "Uninstalled",
            Status::Installing => "Installing",
            Status::Enabled => "Enabled",
            Status::Disabled => "Disabled",
            Status::NotAvailable => "N/A",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct CachedReference {
    version: u64,
    profiles: Arc<Profiles>,
    active_profile: Option<String>,
    profile: Option<Arc<Profile>>,
}

impl CachedReference {
    // Holding `profiles` keeps its address from being reused by another snapshot.
    fn matches(&self, state: &AppState) -> bool {
        self.version == state.version
            && Arc::ptr_eq(&self.profiles, &state.profiles)
            && self.active_profile == state.active_profile
    }
}

/// Looks up the reference profile of the active profile. The last answer is
/// kept for the snapshot it was computed from, so a render pass over many
/// rows resolves once.
#[derive(Default)]
pub struct ReferenceResolver {
    slot: RefCell<Option<CachedReference>>,
    recomputations: Cell<u64>,
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, state: &AppState) -> Option<Arc<Profile>> {
        if let Some(cached) = self.slot.borrow().as_ref() {
            if cached.matches(state) {
                return cached.profile.clone();
            }
        }

        let profile = lookup_reference(state);
        self.recomputations.set(self.recomputations.get() + 1);
        *self.slot.borrow_mut() = Some(CachedReference {
            version: state.version,
            profiles: state.profiles.clone(),
            active_profile: state.active_profile.clone(),
            profile: profile.clone(),
        });
        profile
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations.get()
    }
}

fn lookup_reference(state: &AppState) -> Option<Arc<Profile>> {
    let active = state.active_profile()?;
    let reference_id = active.feature_str(REFERENCE_FEATURE)?;
    let reference = state.profile_by_id(reference_id);
    if reference.is_none() {
        log::debug!(
            "Reference profile '{reference_id}' of '{}' no longer exists",
            active.id
        );
    }
    reference.cloned()
}

/// Status of `entry` relative to the reference profile. Install state wins
/// over the reference lookup.
pub fn mod_status(resolver: &ReferenceResolver, state: &AppState, entry: &ModEntry) -> Status {
    match entry.state {
        Some(InstallState::Downloaded) => {
            return if entry.was_installed() {
                Status::Uninstalled
            } else {
                Status::NeverInstalled
            };
        }
        Some(InstallState::Installing) => return Status::Installing,
        _ => {}
    }

    let Some(reference) = resolver.resolve(state) else {
        return Status::NotAvailable;
    };
    if reference.is_mod_enabled(&entry.id) {
        Status::Enabled
    } else {
        Status::Disabled
    }
}
