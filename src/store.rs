use crate::library::{
    GameMods, InstallState, Library, ModEntry, Profile, ProfileMod, Profiles,
};
use serde_json::Value;
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
    rc::Rc,
    sync::Arc,
};

/// Immutable snapshot of the host state. Every committed action produces a
/// new snapshot with a higher `version`; untouched maps keep their `Arc`
/// identity so listeners can compare them by pointer.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub version: u64,
    pub active_profile: Option<String>,
    pub profiles: Arc<Profiles>,
    pub mods: Arc<BTreeMap<String, Arc<GameMods>>>,
}

impl AppState {
    pub fn from_library(library: Library) -> Self {
        Self {
            version: 0,
            active_profile: library.active_profile,
            profiles: Arc::new(library.profiles),
            mods: Arc::new(library.mods),
        }
    }

    pub fn to_library(&self) -> Library {
        Library {
            active_profile: self.active_profile.clone(),
            profiles: (*self.profiles).clone(),
            mods: (*self.mods).clone(),
        }
    }

    pub fn active_profile(&self) -> Option<&Arc<Profile>> {
        self.active_profile
            .as_deref()
            .and_then(|id| self.profile_by_id(id))
    }

    pub fn profile_by_id(&self, id: &str) -> Option<&Arc<Profile>> {
        self.profiles.get(id)
    }

    pub fn game_profiles<'a>(&'a self, game_id: &'a str) -> impl Iterator<Item = &'a Arc<Profile>> {
        self.profiles
            .values()
            .filter(move |profile| profile.game_id == game_id)
    }

    pub fn game_mods(&self, game_id: &str) -> Vec<&ModEntry> {
        self.mods
            .get(game_id)
            .map(|mods| mods.values().collect())
            .unwrap_or_default()
    }

    pub fn find_mod(&self, game_id: &str, mod_id: &str) -> Option<&ModEntry> {
        self.mods.get(game_id).and_then(|mods| mods.get(mod_id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetModEnabled {
        profile_id: String,
        mod_id: String,
        enabled: bool,
    },
    SetFeature {
        profile_id: String,
        feature: String,
        value: Option<Value>,
    },
    SetActiveProfile(Option<String>),
    SetModInstallState {
        game_id: String,
        mod_id: String,
        state: Option<InstallState>,
    },
    SetModAttribute {
        game_id: String,
        mod_id: String,
        key: String,
        value: Value,
    },
}

impl Action {
    pub fn set_mod_enabled(profile_id: &str, mod_id: &str, enabled: bool) -> Self {
        Action::SetModEnabled {
            profile_id: profile_id.to_string(),
            mod_id: mod_id.to_string(),
            enabled,
        }
    }

    pub fn set_feature(profile_id: &str, feature: &str, value: Option<Value>) -> Self {
        Action::SetFeature {
            profile_id: profile_id.to_string(),
            feature: feature.to_string(),
            value,
        }
    }
}

/// State subtrees a listener can scope itself to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtree {
    ActiveProfile,
    Profiles,
    Mods,
}

impl Subtree {
    fn changed(self, prev: &AppState, cur: &AppState) -> bool {
        match self {
            Subtree::ActiveProfile => prev.active_profile != cur.active_profile,
            Subtree::Profiles => !Arc::ptr_eq(&prev.profiles, &cur.profiles),
            Subtree::Mods => !Arc::ptr_eq(&prev.mods, &cur.mods),
        }
    }
}

type StateListener = Box<dyn FnMut(&AppState, &AppState)>;

struct Subscription {
    subtree: Subtree,
    listener: StateListener,
}

struct StoreInner {
    state: RefCell<Arc<AppState>>,
    subscriptions: RefCell<Vec<Subscription>>,
    queue: RefCell<VecDeque<Action>>,
    dispatching: Cell<bool>,
}

/// Single-threaded store handle. Clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    pub fn new(state: AppState) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(Arc::new(state)),
                subscriptions: RefCell::new(Vec::new()),
                queue: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
            }),
        }
    }

    pub fn from_library(library: Library) -> Self {
        Self::new(AppState::from_library(library))
    }

    pub fn state(&self) -> Arc<AppState> {
        self.inner.state.borrow().clone()
    }

    /// Listeners run after each commit that changed `subtree`, with the
    /// previous and current snapshots.
    pub fn on_state_change<F>(&self, subtree: Subtree, listener: F)
    where
        F: FnMut(&AppState, &AppState) + 'static,
    {
        self.inner.subscriptions.borrow_mut().push(Subscription {
            subtree,
            listener: Box::new(listener),
        });
    }

    /// Actions dispatched while another dispatch is notifying are queued and
    /// committed in order once it returns.
    pub fn dispatch(&self, action: Action) {
        self.inner.queue.borrow_mut().push_back(action);
        if self.inner.dispatching.get() {
            return;
        }

        self.inner.dispatching.set(true);
        loop {
            let Some(action) = self.inner.queue.borrow_mut().pop_front() else {
                break;
            };
            self.commit(action);
        }
        self.inner.dispatching.set(false);
    }

    fn commit(&self, action: Action) {
        let prev = self.state();
        let Some(mut next) = reduce(&prev, &action) else {
            log::debug!("Dropped action with no effect: {action:?}");
            return;
        };
        next.version = prev.version + 1;
        let cur = Arc::new(next);
        *self.inner.state.borrow_mut() = cur.clone();
        log::trace!("Committed state version {}", cur.version);
        self.notify(&prev, &cur);
    }

    fn notify(&self, prev: &AppState, cur: &AppState) {
        let mut subscriptions = std::mem::take(&mut *self.inner.subscriptions.borrow_mut());
        for subscription in subscriptions.iter_mut() {
            if subscription.subtree.changed(prev, cur) {
                (subscription.listener)(prev, cur);
            }
        }
        let mut slot = self.inner.subscriptions.borrow_mut();
        subscriptions.append(&mut slot);
        *slot = subscriptions;
    }
}

fn reduce(prev: &AppState, action: &Action) -> Option<AppState> {
    let mut next = prev.clone();
    match action {
        Action::SetModEnabled {
            profile_id,
            mod_id,
            enabled,
        } => {
            let profile = profile_mut(&mut next, profile_id)?;
            Arc::make_mut(&mut profile.mod_state).insert(
                mod_id.clone(),
                ProfileMod {
                    enabled: *enabled,
                    enabled_time: Some(now_timestamp()),
                },
            );
        }
        Action::SetFeature {
            profile_id,
            feature,
            value,
        } => {
            let profile = profile_mut(&mut next, profile_id)?;
            let features = Arc::make_mut(&mut profile.features);
            match value {
                Some(value) => {
                    features.insert(feature.clone(), value.clone());
                }
                None => {
                    features.remove(feature);
                }
            }
        }
        Action::SetActiveProfile(profile_id) => {
            if let Some(id) = profile_id {
                if !prev.profiles.contains_key(id) {
                    return None;
                }
            }
            next.active_profile = profile_id.clone();
        }
        Action::SetModInstallState {
            game_id,
            mod_id,
            state,
        } => {
            mod_mut(&mut next, game_id, mod_id)?.state = state.clone();
        }
        Action::SetModAttribute {
            game_id,
            mod_id,
            key,
            value,
        } => {
            mod_mut(&mut next, game_id, mod_id)?.attributes.insert(key.clone(), value.clone());
        }
    }
    Some(next)
}

fn profile_mut<'a>(state: &'a mut AppState, profile_id: &str) -> Option<&'a mut Profile> {
    if !state.profiles.contains_key(profile_id) {
        return None;
    }
    let profiles = Arc::make_mut(&mut state.profiles);
    profiles.get_mut(profile_id).map(Arc::make_mut)
}

fn mod_mut<'a>(state: &'a mut AppState, game_id: &str, mod_id: &str) -> Option<&'a mut ModEntry> {
    state.find_mod(game_id, mod_id)?;
    let games = Arc::make_mut(&mut state.mods);
    let mods = games.get_mut(game_id).map(Arc::make_mut)?;
    mods.get_mut(mod_id)
}

fn now_timestamp() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn library() -> Library {
        let mut profiles = Profiles::new();
        for (id, name) in [("p1", "Main"), ("p2", "Test"), ("p3", "Other")] {
            profiles.insert(id.to_string(), Arc::new(Profile::new(id, "skyrim", name)));
        }
        let mut mods = GameMods::new();
        mods.insert(
            "m1".to_string(),
            ModEntry::new("m1", "One", Some(InstallState::Installed)),
        );
        let mut games = BTreeMap::new();
        games.insert("skyrim".to_string(), Arc::new(mods));
        Library {
            active_profile: Some("p1".to_string()),
            profiles,
            mods: games,
        }
    }

    #[test]
    fn dispatch_bumps_version_and_shares_untouched_profiles() {
        let store = Store::from_library(library());
        let before = store.state();
        store.dispatch(Action::set_mod_enabled("p2", "m1", true));
        let after = store.state();

        assert_eq!(after.version, before.version + 1);
        assert!(after.profiles["p2"].is_mod_enabled("m1"));
        assert!(!Arc::ptr_eq(&before.profiles, &after.profiles));
        assert!(Arc::ptr_eq(&before.profiles["p1"], &after.profiles["p1"]));
        assert!(Arc::ptr_eq(
            &before.profiles["p2"].features,
            &after.profiles["p2"].features
        ));
        assert!(!Arc::ptr_eq(
            &before.profiles["p2"].mod_state,
            &after.profiles["p2"].mod_state
        ));
    }

    #[test]
    fn actions_on_unknown_targets_do_not_commit() {
        let store = Store::from_library(library());
        store.dispatch(Action::set_mod_enabled("missing", "m1", true));
        store.dispatch(Action::SetActiveProfile(Some("missing".to_string())));
        store.dispatch(Action::SetModInstallState {
            game_id: "skyrim".to_string(),
            mod_id: "missing".to_string(),
            state: None,
        });
        assert_eq!(store.state().version, 0);
    }

    #[test]
    fn set_feature_none_removes_the_key() {
        let store = Store::from_library(library());
        store.dispatch(Action::set_feature("p1", "reference_profile", Some(json!("p2"))));
        assert_eq!(
            store.state().profiles["p1"].feature_str("reference_profile"),
            Some("p2")
        );
        store.dispatch(Action::set_feature("p1", "reference_profile", None));
        assert!(!store.state().profiles["p1"].features.contains_key("reference_profile"));
    }

    #[test]
    fn listeners_are_scoped_to_their_subtree() {
        let store = Store::from_library(library());
        let profile_calls = Rc::new(Cell::new(0));
        let mod_calls = Rc::new(Cell::new(0));
        {
            let profile_calls = profile_calls.clone();
            store.on_state_change(Subtree::Profiles, move |_, _| {
                profile_calls.set(profile_calls.get() + 1)
            });
        }
        {
            let mod_calls = mod_calls.clone();
            store.on_state_change(Subtree::Mods, move |_, _| mod_calls.set(mod_calls.get() + 1));
        }

        store.dispatch(Action::set_mod_enabled("p1", "m1", true));
        store.dispatch(Action::SetModInstallState {
            game_id: "skyrim".to_string(),
            mod_id: "m1".to_string(),
            state: Some(InstallState::Downloaded),
        });
        store.dispatch(Action::SetActiveProfile(Some("p2".to_string())));

        assert_eq!(profile_calls.get(), 1);
        assert_eq!(mod_calls.get(), 1);
        assert_eq!(store.state().version, 3);
    }

    #[test]
    fn dispatch_from_listener_is_queued_after_notification() {
        let store = Store::from_library(library());
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let store_handle = store.clone();
            let seen = seen.clone();
            store.on_state_change(Subtree::Profiles, move |prev, cur| {
                seen.borrow_mut().push((prev.version, cur.version));
                if cur.version == 1 {
                    store_handle.dispatch(Action::set_mod_enabled("p3", "m1", true));
                    // Still inside the first notification: nothing committed yet.
                    assert_eq!(store_handle.state().version, 1);
                }
            });
        }

        store.dispatch(Action::set_mod_enabled("p2", "m1", true));
        assert_eq!(*seen.borrow(), vec![(0, 1), (1, 2)]);
        assert!(store.state().profiles["p3"].is_mod_enabled("m1"));
    }

    #[test]
    fn library_round_trips_through_state() {
        let store = Store::from_library(library());
        store.dispatch(Action::SetModAttribute {
            game_id: "skyrim".to_string(),
            mod_id: "m1".to_string(),
            key: "wasInstalled".to_string(),
            value: json!(true),
        });
        let library = store.state().to_library();
        assert_eq!(library.active_profile.as_deref(), Some("p1"));
        assert!(library.mods["skyrim"]["m1"].was_installed());
    }
}
