use crate::{
    host::RerenderCallback,
    library::Profiles,
    reference::ReferenceResolver,
    store::AppState,
};
use std::{cell::RefCell, rc::Rc, sync::Arc};

/// Decides, for each change of the profiles subtree, whether the reference
/// status column has to be drawn again.
pub struct ChangeNotifier {
    resolver: Rc<ReferenceResolver>,
    callback: RefCell<Option<RerenderCallback>>,
}

impl ChangeNotifier {
    pub fn new(resolver: Rc<ReferenceResolver>) -> Self {
        Self {
            resolver,
            callback: RefCell::new(None),
        }
    }

    pub fn set_callback(&self, callback: RerenderCallback) {
        *self.callback.borrow_mut() = Some(callback);
    }

    pub fn profiles_changed(&self, state: &AppState, prev: &Profiles, cur: &Profiles) {
        if !self.should_rerender(state, prev, cur) {
            return;
        }
        let callback = self.callback.borrow().clone();
        match callback {
            Some(callback) => callback(),
            None => log::debug!("Reference status changed before the column was shown"),
        }
    }

    /// True when the reference profile's mod state or the active profile's
    /// features are a different map in `cur` than in `prev`.
    pub fn should_rerender(&self, state: &AppState, prev: &Profiles, cur: &Profiles) -> bool {
        if let Some(reference) = self.resolver.resolve(state) {
            let before = prev.get(&reference.id).map(|profile| &profile.mod_state);
            let after = cur.get(&reference.id).map(|profile| &profile.mod_state);
            if !same_arc(before, after) {
                return true;
            }
        }
        if let Some(active) = state.active_profile() {
            let before = prev.get(&active.id).map(|profile| &profile.features);
            let after = cur.get(&active.id).map(|profile| &profile.features);
            if !same_arc(before, after) {
                return true;
            }
        }
        false
    }
}

fn same_arc<T>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
