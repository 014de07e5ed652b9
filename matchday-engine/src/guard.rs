//! Stale-response suppression for selection-driven queries.
//!
//! Every query is tagged with a [`Generation`] token when issued. A response
//! is applied only if its token is still current; any newer selection
//! invalidates all outstanding tokens. Single writer, no locking.

/// Token identifying the selection a query was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation<K> {
    key: K,
    generation: u64,
}

impl<K> Generation<K> {
    /// Selection key in effect when the query was issued
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Monotonic generation number
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Tracks the latest selection and validates tokens against it.
///
/// Comparing generations rather than keys keeps A→B→A re-selection safe:
/// a response issued under the first A is stale once A is selected again.
#[derive(Debug, Clone)]
pub struct GenerationGuard<K> {
    current: Option<K>,
    generation: u64,
}

impl<K> Default for GenerationGuard<K> {
    fn default() -> Self {
        Self { current: None, generation: 0 }
    }
}

impl<K: Clone + PartialEq> GenerationGuard<K> {
    /// Guard with nothing selected
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `key`, invalidating every outstanding token.
    pub fn select(&mut self, key: K) -> Generation<K> {
        self.generation += 1;
        self.current = Some(key.clone());
        Generation { key, generation: self.generation }
    }

    /// Token for re-querying the current selection without invalidating it.
    pub fn token(&self) -> Option<Generation<K>> {
        self.current
            .as_ref()
            .map(|key| Generation { key: key.clone(), generation: self.generation })
    }

    /// Current selection, if any
    pub fn current(&self) -> Option<&K> {
        self.current.as_ref()
    }

    /// True iff no selection happened since `token` was issued.
    pub fn is_current(&self, token: &Generation<K>) -> bool {
        token.generation == self.generation && self.current.as_ref() == Some(&token.key)
    }

    /// Pass `value` through only if `token` is still current.
    pub fn accept<T>(&self, token: &Generation<K>, value: T) -> Option<T> {
        self.is_current(token).then_some(value)
    }
}

/// What the caller currently sees for its selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View<V> {
    /// Selection changed, result not loaded yet
    Unknown,
    /// Result for the current selection
    Loaded(V),
}

impl<V> Default for View<V> {
    fn default() -> Self {
        View::Unknown
    }
}

impl<V> View<V> {
    /// Loaded value, if any
    pub fn loaded(&self) -> Option<&V> {
        match self {
            View::Unknown => None,
            View::Loaded(v) => Some(v),
        }
    }
}

/// A guard paired with the visible state it protects.
#[derive(Debug, Clone)]
pub struct GuardedView<K, V> {
    guard: GenerationGuard<K>,
    view: View<V>,
}

impl<K, V> Default for GuardedView<K, V> {
    fn default() -> Self {
        Self { guard: GenerationGuard::default(), view: View::Unknown }
    }
}

impl<K: Clone + PartialEq, V> GuardedView<K, V> {
    /// Empty view
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `key` and reset the visible state to unknown.
    pub fn select(&mut self, key: K) -> Generation<K> {
        self.view = View::Unknown;
        self.guard.select(key)
    }

    /// Apply a response. Returns false if it was stale and discarded.
    pub fn apply(&mut self, token: &Generation<K>, value: V) -> bool {
        match self.guard.accept(token, value) {
            Some(value) => {
                self.view = View::Loaded(value);
                true
            },
            None => false,
        }
    }

    /// Current visible state
    pub fn view(&self) -> &View<V> {
        &self.view
    }

    /// Current selection
    pub fn selection(&self) -> Option<&K> {
        self.guard.current()
    }

    /// The underlying guard
    pub fn guard(&self) -> &GenerationGuard<K> {
        &self.guard
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_response_for_previous_selection_discarded() {
        let mut view: GuardedView<&str, Vec<u8>> = GuardedView::new();

        let a = view.select("venue-a");
        let b = view.select("venue-b");

        assert!(!view.apply(&a, vec![6, 7, 8]));
        assert_eq!(view.view(), &View::Unknown);

        assert!(view.apply(&b, vec![10, 11]));
        assert_eq!(view.view().loaded(), Some(&vec![10, 11]));
        assert_eq!(view.selection(), Some(&"venue-b"));
    }

    #[test]
    fn test_reselecting_same_key_invalidates_old_token() {
        let mut guard = GenerationGuard::new();

        let first_a = guard.select("a");
        let _b = guard.select("b");
        let second_a = guard.select("a");

        assert!(!guard.is_current(&first_a));
        assert!(guard.is_current(&second_a));
        assert!(second_a.generation() > first_a.generation());
    }

    #[test]
    fn test_select_resets_view_synchronously() {
        let mut view: GuardedView<u32, &str> = GuardedView::new();
        let t = view.select(1);
        assert!(view.apply(&t, "loaded"));

        view.select(2);
        assert_eq!(view.view(), &View::Unknown);
    }

    #[test]
    fn test_token_for_current_selection() {
        let mut guard: GenerationGuard<u32> = GenerationGuard::new();
        assert!(guard.token().is_none());

        let issued = guard.select(7);
        let refresh = guard.token().unwrap();
        assert_eq!(issued, refresh);
        assert_eq!(guard.accept(&refresh, "ok"), Some("ok"));
    }
}
