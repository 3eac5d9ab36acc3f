//! State keying.
//!
//! Graph search, MDP compilation and every visited-set in this crate need a
//! stable, hashable identity for caller-defined states. [`StateKey`] lets the
//! state type provide that identity directly, so membership checks never
//! allocate. For plain data (integers, tuples, vectors) the state is its own
//! key; richer states can project onto a smaller canonical key, e.g. ignoring
//! bookkeeping fields that do not affect the search.
//!
//! [`KeyTable`] interns keys into dense `usize` ids for arena-style storage.

use std::collections::HashMap;
use std::hash::Hash;

/// Canonicalizes a state to a hashable key.
///
/// Two states with equal keys are treated as the same state by every
/// algorithm in this crate.
///
/// # Examples
///
/// ```
/// use u_plan::keying::StateKey;
///
/// #[derive(Clone)]
/// struct Fixture {
///     slot: (i32, i32),
///     label: String, // cosmetic, not part of the identity
/// }
///
/// impl StateKey for Fixture {
///     type Key = (i32, i32);
///     fn state_key(&self) -> (i32, i32) {
///         self.slot
///     }
/// }
///
/// let a = Fixture { slot: (1, 2), label: "a".into() };
/// let b = Fixture { slot: (1, 2), label: "b".into() };
/// assert_eq!(a.state_key(), b.state_key());
/// ```
pub trait StateKey {
    /// The canonical key type.
    type Key: Eq + Hash + Clone;

    /// Returns the canonical key of this state.
    fn state_key(&self) -> Self::Key;
}

macro_rules! identity_key {
    ($($t:ty),* $(,)?) => {
        $(
            impl StateKey for $t {
                type Key = $t;
                fn state_key(&self) -> $t {
                    self.clone()
                }
            }
        )*
    };
}

identity_key!(
    (), u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool, char, String,
    &'static str,
);

impl<A: StateKey, B: StateKey> StateKey for (A, B) {
    type Key = (A::Key, B::Key);
    fn state_key(&self) -> Self::Key {
        (self.0.state_key(), self.1.state_key())
    }
}

impl<A: StateKey, B: StateKey, C: StateKey> StateKey for (A, B, C) {
    type Key = (A::Key, B::Key, C::Key);
    fn state_key(&self) -> Self::Key {
        (self.0.state_key(), self.1.state_key(), self.2.state_key())
    }
}

impl<T: StateKey> StateKey for Vec<T> {
    type Key = Vec<T::Key>;
    fn state_key(&self) -> Self::Key {
        self.iter().map(StateKey::state_key).collect()
    }
}

impl<T: StateKey, const N: usize> StateKey for [T; N] {
    type Key = Vec<T::Key>;
    fn state_key(&self) -> Self::Key {
        self.iter().map(StateKey::state_key).collect()
    }
}

impl<T: StateKey> StateKey for Option<T> {
    type Key = Option<T::Key>;
    fn state_key(&self) -> Self::Key {
        self.as_ref().map(StateKey::state_key)
    }
}

/// Interns keys into dense, insertion-ordered ids.
#[derive(Debug, Clone)]
pub struct KeyTable<K: Eq + Hash + Clone> {
    ids: HashMap<K, usize>,
    keys: Vec<K>,
}

impl<K: Eq + Hash + Clone> KeyTable<K> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            keys: Vec::new(),
        }
    }

    /// Returns the id of `key`, inserting it if unseen.
    ///
    /// The boolean is `true` when the key was newly inserted.
    pub fn intern(&mut self, key: K) -> (usize, bool) {
        if let Some(&id) = self.ids.get(&key) {
            return (id, false);
        }
        let id = self.keys.len();
        self.keys.push(key.clone());
        self.ids.insert(key, id);
        (id, true)
    }

    /// Looks up the id of a key without inserting.
    pub fn get(&self, key: &K) -> Option<usize> {
        self.ids.get(key).copied()
    }

    /// Returns the key for an id.
    pub fn key(&self, id: usize) -> Option<&K> {
        self.keys.get(id)
    }

    /// Whether `key` has been interned.
    pub fn contains(&self, key: &K) -> bool {
        self.ids.contains_key(key)
    }

    /// Number of interned keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyTable<K> {
    fn default() -> Self {
        Self::new()
    }
}
