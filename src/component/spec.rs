use crate::component::Id;

/// A component set: the strictly ascending list of component ids that
/// describes an entity or an archetype.
///
/// The sorted list is the single canonical layout. Archetypes derive their
/// content hash from it, columns follow its order, and the set operations
/// below rely on it for linear-time merges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Spec {
    ids: Vec<Id>,
}

impl Spec {
    /// The empty component set.
    pub const EMPTY: Self = Spec { ids: Vec::new() };

    /// Construct a spec from the given component ids. Sorts and dedups.
    #[inline]
    pub fn new(ids: impl Into<Vec<Id>>) -> Self {
        let mut ids = ids.into();
        ids.sort();
        ids.dedup();
        ids.shrink_to_fit();
        Self { ids }
    }

    /// Get the component ids in ascending order.
    #[inline]
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Get the number of component ids in this spec.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if this spec is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Determine if this spec contains the given component id.
    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Get the position of a component id within the spec, if present.
    ///
    /// This is the column index of the component inside an archetype built
    /// from this spec.
    #[inline]
    pub fn position(&self, id: Id) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Determine if this spec contains every id in `other`.
    ///
    /// Linear two-pointer merge over the two sorted lists; halts as soon as
    /// a required id cannot appear anymore. The empty spec is contained in
    /// everything.
    pub fn contains_all(&self, other: &Spec) -> bool {
        let mut i = 0;
        for needed in &other.ids {
            loop {
                if i == self.ids.len() {
                    return false;
                }
                match self.ids[i].cmp(needed) {
                    std::cmp::Ordering::Less => i += 1,
                    std::cmp::Ordering::Equal => {
                        i += 1;
                        break;
                    }
                    std::cmp::Ordering::Greater => return false,
                }
            }
        }
        true
    }

    /// Determine if this spec contains no id from `other`.
    ///
    /// Linear two-pointer merge; halts on the first shared id. Disjointness
    /// with the empty spec holds trivially.
    pub fn contains_none(&self, other: &Spec) -> bool {
        let mut i = 0;
        let mut j = 0;
        while i < self.ids.len() && j < other.ids.len() {
            match self.ids[i].cmp(&other.ids[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Equal => return false,
                std::cmp::Ordering::Greater => j += 1,
            }
        }
        true
    }

    /// Create the spec with `id` inserted at its sorted position.
    ///
    /// Returns a clone of self when the id is already present.
    pub fn with(&self, id: Id) -> Self {
        match self.ids.binary_search(&id) {
            Ok(_) => self.clone(),
            Err(at) => {
                let mut ids = self.ids.clone();
                ids.insert(at, id);
                Self { ids }
            }
        }
    }

    /// Create the spec with `id` removed.
    ///
    /// Returns a clone of self when the id is absent.
    pub fn without(&self, id: Id) -> Self {
        match self.ids.binary_search(&id) {
            Ok(at) => {
                let mut ids = self.ids.clone();
                ids.remove(at);
                Self { ids }
            }
            Err(_) => self.clone(),
        }
    }
}

impl From<Vec<Id>> for Spec {
    #[inline]
    fn from(value: Vec<Id>) -> Self {
        Spec::new(value)
    }
}
