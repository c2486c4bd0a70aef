use std::cmp::Ordering;
use std::fmt;

use crate::location::ProximityLocation;

/// One comparable component of a candidate's proximity score.
pub type Weight = i64;

/// A pluggable scoring strategy.
///
/// Weighers are registered in order of significance; each contributes one
/// [`Weight`] and the aggregate score compares lexicographically, so the
/// first registered weigher dominates and later ones only break its ties.
pub trait Weigher<E> {
    fn weigh(&self, element: &E, location: &ProximityLocation<E>) -> Weight;
}

impl<E, F> Weigher<E> for F
where
    F: Fn(&E, &ProximityLocation<E>) -> Weight,
{
    fn weigh(&self, element: &E, location: &ProximityLocation<E>) -> Weight {
        self(element, location)
    }
}

struct RegisteredWeigher<E> {
    name: &'static str,
    factor: Weight,
    weigher: Box<dyn Weigher<E>>,
}

/// Ordered, host-populated registry of weighers for one candidate kind.
///
/// Hosts build a registry at startup and pass it to each comparator
/// explicitly; there is no global registration.
pub struct WeigherRegistry<E> {
    entries: Vec<RegisteredWeigher<E>>,
}

impl<E> WeigherRegistry<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a weigher with factor 1.
    pub fn register(&mut self, name: &'static str, weigher: impl Weigher<E> + 'static) {
        self.register_weighted(name, 1, weigher);
    }

    /// Appends a weigher whose contribution is multiplied by `factor`.
    pub fn register_weighted(
        &mut self,
        name: &'static str,
        factor: Weight,
        weigher: impl Weigher<E> + 'static,
    ) {
        self.entries.push(RegisteredWeigher {
            name,
            factor,
            weigher: Box::new(weigher),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Computes the aggregate score for `element` at `location`.
    pub fn score(&self, element: &E, location: &ProximityLocation<E>) -> ProximityScore {
        let weights = self
            .entries
            .iter()
            .map(|entry| {
                entry
                    .weigher
                    .weigh(element, location)
                    .saturating_mul(entry.factor)
            })
            .collect();
        ProximityScore { weights }
    }
}

impl<E> Default for WeigherRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for WeigherRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.name, e.factor)))
            .finish()
    }
}

/// Aggregate proximity score: one weight per registered weigher, compared
/// lexicographically in registration order. Higher scores mean closer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProximityScore {
    weights: Vec<Weight>,
}

impl ProximityScore {
    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }
}

impl Ord for ProximityScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weights.cmp(&other.weights)
    }
}

impl PartialOrd for ProximityScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Computes the raw proximity score for `element` at `location` without
/// constructing a comparator.
pub fn proximity_score<E>(
    element: &E,
    location: &ProximityLocation<E>,
    weighers: &WeigherRegistry<E>,
) -> ProximityScore {
    weighers.score(element, location)
}
