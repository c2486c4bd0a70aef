use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use sift_stats::UsageStatistics;

use crate::location::{ModuleResolver, ProximityLocation};
use crate::serializer::StatisticsSerializer;
use crate::weigher::{ProximityScore, WeigherRegistry};

/// Orders candidates by historical recency of use, falling back to a weighted
/// proximity score.
///
/// Built once per ranking call site and handed to a stable sort. Inputs are
/// `Option<&E>`: `None` models null or wrong-kind items and sorts after every
/// valid candidate.
///
/// Recency is consulted only when a context with a resolvable module is bound
/// and both elements serialize to a statistics fact; everything else degrades
/// to proximity-score-only ordering. Equal recency (including both-unknown)
/// always falls through to the proximity score rather than reporting a tie.
///
/// Proximity scores are computed lazily and cached for the comparator's
/// lifetime, so a candidate's score cannot change mid-sort. The ordering is
/// deliberately not consistent with logical equality; residual ties are left
/// to the caller's stable sort.
pub struct ProximityComparator<'a, E> {
    location: Option<ProximityLocation<E>>,
    weighers: &'a WeigherRegistry<E>,
    serializer: Option<&'a dyn StatisticsSerializer<E>>,
    statistics: Option<&'a dyn UsageStatistics>,
    scores: RefCell<HashMap<E, ProximityScore>>,
}

impl<'a, E: Clone + Eq + Hash> ProximityComparator<'a, E> {
    /// Proximity-only comparator. With `context == None` valid candidates all
    /// compare equal and only the "unknowns last" rule applies.
    pub fn new(
        context: Option<E>,
        resolver: &dyn ModuleResolver<E>,
        weighers: &'a WeigherRegistry<E>,
    ) -> Self {
        let location = context.map(|context| ProximityLocation::resolve(context, resolver));
        Self {
            location,
            weighers,
            serializer: None,
            statistics: None,
            scores: RefCell::new(HashMap::new()),
        }
    }

    /// Adds the usage-history signal: recency from `statistics`, keyed by the
    /// facts produced by `serializer`.
    pub fn with_statistics(
        mut self,
        serializer: &'a dyn StatisticsSerializer<E>,
        statistics: &'a dyn UsageStatistics,
    ) -> Self {
        self.serializer = Some(serializer);
        self.statistics = Some(statistics);
        self
    }

    pub fn location(&self) -> Option<&ProximityLocation<E>> {
        self.location.as_ref()
    }

    pub fn compare(&self, a: Option<&E>, b: Option<&E>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => self.compare_candidates(a, b),
        }
    }

    fn compare_candidates(&self, a: &E, b: &E) -> Ordering {
        if let Some(by_recency) = self.compare_by_recency(a, b) {
            return by_recency;
        }

        let Some(location) = &self.location else {
            return Ordering::Equal;
        };
        let score_a = self.score_of(a, location);
        let score_b = self.score_of(b, location);
        // Higher proximity sorts first.
        score_b.cmp(&score_a)
    }

    /// `Some(ordering)` only when the recency signal actually discriminates;
    /// equal recency (including both-unknown) must fall through to the finer
    /// grained proximity score.
    fn compare_by_recency(&self, a: &E, b: &E) -> Option<Ordering> {
        let location = self.location.as_ref()?;
        // No resolvable module: proximity-score-only ordering.
        location.module()?;
        let serializer = self.serializer?;
        let statistics = self.statistics?;

        let (info_a, info_b) = match (
            serializer.serialize(a, location),
            serializer.serialize(b, location),
        ) {
            (Some(info_a), Some(info_b)) => (info_a, info_b),
            _ => {
                tracing::trace!(
                    target: "sift.proximity",
                    "serializer declined a candidate; using proximity only"
                );
                return None;
            }
        };

        let recency_a = statistics.get_last_use_recency(&info_a);
        let recency_b = statistics.get_last_use_recency(&info_b);
        if recency_a == recency_b {
            return None;
        }
        // Lower rank = more recent = sorts first.
        Some(recency_a.cmp(&recency_b))
    }

    fn score_of(&self, element: &E, location: &ProximityLocation<E>) -> ProximityScore {
        if let Some(score) = self.scores.borrow().get(element) {
            return score.clone();
        }
        let score = self.weighers.score(element, location);
        self.scores
            .borrow_mut()
            .insert(element.clone(), score.clone());
        score
    }
}
