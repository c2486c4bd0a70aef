use std::fmt;

/// One (context, value) usage fact.
///
/// A fact is either *simple* (one context/value pair) or *composite*: a
/// conjunction of simple sub-facts that are scored together. Composite facts
/// aggregate their conjuncts' counters: use-count by `max` ("any sub-fact
/// frequently chosen"), recency by `min` (most recent wins).
///
/// Facts are transient: callers build them at ranking time and only the
/// derived counters are ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatisticsInfo {
    context: String,
    value: String,
    conjuncts: Vec<StatisticsInfo>,
}

impl StatisticsInfo {
    pub fn new(context: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            value: value.into(),
            conjuncts: Vec::new(),
        }
    }

    /// Builds a composite fact from simple sub-facts.
    ///
    /// The first conjunct acts as the representative (context, value) pair;
    /// nested composites are flattened into their own conjuncts.
    ///
    /// # Panics
    ///
    /// Panics if `conjuncts` is empty.
    pub fn composite(conjuncts: Vec<StatisticsInfo>) -> Self {
        assert!(
            !conjuncts.is_empty(),
            "composite StatisticsInfo requires at least one conjunct"
        );
        let flattened: Vec<StatisticsInfo> = conjuncts
            .into_iter()
            .flat_map(|info| {
                if info.conjuncts.is_empty() {
                    vec![info]
                } else {
                    info.conjuncts
                }
            })
            .collect();
        let first = &flattened[0];
        Self {
            context: first.context.clone(),
            value: first.value.clone(),
            conjuncts: flattened,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The simple sub-facts this fact scores over.
    ///
    /// A simple fact is its own single conjunct.
    pub fn conjuncts(&self) -> &[StatisticsInfo] {
        if self.conjuncts.is_empty() {
            std::slice::from_ref(self)
        } else {
            &self.conjuncts
        }
    }
}

impl fmt::Display for StatisticsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.context, self.value)
    }
}
