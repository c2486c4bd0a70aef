use sift_stats::StatisticsInfo;

use crate::location::ProximityLocation;

/// Converts a candidate into the [`StatisticsInfo`] fact used to look up its
/// usage history, or declines.
///
/// One serializer exists per candidate kind; declining (`None`) means "no
/// recency signal for this element" and the comparator falls back to
/// proximity-only ordering for the affected pair.
pub trait StatisticsSerializer<E> {
    fn serialize(&self, element: &E, location: &ProximityLocation<E>) -> Option<StatisticsInfo>;
}

impl<E, F> StatisticsSerializer<E> for F
where
    F: Fn(&E, &ProximityLocation<E>) -> Option<StatisticsInfo>,
{
    fn serialize(&self, element: &E, location: &ProximityLocation<E>) -> Option<StatisticsInfo> {
        self(element, location)
    }
}
