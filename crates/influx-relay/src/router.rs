// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination routing.
//!
//! Built points arrive in record order, each tagged with its destination
//! (target plus retention policy). The router coalesces contiguous runs of
//! points sharing a destination into flush groups. It never reorders:
//! `a a b a` produces three groups, not two.

use crate::influx::Point;
use crate::precision::TimePrecision;
use crate::target::Target;
use std::fmt;
use std::sync::Arc;

/// Where a point is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Connection target.
    pub target: Arc<Target>,
    /// Retention policy, `None` for the database default.
    pub retention_policy: Option<String>,
}

impl Destination {
    /// Create a destination.
    pub fn new(target: Arc<Target>, retention_policy: Option<String>) -> Self {
        Self {
            target,
            retention_policy,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.retention_policy {
            Some(rp) => write!(f, "{} (rp={})", self.target, rp),
            None => write!(f, "{}", self.target),
        }
    }
}

/// A point together with its destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPoint {
    pub point: Point,
    pub destination: Destination,
}

/// An ordered batch of points for one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushGroup {
    /// Destination shared by every point.
    pub destination: Destination,
    /// Per-write precision override. `None` defers to the writer's own
    /// precision, which is fixed when the writer is created.
    pub precision: Option<TimePrecision>,
    /// Points in arrival order.
    pub points: Vec<Point>,
}

impl FlushGroup {
    /// Start a group with its first point.
    pub fn new(destination: Destination, point: Point) -> Self {
        Self {
            destination,
            precision: None,
            points: vec![point],
        }
    }

    /// Connection target.
    pub fn target(&self) -> &Target {
        &self.destination.target
    }

    /// Retention policy.
    pub fn retention_policy(&self) -> Option<&str> {
        self.destination.retention_policy.as_deref()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the group holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Contiguous-run coalescer.
///
/// Holds the group currently being filled; a point with a different
/// destination closes it.
#[derive(Debug, Default)]
pub struct RetentionRouter {
    current: Option<FlushGroup>,
}

impl RetentionRouter {
    /// Create a router with no open group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point.
    ///
    /// Returns `Some(group)` when the point's destination differs from the
    /// open group's, or `None` if the point joined the open group.
    pub fn push(&mut self, routed: RoutedPoint) -> Option<FlushGroup> {
        let RoutedPoint { point, destination } = routed;
        match self.current.as_mut() {
            Some(group) if group.destination == destination => {
                group.points.push(point);
                None
            }
            _ => self
                .current
                .replace(FlushGroup::new(destination, point))
                .filter(|group| !group.is_empty()),
        }
    }

    /// Close the open group, if any.
    pub fn finish(&mut self) -> Option<FlushGroup> {
        self.current.take().filter(|group| !group.is_empty())
    }

    /// Number of points in the open group.
    pub fn pending(&self) -> usize {
        self.current.as_ref().map_or(0, FlushGroup::len)
    }
}

/// Coalesce a whole batch of routed points.
pub fn route<I>(points: I) -> Vec<FlushGroup>
where
    I: IntoIterator<Item = RoutedPoint>,
{
    let mut router = RetentionRouter::new();
    let mut groups: Vec<FlushGroup> = points
        .into_iter()
        .filter_map(|point| router.push(point))
        .collect();
    groups.extend(router.finish());
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(database: &str) -> Arc<Target> {
        Arc::new(Target {
            host: "localhost".into(),
            port: 8086,
            database: database.into(),
            user: "root".into(),
            password: "root".into(),
            use_ssl: false,
        })
    }

    fn routed(ts: i64, db: &str, rp: Option<&str>) -> RoutedPoint {
        RoutedPoint {
            point: Point::new("m", ts).value("v", ts),
            destination: Destination::new(target(db), rp.map(str::to_string)),
        }
    }

    fn timestamps(group: &FlushGroup) -> Vec<i64> {
        group.points.iter().map(|p| p.timestamp).collect()
    }

    #[test]
    fn test_router_returns_none_while_destination_unchanged() {
        let mut router = RetentionRouter::new();
        assert!(router.push(routed(1, "db", None)).is_none());
        assert!(router.push(routed(2, "db", None)).is_none());
        assert_eq!(router.pending(), 2);

        let group = router.finish().expect("final group");
        assert_eq!(timestamps(&group), vec![1, 2]);
        assert_eq!(group.retention_policy(), None);
        assert_eq!(group.precision, None);
        assert!(router.finish().is_none());
    }

    #[test]
    fn test_router_emits_on_key_change() {
        let mut router = RetentionRouter::new();
        assert!(router.push(routed(1, "db", Some("1d"))).is_none());
        assert!(router.push(routed(2, "db", Some("1d"))).is_none());

        let group = router.push(routed(3, "db", Some("1m"))).expect("closed group");
        assert_eq!(timestamps(&group), vec![1, 2]);
        assert_eq!(group.retention_policy(), Some("1d"));
        assert_eq!(router.pending(), 1);
    }

    #[test]
    fn test_route_separated_keys_never_coalesce() {
        let groups = route(vec![
            routed(1, "db", Some("1d")),
            routed(2, "db", Some("1d")),
            routed(3, "db", Some("1m")),
            routed(4, "db", Some("1d")),
        ]);
        assert_eq!(groups.len(), 3);
        assert_eq!(timestamps(&groups[0]), vec![1, 2]);
        assert_eq!(timestamps(&groups[1]), vec![3]);
        assert_eq!(timestamps(&groups[2]), vec![4]);
    }

    #[test]
    fn test_route_target_is_part_of_key() {
        let groups = route(vec![
            routed(1, "a", None),
            routed(2, "b", None),
            routed(3, "b", None),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].target().database, "a");
        assert_eq!(groups[1].target().database, "b");
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn test_route_preserves_order() {
        let input: Vec<RoutedPoint> = (0..20)
            .map(|i| routed(i, "db", if i % 3 == 0 { Some("x") } else { None }))
            .collect();
        let groups = route(input);
        let flattened: Vec<i64> = groups.iter().flat_map(timestamps).collect();
        assert_eq!(flattened, (0..20).collect::<Vec<_>>());
        for pair in groups.windows(2) {
            assert_ne!(pair[0].destination, pair[1].destination);
        }
    }

    #[test]
    fn test_route_empty() {
        assert!(route(Vec::new()).is_empty());
    }
}
