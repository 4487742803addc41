use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt::Display};

/// Label for a physical camera position known to the broker. The swivel
/// never interprets the label, it is passed through to the broker as is.
#[derive(Eq, PartialEq, Hash, Clone, Debug, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct WaypointId(String);

impl WaypointId {
    /// Create a waypoint from any string like label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Borrow the raw label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WaypointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WaypointId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for WaypointId {
    fn from(label: String) -> Self {
        Self(label)
    }
}

impl AsRef<str> for WaypointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets the snapshot map be queried with a plain `&str` from the web layer.
impl Borrow<str> for WaypointId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Ordered sequence of waypoints visited with wraparound. The cursor
/// always points at the *next* waypoint to move to.
#[derive(Debug, Clone)]
pub struct WaypointCycle {
    /// Waypoints in the order they are visited.
    waypoints: Vec<WaypointId>,
    /// Index of the next waypoint to move to.
    cursor: usize,
}

impl WaypointCycle {
    /// Create a cycle starting at the first waypoint. Returns `None`
    /// for an empty sequence as there would be nothing to move to.
    pub fn new(waypoints: Vec<WaypointId>) -> Option<Self> {
        if waypoints.is_empty() {
            None
        } else {
            Some(Self {
                waypoints,
                cursor: 0,
            })
        }
    }

    /// Return the next waypoint and move the cursor on by one, wrapping
    /// back to the start once the end of the sequence is reached.
    pub fn advance(&mut self) -> WaypointId {
        let waypoint = self.waypoints[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.waypoints.len();
        waypoint
    }

    /// Index of the waypoint [`WaypointCycle::advance`] will return next.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// All waypoints in visiting order.
    pub fn waypoints(&self) -> &[WaypointId] {
        &self.waypoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn cycle(labels: &[&str]) -> WaypointCycle {
        WaypointCycle::new(labels.iter().map(|l| WaypointId::from(*l)).collect())
            .expect("Failed to build cycle")
    }

    #[rstest]
    #[case(&["c", "a", "b"], 7, vec!["c", "a", "b", "c", "a", "b", "c"])]
    #[case(&["only"], 3, vec!["only", "only", "only"])]
    #[case(&["left", "right"], 5, vec!["left", "right", "left", "right", "left"])]
    fn test_cycle_wraps_around(
        #[case] labels: &[&str],
        #[case] steps: usize,
        #[case] expected: Vec<&str>,
    ) {
        let mut cycle = cycle(labels);
        let visited: Vec<String> = (0..steps).map(|_| cycle.advance().to_string()).collect();
        assert_eq!(visited, expected, "Failed to visit waypoints in order");
    }

    #[test]
    fn test_cursor_points_at_next_waypoint() {
        let mut cycle = cycle(&["c", "a", "b"]);
        assert_eq!(cycle.cursor(), 0);
        cycle.advance();
        cycle.advance();
        assert_eq!(cycle.cursor(), 2);
        cycle.advance();
        assert_eq!(cycle.cursor(), 0, "Cursor should wrap to the start");
    }

    #[test]
    fn test_empty_cycle_is_rejected() {
        assert!(WaypointCycle::new(Vec::new()).is_none());
    }

    #[test]
    /// Waypoint keys must be reachable with a plain string slice.
    fn test_waypoint_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(WaypointId::from("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
        assert_eq!(map.get("b"), None);
    }

    #[test]
    fn test_waypoint_serialises_as_plain_string() {
        let yaml = serde_yaml::to_string(&vec![WaypointId::from("c"), WaypointId::from("a")])
            .expect("Failed to write yaml");
        let read: Vec<WaypointId> = serde_yaml::from_str(&yaml).expect("Failed to read yaml");
        assert_eq!(read, vec![WaypointId::from("c"), WaypointId::from("a")]);
        assert!(yaml.contains("- c"));
    }
}
