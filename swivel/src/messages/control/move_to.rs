use crate::components::camera::waypoint::WaypointId;
use serde::{Deserialize, Serialize};

/// Commands understood by the broker on the camera resource.
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum BrokerCommand {
    /// Point the camera at a stored position.
    #[serde(rename = "moveTo")]
    MoveTo,
}

/// Body of the `PUT /camera/api/{camera}` request that swivels the camera.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MoveToMessage {
    /// Always [`BrokerCommand::MoveTo`].
    pub cmd: BrokerCommand,
    /// Waypoint to move to.
    pub pos: WaypointId,
    /// Requested travel time in milliseconds.
    pub duration: u64,
}

impl MoveToMessage {
    /// Build the move command for `waypoint` over `duration_ms`.
    pub fn new(waypoint: WaypointId, duration_ms: u64) -> Self {
        Self {
            cmd: BrokerCommand::MoveTo,
            pos: waypoint,
            duration: duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"cmd": "moveTo", "pos": "c", "duration": 2000}"#)]
    #[case(r#"{"cmd":"moveTo","pos":"a","duration":4000}"#)]
    #[case(
        r#"{"duration": 0,
            "pos": "north-gate",
                "cmd": "moveTo"}"#
    )]
    fn test_parse_move_message(#[case] raw_string: &str) {
        let _parsed: MoveToMessage = serde_json::from_str(raw_string).unwrap();
    }

    #[rstest]
    #[case(r#"{"cmd": "moveBy", "pos": "c", "duration": 2000}"#)]
    #[case(r#"{"cmd": "moveTo", "duration": 2000}"#)]
    #[case(r#"{"cmd": "moveTo", "pos": "c", "duration": -1}"#)]
    fn test_reject_malformed_move_message(#[case] raw_string: &str) {
        assert!(serde_json::from_str::<MoveToMessage>(raw_string).is_err());
    }

    #[test]
    /// The broker keys on the exact field names and the camel case command.
    fn test_wire_format_matches_broker() {
        let message = MoveToMessage::new("c".into(), 2000);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"cmd": "moveTo", "pos": "c", "duration": 2000})
        );
    }
}
