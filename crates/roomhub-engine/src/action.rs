/// Recognized player input. Unknown wire strings do not parse to a variant
/// and are dropped at the protocol boundary, never reaching the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Left,
    Right,
    Down,
    Rotate,
    HardDrop,
    Hold,
    Pause,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Action::Left),
            "right" => Some(Action::Right),
            "down" => Some(Action::Down),
            "rotate" => Some(Action::Rotate),
            "hardDrop" => Some(Action::HardDrop),
            "hold" => Some(Action::Hold),
            "pause" => Some(Action::Pause),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Action::Left => "left",
            Action::Right => "right",
            Action::Down => "down",
            Action::Rotate => "rotate",
            Action::HardDrop => "hardDrop",
            Action::Hold => "hold",
            Action::Pause => "pause",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_does_not_parse() {
        assert!(Action::parse("teleport").is_none());
    }

    #[test]
    fn every_display_form_round_trips_through_parse() {
        let all = [
            Action::Left,
            Action::Right,
            Action::Down,
            Action::Rotate,
            Action::HardDrop,
            Action::Hold,
            Action::Pause,
        ];
        for a in all {
            assert_eq!(Action::parse(&a.to_string()), Some(a));
        }
    }
}
