//! Command decoding
//!
//! Maps a direction symbol and speed onto a [`ControlDirective`].
//!
//! | Symbol | Action |
//! |--------|--------|
//! | `W` | Forward |
//! | `S` | Backward |
//! | `K` | TurnRight |
//! | `J` | TurnLeft |
//! | `Q` | DiagForwardLeft |
//! | `E` | DiagForwardRight |
//! | `A` | DiagBackwardLeft |
//! | `D` | DiagBackwardRight |
//! | `F` | Noop |
//! | anything else | Stop |

use crate::core::types::{ControlDirective, DriveAction, RawCommand, Speed};

/// Look up the action for a direction symbol
pub fn action_for_symbol(symbol: char) -> DriveAction {
    match symbol {
        'W' => DriveAction::Forward,
        'S' => DriveAction::Backward,
        'K' => DriveAction::TurnRight,
        'J' => DriveAction::TurnLeft,
        'Q' => DriveAction::DiagForwardLeft,
        'E' => DriveAction::DiagForwardRight,
        'A' => DriveAction::DiagBackwardLeft,
        'D' => DriveAction::DiagBackwardRight,
        'F' => DriveAction::Noop,
        _ => DriveAction::Stop,
    }
}

/// Decode one raw command unit.
///
/// Without fresh data the result is always `Noop`, which leaves the drive at
/// its last commanded state. Speed is clamped into `[0, MAX_SPEED]`.
pub fn decode(raw_symbol: char, raw_speed: i32, data_ready: bool) -> ControlDirective {
    if !data_ready {
        return ControlDirective::noop();
    }

    ControlDirective::new(action_for_symbol(raw_symbol), Speed::clamped(raw_speed))
}

/// Decode the optional command pulled from the channel this cycle
pub fn decode_pulled(command: Option<RawCommand>) -> ControlDirective {
    match command {
        Some(cmd) => decode(cmd.command, cmd.speed, true),
        None => ControlDirective::noop(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MAX_SPEED;

    #[test]
    fn test_symbol_table() {
        let table = [
            ('W', DriveAction::Forward),
            ('S', DriveAction::Backward),
            ('K', DriveAction::TurnRight),
            ('J', DriveAction::TurnLeft),
            ('Q', DriveAction::DiagForwardLeft),
            ('E', DriveAction::DiagForwardRight),
            ('A', DriveAction::DiagBackwardLeft),
            ('D', DriveAction::DiagBackwardRight),
            ('F', DriveAction::Noop),
        ];

        for (symbol, action) in table {
            let directive = decode(symbol, 30, true);
            assert_eq!(directive.action(), action, "symbol {symbol}");
            assert_eq!(directive.speed().get(), 30);
        }
    }

    #[test]
    fn test_unrecognized_symbols_stop() {
        for symbol in ['Z', 'w', 'x', ' ', '0', '\n', 'é'] {
            assert_eq!(decode(symbol, 10, true).action(), DriveAction::Stop);
        }
    }

    #[test]
    fn test_not_ready_is_noop() {
        for symbol in ['W', 'S', 'Z', 'F'] {
            for speed in [-5, 0, 50, 1000] {
                let directive = decode(symbol, speed, false);
                assert!(directive.is_noop());
            }
        }
    }

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(decode('W', 250, true).speed().get(), MAX_SPEED);
        assert_eq!(decode('S', -40, true).speed().get(), 0);
        assert_eq!(decode('Z', 500, true).speed().get(), MAX_SPEED);
    }

    #[test]
    fn test_scenario_sequence() {
        let inputs = [('W', 50, true), ('?', 0, false), ('Z', 10, true)];
        let directives: Vec<_> = inputs
            .iter()
            .map(|&(symbol, speed, ready)| decode(symbol, speed, ready))
            .collect();

        assert_eq!(
            directives,
            vec![
                ControlDirective::new(DriveAction::Forward, Speed::clamped(50)),
                ControlDirective::noop(),
                ControlDirective::new(DriveAction::Stop, Speed::clamped(10)),
            ]
        );
    }

    #[test]
    fn test_decode_pulled() {
        assert!(decode_pulled(None).is_noop());
        let directive = decode_pulled(Some(RawCommand::new('J', 70)));
        assert_eq!(directive.action(), DriveAction::TurnLeft);
        assert_eq!(directive.speed().get(), 70);
    }
}
