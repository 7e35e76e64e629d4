// Test mode / game mode switching
//
// The bridge starts in test mode, where the pedals drive the LEDs. The first
// telemetry datagram flips it into game mode. Going back to test mode is an
// operator command, and it re-arms the first-message latch so the next
// datagram switches to game mode again.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Test,
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramGate {
    /// This datagram caused the switch into game mode.
    pub entered_game_mode: bool,
    /// The datagram should drive the LEDs.
    pub drive_leds: bool,
}

#[derive(Debug, Clone)]
pub struct ModeController {
    mode: Mode,
    awaiting_first_message: bool,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: Mode::Test,
            awaiting_first_message: true,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Pedal events only reach the LEDs in test mode.
    pub fn routes_pedals(&self) -> bool {
        self.mode == Mode::Test
    }

    /// Called for every inbound datagram, valid or not.
    pub fn on_datagram(&mut self) -> DatagramGate {
        let mut entered_game_mode = false;
        if self.awaiting_first_message {
            self.awaiting_first_message = false;
            if self.mode == Mode::Test {
                self.mode = Mode::Game;
                entered_game_mode = true;
            }
        }

        DatagramGate {
            entered_game_mode,
            drive_leds: self.mode == Mode::Game,
        }
    }

    /// Operator `test` command. Returns true if the mode changed.
    pub fn enter_test_mode(&mut self) -> bool {
        let changed = self.mode != Mode::Test;
        self.mode = Mode::Test;
        self.awaiting_first_message = true;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_test_mode() {
        let controller = ModeController::new();
        assert_eq!(controller.mode(), Mode::Test);
        assert!(controller.routes_pedals());
    }

    #[test]
    fn first_datagram_switches_to_game_mode_once() {
        let mut controller = ModeController::new();

        let first = controller.on_datagram();
        assert!(first.entered_game_mode);
        assert!(first.drive_leds);
        assert_eq!(controller.mode(), Mode::Game);
        assert!(!controller.routes_pedals());

        for _ in 0..10 {
            let next = controller.on_datagram();
            assert!(!next.entered_game_mode);
            assert!(next.drive_leds);
        }
        assert_eq!(controller.mode(), Mode::Game);
    }

    #[test]
    fn test_command_always_returns_to_test_mode() {
        let mut controller = ModeController::new();
        assert!(!controller.enter_test_mode());
        assert_eq!(controller.mode(), Mode::Test);

        controller.on_datagram();
        assert!(controller.enter_test_mode());
        assert_eq!(controller.mode(), Mode::Test);
        assert!(controller.routes_pedals());
    }

    #[test]
    fn test_command_rearms_first_message_latch() {
        let mut controller = ModeController::new();
        controller.on_datagram();
        controller.enter_test_mode();

        let gate = controller.on_datagram();
        assert!(gate.entered_game_mode);
        assert_eq!(controller.mode(), Mode::Game);
        assert!(!controller.on_datagram().entered_game_mode);
    }

    #[test]
    fn repeated_test_commands_are_harmless() {
        let mut controller = ModeController::new();
        controller.on_datagram();
        assert!(controller.enter_test_mode());
        assert!(!controller.enter_test_mode());
        assert!(controller.on_datagram().entered_game_mode);
    }
}
