// Operator console commands
//
// One command per stdin line: a bare number sets the max RPM, `test` goes
// back to test mode, `exit`/`quit`/`q` shuts the bridge down.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetMaxRpm(f32),
    TestMode,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid input '{0}', please enter a number or a command (test, exit)")]
    Unrecognized(String),
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let input = line.trim();
    let command = match input {
        "" => return Ok(None),
        "exit" | "quit" | "q" => Command::Quit,
        "test" => Command::TestMode,
        _ => match input.parse::<f32>() {
            Ok(value) => Command::SetMaxRpm(value),
            Err(_) => return Err(CommandError::Unrecognized(input.to_string())),
        },
    };
    Ok(Some(command))
}
