use std::io::{BufRead, Write};
use thiserror::Error;

pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("no valid driver code after {0} attempts")]
    AttemptsExhausted(usize),
    #[error("prompt io: {0}")]
    Io(#[from] std::io::Error),
}

/// Asks for a driver code until one matches, at most `max_attempts` times.
/// A miss re-lists the valid codes; running out of attempts is a typed
/// error, not another round of prompting.
pub fn prompt_driver<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    codes: &[String],
    max_attempts: usize,
) -> Result<String, PromptError> {
    writeln!(output, "Drivers: {}", codes.join(" "))?;
    for _ in 0..max_attempts {
        write!(output, "Driver code: ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let code = line.trim().to_uppercase();
        if codes.iter().any(|c| c == &code) {
            return Ok(code);
        }
        writeln!(output, "Unknown code {code:?}. Valid: {}", codes.join(" "))?;
    }
    Err(PromptError::AttemptsExhausted(max_attempts))
}

pub fn prompt_driver_stdin(codes: &[String]) -> Result<String, PromptError> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    prompt_driver(&mut input, &mut output, codes, MAX_ATTEMPTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn codes() -> Vec<String> {
        vec!["PIA".to_string(), "VER".to_string(), "NOR".to_string()]
    }

    #[test]
    fn accepts_a_valid_code_first_try() {
        let mut input = Cursor::new("ver\n");
        let mut output = Vec::new();
        let got = prompt_driver(&mut input, &mut output, &codes(), 3).unwrap();
        assert_eq!(got, "VER");
    }

    #[test]
    fn recovers_within_the_attempt_budget() {
        let mut input = Cursor::new("xxx\nyyy\npia\n");
        let mut output = Vec::new();
        let got = prompt_driver(&mut input, &mut output, &codes(), 3).unwrap();
        assert_eq!(got, "PIA");

        // each miss re-lists the valid codes
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("PIA VER NOR").count(), 3);
    }

    #[test]
    fn exhaustion_is_a_typed_error() {
        let mut input = Cursor::new("a\nb\nc\npia\n");
        let mut output = Vec::new();
        let err = prompt_driver(&mut input, &mut output, &codes(), 3).unwrap_err();
        assert!(matches!(err, PromptError::AttemptsExhausted(3)));
    }

    #[test]
    fn eof_counts_as_exhaustion() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        let err = prompt_driver(&mut input, &mut output, &codes(), 3).unwrap_err();
        assert!(matches!(err, PromptError::AttemptsExhausted(_)));
    }
}
