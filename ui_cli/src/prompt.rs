//! Yes/no prompts that default to yes.

use std::io::{self, BufRead, Write};

use crate::error::CliError;

/// Interpret an answer to a `(Y/N) [Y]` prompt.
pub fn parse_answer(input: &str) -> bool {
    match input.trim().chars().next() {
        None => true,
        Some(c) => c.eq_ignore_ascii_case(&'y'),
    }
}

/// Ask `question` on stderr and read the answer from stdin.
///
/// `assume_yes` skips the prompt. End of input counts as the default.
pub fn confirm(question: &str, assume_yes: bool) -> io::Result<bool> {
    if assume_yes {
        return Ok(true);
    }

    let mut stderr = io::stderr();
    write!(stderr, "{} (Y/N) [Y]: ", question)?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(parse_answer(&answer))
}

/// [`confirm`] off the async runtime's worker threads.
pub async fn ask(question: String, assume_yes: bool) -> Result<bool, CliError> {
    tokio::task::spawn_blocking(move || confirm(&question, assume_yes))
        .await
        .map_err(|e| CliError::Prompt(io::Error::new(io::ErrorKind::Other, e)))?
        .map_err(CliError::Prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_is_yes() {
        assert!(parse_answer(""));
        assert!(parse_answer("\n"));
        assert!(parse_answer("   \n"));
    }

    #[test]
    fn test_answers() {
        assert!(parse_answer("y"));
        assert!(parse_answer("Yes\n"));
        assert!(!parse_answer("n"));
        assert!(!parse_answer("No"));
        assert!(!parse_answer("maybe"));
    }
}
