//! Line-based yes/no prompts
//!
//! Used where stdin may be a pipe or an ssh channel rather than a terminal,
//! so end-of-input must resolve to the default instead of failing.

use std::io::{BufRead, Write};

/// Interpret one answer line. `None` is end-of-input.
pub fn parse_confirmation(input: Option<&str>, default: bool) -> bool {
    let Some(input) = input else {
        return default;
    };
    match input.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Ask `question` on `writer` and read the answer from `reader`
pub fn confirm_with_reader<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    question: &str,
    default: bool,
) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let _ = write!(writer, "{} {}: ", question, hint);
    let _ = writer.flush();

    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => parse_confirmation(None, default),
        Ok(_) => parse_confirmation(Some(&line), default),
        Err(e) => {
            tracing::debug!("Failed to read answer: {}", e);
            false
        }
    }
}

/// Ask on the process's own stdin/stdout
pub fn confirm(question: &str, default: bool) -> bool {
    let stdin = std::io::stdin();
    let mut reader = stdin.lock();
    let mut writer = std::io::stdout();
    confirm_with_reader(&mut reader, &mut writer, question, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_default_yes_accepts() {
        for input in [None, Some(""), Some("\n"), Some("y"), Some("Y"), Some("yes"), Some("YES"), Some(" Yes ")] {
            assert!(parse_confirmation(input, true), "{:?}", input);
        }
    }

    #[test]
    fn test_default_yes_rejects() {
        for input in ["n", "no", "NO", "  no  ", "nah", "q"] {
            assert!(!parse_confirmation(Some(input), true), "{:?}", input);
        }
    }

    #[test]
    fn test_default_no() {
        assert!(!parse_confirmation(None, false));
        assert!(!parse_confirmation(Some(""), false));
        assert!(parse_confirmation(Some("y\n"), false));
    }

    #[test]
    fn test_confirm_with_reader_writes_question() {
        let mut reader = Cursor::new(b"yes\n".to_vec());
        let mut out = Vec::new();

        let answer = confirm_with_reader(
            &mut reader,
            &mut out,
            "App demo does not exist. Create?",
            true,
        );

        assert!(answer);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "App demo does not exist. Create? [Y/n]: "
        );
    }

    #[test]
    fn test_confirm_with_reader_eof_uses_default() {
        let mut out = Vec::new();
        assert!(confirm_with_reader(&mut Cursor::new(Vec::new()), &mut out, "Create?", true));
        assert!(!confirm_with_reader(&mut Cursor::new(Vec::new()), &mut out, "Delete?", false));
    }
}
