//! Tokenizers for alias matching and argument parsing.

use crate::error::{ParseError, ParseResult};

/// Returns `true` if `ch` separates tokens. A space separator also accepts
/// any other whitespace.
pub fn is_separator(ch: char, separator: char) -> bool {
    if separator == ' ' {
        ch.is_whitespace()
    } else {
        ch == separator
    }
}

/// Shell-like argument splitting on `separator`.
///
/// Handles:
/// - Quoted strings (single and double quotes)
/// - Escape sequences within double quotes
///
/// Unterminated quotes are tolerated; the rest of the input becomes the last
/// argument.
pub fn shell_split(input: &str, separator: char) -> Vec<String> {
    split(input, separator).0
}

/// Like [`shell_split`], but rejects unterminated quotes.
pub fn try_shell_split(input: &str, separator: char) -> ParseResult<Vec<String>> {
    match split(input, separator) {
        (args, true) => Ok(args),
        (_, false) => Err(ParseError::UnterminatedQuote),
    }
}

/// Number of arguments [`shell_split`] would produce.
pub fn count_args(input: &str, separator: char) -> usize {
    shell_split(input, separator).len()
}

fn split(input: &str, separator: char) -> (Vec<String>, bool) {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;
    // Distinguishes `""` (an empty argument) from no argument at all.
    let mut quoted = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                quoted = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                quoted = true;
            }
            c if is_separator(c, separator) && !in_single_quote && !in_double_quote => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    (args, !in_single_quote && !in_double_quote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_split_simple() {
        assert_eq!(shell_split("hello world", ' '), vec!["hello", "world"]);
    }

    #[test]
    fn test_shell_split_quoted() {
        let args = shell_split(r#"echo "hello world" test"#, ' ');
        assert_eq!(args, vec!["echo", "hello world", "test"]);
    }

    #[test]
    fn test_shell_split_mixed_quotes() {
        let args = shell_split(r#"cmd "double's quote" 'single"s quote'"#, ' ');
        assert_eq!(args, vec!["cmd", "double's quote", r#"single"s quote"#]);
    }

    #[test]
    fn test_shell_split_empty_quoted_argument() {
        assert_eq!(shell_split(r#"a "" b"#, ' '), vec!["a", "", "b"]);
    }

    #[test]
    fn test_shell_split_custom_separator() {
        assert_eq!(shell_split("1,2,'3,4'", ','), vec!["1", "2", "3,4"]);
    }

    #[test]
    fn test_shell_split_whitespace_only() {
        assert!(shell_split("   \t  ", ' ').is_empty());
        assert_eq!(count_args("", ' '), 0);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(shell_split(r#"say "hi there"#, ' '), vec!["say", "hi there"]);
        assert!(matches!(
            try_shell_split(r#"say "hi there"#, ' '),
            Err(ParseError::UnterminatedQuote)
        ));
    }
}
