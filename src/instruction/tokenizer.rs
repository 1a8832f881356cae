//! Line tokenizer
//!
//! Splits an authored line on spaces. `"..."` keeps spaces inside one token
//! and `\` escapes the next character.

use crate::error::ParseErrorKind;

/// Tokenize a line, returning the index of the broken token on failure
pub(crate) fn tokenize(line: &str) -> Result<Vec<String>, (usize, ParseErrorKind)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    started = true;
                }
                None => return Err((tokens.len(), ParseErrorKind::DanglingEscape)),
            },
            '"' => {
                in_quotes = !in_quotes;
                // `""` is a legitimate empty token
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }

    if in_quotes {
        return Err((tokens.len(), ParseErrorKind::UnterminatedQuote));
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_split() {
        let tokens = tokenize("  lever 10;64;-3;world   toggle ").unwrap();
        assert_eq!(tokens, vec!["lever", "10;64;-3;world", "toggle"]);
    }

    #[test]
    fn test_quoted_segments() {
        let tokens = tokenize(r#"notify "Welcome to town" io:chat"#).unwrap();
        assert_eq!(tokens, vec!["notify", "Welcome to town", "io:chat"]);

        let tokens = tokenize(r#"give sword name:"Old Blade""#).unwrap();
        assert_eq!(tokens, vec!["give", "sword", "name:Old Blade"]);

        let tokens = tokenize(r#"notify """#).unwrap();
        assert_eq!(tokens, vec!["notify", ""]);
    }

    #[test]
    fn test_escapes() {
        let tokens = tokenize(r#"notify say\ \"hi\" back\\slash"#).unwrap();
        assert_eq!(tokens, vec!["notify", "say \"hi\"", "back\\slash"]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            tokenize(r#"notify "open"#),
            Err((1, ParseErrorKind::UnterminatedQuote))
        );
        assert_eq!(
            tokenize(r"notify trailing\"),
            Err((1, ParseErrorKind::DanglingEscape))
        );
    }
}
