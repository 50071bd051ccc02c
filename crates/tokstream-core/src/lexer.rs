//! Token text lexer
//!
//! Upstream models emit audio tokens as text such as `"888,265,1189"`. Any
//! non-digit character separates tokens, and a run that evaluates to zero is
//! never emitted. Codes past `u64::MAX` clamp to it; real vocabularies are
//! many orders of magnitude smaller.

use std::str::Chars;

/// An audio token code.
pub type Token = u64;

/// Lazily lex a chunk of token text.
pub fn lex(text: &str) -> Lexer<'_> {
    Lexer {
        chars: text.chars(),
    }
}

/// Convenience wrapper collecting [`lex`] into a vector.
pub fn lex_all(text: &str) -> Vec<Token> {
    lex(text).collect()
}

/// Iterator over the tokens of one text chunk.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    chars: Chars<'a>,
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let mut value: Token = 0;
        for c in self.chars.by_ref() {
            match c.to_digit(10) {
                Some(d) => value = value.saturating_mul(10).saturating_add(u64::from(d)),
                None if value != 0 => return Some(value),
                None => {}
            }
        }
        (value != 0).then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated() {
        assert_eq!(
            lex_all("888,265,1189,4502,4264"),
            vec![888, 265, 1189, 4502, 4264]
        );
    }

    #[test]
    fn any_non_digit_separates() {
        assert_eq!(lex_all("<12> 7;;\n30x4"), vec![12, 7, 30, 4]);
    }

    #[test]
    fn zero_runs_are_dropped() {
        assert_eq!(lex_all("0,00,5,0"), vec![5]);
        assert_eq!(lex_all("000"), Vec::<Token>::new());
        // Leading zeros only disappear into the value.
        assert_eq!(lex_all("007"), vec![7]);
    }

    #[test]
    fn empty_and_digitless_input() {
        assert!(lex_all("").is_empty());
        assert!(lex_all(",,, abc").is_empty());
    }

    #[test]
    fn trailing_value_without_separator() {
        let mut lexer = lex("1,2,345");
        assert_eq!(lexer.next(), Some(1));
        assert_eq!(lexer.next(), Some(2));
        assert_eq!(lexer.next(), Some(345));
        assert_eq!(lexer.next(), None);
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn large_codes_survive() {
        // Past 32 bits.
        assert_eq!(lex_all("7,99999999999999"), vec![7, 99_999_999_999_999]);
    }

    #[test]
    fn runs_past_u64_clamp() {
        assert_eq!(lex_all("123456789012345678901234567890,4"), vec![u64::MAX, 4]);
    }
}
