//! Scanner for the tool-call marker protocol.
//!
//! The model requests a tool with exactly one response shape:
//!
//! ```text
//! [TOOL_CALL] tool_name(key1="value1", key2="value2")
//! ```
//!
//! The grammar is deliberately rigid: the marker must open the trimmed
//! response (a tool-call-shaped example mid-explanation is not a call),
//! arguments are always named, values are double-quoted and may contain any
//! character except an unescaped `"` (backslash escapes the next
//! character), and an empty parameter list is valid. Anything that fails
//! the grammar is not a tool call; the response is then the final answer.
//! Duplicate keys: last occurrence wins.

use std::collections::BTreeMap;

/// Marker token that opens a tool-call line.
pub const TOOL_CALL_MARKER: &str = "[TOOL_CALL]";

/// A structured call extracted from one model response. Ephemeral;
/// parameters are always strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

/// Parse a model response against the marker grammar. `None` means the
/// response is a final natural-language answer.
pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let rest = response.trim().strip_prefix(TOOL_CALL_MARKER)?;
    let mut scanner = Scanner::new(rest);

    scanner.skip_whitespace();
    let name = scanner.identifier()?;
    scanner.skip_whitespace();
    scanner.expect('(')?;

    let mut parameters = BTreeMap::new();
    scanner.skip_whitespace();
    if !scanner.eat(')') {
        loop {
            scanner.skip_whitespace();
            let key = scanner.identifier()?;
            scanner.skip_whitespace();
            scanner.expect('=')?;
            scanner.skip_whitespace();
            let value = scanner.quoted_string()?;
            parameters.insert(key, value);

            scanner.skip_whitespace();
            if scanner.eat(',') {
                continue;
            }
            scanner.expect(')')?;
            break;
        }
    }

    // Whole-string anchored: only trailing whitespace may follow.
    scanner.skip_whitespace();
    if !scanner.at_end() {
        return None;
    }

    Some(ToolCall { name, parameters })
}

struct Scanner<'a> {
    rest: std::str::Chars<'a>,
    peeked: Option<char>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            rest: input.chars(),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.rest.next();
        }
        self.peeked
    }

    fn bump(&mut self) -> Option<char> {
        self.peeked.take().or_else(|| self.rest.next())
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, c: char) -> Option<()> {
        (self.bump()? == c).then_some(())
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`
    fn identifier(&mut self) -> Option<String> {
        let first = self.peek()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Some(ident)
    }

    /// A double-quoted value. Backslash escapes the next character; the
    /// escaped character is taken literally.
    fn quoted_string(&mut self) -> Option<String> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.bump()? {
                '"' => return Some(value),
                '\\' => value.push(self.bump()?),
                c => value.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_without_parameters() {
        let call = parse_tool_call("[TOOL_CALL] get_status()").unwrap();
        assert_eq!(call.name, "get_status");
        assert!(call.parameters.is_empty());
    }

    #[test]
    fn parses_named_parameters() {
        let call =
            parse_tool_call("[TOOL_CALL] get_weather(city=\"Temuco\", date=\"3 semanas\")")
                .unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.parameters.get("city").unwrap(), "Temuco");
        assert_eq!(call.parameters.get("date").unwrap(), "3 semanas");
    }

    #[test]
    fn no_marker_means_final_answer() {
        assert!(parse_tool_call("No tienes deuda pendiente.").is_none());
    }

    #[test]
    fn marker_mid_text_is_not_a_call() {
        assert!(parse_tool_call("Use the format [TOOL_CALL] get_status() to ask.").is_none());
    }

    #[test]
    fn leading_whitespace_is_tolerated() {
        assert!(parse_tool_call("  \n[TOOL_CALL] get_status()").is_some());
    }

    #[test]
    fn trailing_text_after_call_rejects_the_match() {
        assert!(parse_tool_call("[TOOL_CALL] get_status() and then some").is_none());
    }

    #[test]
    fn trailing_whitespace_is_fine() {
        assert!(parse_tool_call("[TOOL_CALL] get_status()  \n").is_some());
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert!(parse_tool_call("[TOOL_CALL] get_weather(\"Temuco\")").is_none());
    }

    #[test]
    fn unquoted_values_are_rejected() {
        assert!(parse_tool_call("[TOOL_CALL] get_weather(city=Temuco)").is_none());
    }

    #[test]
    fn unterminated_value_is_rejected() {
        assert!(parse_tool_call("[TOOL_CALL] get_weather(city=\"Temuco").is_none());
    }

    #[test]
    fn missing_close_paren_is_rejected() {
        assert!(parse_tool_call("[TOOL_CALL] get_weather(city=\"Temuco\"").is_none());
    }

    #[test]
    fn escaped_quotes_inside_values() {
        let call = parse_tool_call(r#"[TOOL_CALL] notify(text="di \"hola\" fuerte")"#).unwrap();
        assert_eq!(call.parameters.get("text").unwrap(), r#"di "hola" fuerte"#);
    }

    #[test]
    fn values_may_contain_parens_and_commas() {
        let call = parse_tool_call(r#"[TOOL_CALL] find(q="a, b (c)")"#).unwrap();
        assert_eq!(call.parameters.get("q").unwrap(), "a, b (c)");
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let call =
            parse_tool_call(r#"[TOOL_CALL] get_weather(city="Temuco", city="Osorno")"#).unwrap();
        assert_eq!(call.parameters.get("city").unwrap(), "Osorno");
        assert_eq!(call.parameters.len(), 1);
    }

    #[test]
    fn identifier_must_start_alpha_or_underscore() {
        assert!(parse_tool_call("[TOOL_CALL] 9lives()").is_none());
        assert!(parse_tool_call("[TOOL_CALL] _private()").is_some());
    }

    #[test]
    fn empty_parameter_list_with_spaces() {
        let call = parse_tool_call("[TOOL_CALL] get_status(  )").unwrap();
        assert!(call.parameters.is_empty());
    }

    #[test]
    fn trailing_comma_is_rejected() {
        assert!(parse_tool_call(r#"[TOOL_CALL] f(a="1",)"#).is_none());
    }

    #[test]
    fn unicode_values_pass_through() {
        let call = parse_tool_call(r#"[TOOL_CALL] get_places(city="Ñuñoa")"#).unwrap();
        assert_eq!(call.parameters.get("city").unwrap(), "Ñuñoa");
    }
}
