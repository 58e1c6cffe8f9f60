//! Identifier scanning, argument parsing, `#`/`##` operators, builtin
//! substitution, and the fixed-point re-scan that turns raw tokens into
//! fully macro-expanded output.

use std::collections::HashSet;

use crate::error::PreprocessError;
use crate::macro_table::{Macro, MacroTable};
use crate::token::{Token, is_identifier_continue, is_identifier_start};

/// Absolute backstop on expansion restarts (spec's literal "bound at 100"),
/// checked in addition to the caller-configured recursion limit. Blue paint
/// (the `disabled` set below) is what actually prevents runaway recursion in
/// practice; this is insurance against a bug in that bookkeeping.
const MAX_RESTARTS: usize = 100;

type MacroArguments = Vec<Vec<Token>>;

/// Tokenize one logical line of already-spliced, comment-stripped source
/// into identifiers, literals, pp-numbers, and punctuation.
pub(crate) fn tokenize_line(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut it = line.chars().peekable();

    while let Some(&ch) = it.peek() {
        if is_identifier_start(ch) {
            let mut s = String::new();
            while let Some(&c2) = it.peek() {
                if is_identifier_continue(c2) {
                    s.push(c2);
                    it.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(s));
        } else if ch.is_ascii_digit() {
            tokens.push(Token::PpNumber(scan_pp_number(&mut it)));
        } else if ch == '"' || ch == '\'' {
            let quote = ch;
            let mut s = String::new();
            s.push(quote);
            it.next();
            while let Some(c2) = it.next() {
                s.push(c2);
                if c2 == '\\' {
                    if let Some(c3) = it.next() {
                        s.push(c3);
                    }
                } else if c2 == quote {
                    break;
                }
            }
            if quote == '"' {
                tokens.push(Token::StringLiteral(s));
            } else {
                tokens.push(Token::CharLiteral(s));
            }
        } else if ch.is_whitespace() {
            let mut s = String::new();
            while let Some(&c2) = it.peek() {
                if c2.is_whitespace() {
                    s.push(c2);
                    it.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Other(s));
        } else if let Some(c) = it.next() {
            if c == '#' && it.peek() == Some(&'#') {
                it.next();
                tokens.push(Token::Other("##".to_string()));
            } else {
                tokens.push(Token::Other(c.to_string()));
            }
        } else {
            break;
        }
    }
    tokens
}

fn scan_pp_number(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut s = String::new();
    s.push(it.next().expect("caller peeked a digit"));
    while let Some(&c) = it.peek() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            s.push(c);
            it.next();
        } else if (c == '+' || c == '-')
            && matches!(s.chars().last(), Some('e' | 'E' | 'p' | 'P'))
        {
            s.push(c);
            it.next();
        } else {
            break;
        }
    }
    s
}

fn token_text(token: &Token) -> &str {
    match token {
        Token::Identifier(s)
        | Token::Other(s)
        | Token::StringLiteral(s)
        | Token::CharLiteral(s)
        | Token::PpNumber(s) => s,
    }
}

pub(crate) fn tokens_to_string(tokens: &[Token]) -> String {
    let total_len: usize = tokens.iter().map(|t| token_text(t).len()).sum();
    let mut out = String::with_capacity(total_len);
    for t in tokens {
        out.push_str(token_text(t));
    }
    out
}

fn is_whitespace_token(token: &Token) -> bool {
    matches!(token, Token::Other(s) if !s.is_empty() && s.chars().all(char::is_whitespace))
}

pub(crate) fn trim_token_whitespace(mut tokens: Vec<Token>) -> Vec<Token> {
    let mut start = 0;
    while start < tokens.len() && is_whitespace_token(&tokens[start]) {
        start += 1;
    }
    let mut end = tokens.len();
    while end > start && is_whitespace_token(&tokens[end - 1]) {
        end -= 1;
    }
    if start > 0 || end < tokens.len() {
        tokens.drain(end..);
        tokens.drain(0..start);
    }
    tokens
}

fn concatenate_tokens(left: &Token, right: &Token) -> Token {
    let concatenated = format!("{}{}", token_text(left), token_text(right));
    match (left, right) {
        (Token::Identifier(_), Token::Identifier(_)) => Token::Identifier(concatenated),
        (Token::Identifier(_), Token::PpNumber(_)) | (Token::PpNumber(_), Token::PpNumber(_)) => {
            Token::PpNumber(concatenated)
        }
        _ => Token::Other(concatenated),
    }
}

/// Apply every `##` token-pasting operator in a token sequence, left to
/// right. A `##` with no usable neighbor on either side is left verbatim.
pub(crate) fn apply_token_pasting(tokens: &[Token]) -> Vec<Token> {
    let mut result: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if let Token::Other(s) = &tokens[i]
            && s.trim() == "##"
        {
            let mut prev_idx = if result.is_empty() {
                None
            } else {
                Some(result.len() - 1)
            };
            while let Some(idx) = prev_idx {
                if !is_whitespace_token(&result[idx]) {
                    break;
                }
                prev_idx = if idx == 0 { None } else { Some(idx - 1) };
            }
            if let Some(p_idx) = prev_idx {
                while result.last().is_some_and(is_whitespace_token) {
                    result.pop();
                }
                let mut next_idx = i + 1;
                while next_idx < tokens.len() && is_whitespace_token(&tokens[next_idx]) {
                    next_idx += 1;
                }
                if next_idx < tokens.len() {
                    let concatenated = concatenate_tokens(&result[p_idx], &tokens[next_idx]);
                    result[p_idx] = concatenated;
                    i = next_idx + 1;
                    continue;
                }
            }
            result.push(tokens[i].clone());
        } else {
            result.push(tokens[i].clone());
        }
        i += 1;
    }
    result
}

/// Resolve a builtin identifier (`__LINE__`, `__FILE__`, `__DATE__`,
/// `__TIME__`) to its substitution token, or `None` if `name` isn't one.
pub(crate) fn expand_builtin(name: &str, current_file: &str, current_line: usize) -> Option<Token> {
    use crate::date_time::{format_date, format_time};

    match name {
        "__LINE__" => Some(Token::PpNumber(current_line.to_string())),
        "__FILE__" => Some(Token::StringLiteral(format!("\"{current_file}\""))),
        "__DATE__" => Some(Token::StringLiteral(format!("\"{}\"", format_date()))),
        "__TIME__" => Some(Token::StringLiteral(format!("\"{}\"", format_time()))),
        _ => None,
    }
}

/// Drives fixed-point macro expansion over a token sequence for one macro
/// table, using a blue-paint (currently-expanding-name) recursion guard.
pub(crate) struct MacroExpander<'t> {
    macros: &'t MacroTable,
}

impl<'t> MacroExpander<'t> {
    pub fn new(macros: &'t MacroTable) -> Self {
        Self { macros }
    }

    /// Expand every macro invocation in `tokens` to a fixed point.
    ///
    /// `max_restarts` is the caller-configured bound (`PreprocessorConfig::recursion_limit`);
    /// it is always additionally capped at [`MAX_RESTARTS`], since blue paint is what actually
    /// prevents runaway recursion and the restart counter is only insurance against a bug in
    /// that bookkeeping.
    pub fn expand(
        &self,
        tokens: &[Token],
        current_file: &str,
        current_line: usize,
        max_restarts: usize,
    ) -> Result<Vec<Token>, PreprocessError> {
        let mut disabled = HashSet::new();
        let bound = max_restarts.min(MAX_RESTARTS);
        self.expand_inner(tokens, &mut disabled, 0, bound, current_file, current_line)
    }

    fn expand_inner(
        &self,
        tokens: &[Token],
        disabled: &mut HashSet<String>,
        restarts: usize,
        bound: usize,
        file: &str,
        line: usize,
    ) -> Result<Vec<Token>, PreprocessError> {
        if restarts > bound {
            return Err(PreprocessError::recursion_limit_exceeded(
                file.to_string(),
                line,
                format!("macro expansion exceeded {bound} restarts"),
            ));
        }

        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                Token::Identifier(name) => {
                    if let Some(tok) = expand_builtin(name, file, line) {
                        out.push(tok);
                        i += 1;
                    } else if let Some(mac) = self.macros.get(name) {
                        if disabled.contains(name) {
                            out.push(tokens[i].clone());
                            i += 1;
                        } else {
                            i = self.expand_invocation(
                                mac, name, tokens, i, disabled, restarts, bound, file, line,
                                &mut out,
                            )?;
                        }
                    } else {
                        out.push(tokens[i].clone());
                        i += 1;
                    }
                }
                _ => {
                    out.push(tokens[i].clone());
                    i += 1;
                }
            }
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_invocation(
        &self,
        mac: &Macro,
        name: &str,
        tokens: &[Token],
        i: usize,
        disabled: &mut HashSet<String>,
        restarts: usize,
        bound: usize,
        file: &str,
        line: usize,
        out: &mut Vec<Token>,
    ) -> Result<usize, PreprocessError> {
        if mac.is_function_like() {
            // Per the base grammar, a function-like invocation requires the
            // immediately-following byte to be '(' -- no intervening
            // whitespace tolerated.
            let invokes = matches!(tokens.get(i + 1), Some(Token::Other(s)) if s.starts_with('('));
            if !invokes {
                out.push(tokens[i].clone());
                return Ok(i + 1);
            }
            let paren_idx = i + 1;
            let (args, end_idx) = parse_macro_arguments(tokens, paren_idx, file, line)?;
            self.check_arg_count(mac, &args, name, file, line)?;

            disabled.insert(name.to_string());
            let substituted =
                self.substitute_parameters(mac, &args, disabled, restarts, bound, file, line)?;
            let pasted = apply_token_pasting(&substituted);
            let expanded = self.expand_inner(&pasted, disabled, restarts + 1, bound, file, line)?;
            disabled.remove(name);
            out.extend(expanded);
            Ok(end_idx)
        } else {
            disabled.insert(name.to_string());
            let pasted = apply_token_pasting(&mac.body);
            let expanded = self.expand_inner(&pasted, disabled, restarts + 1, bound, file, line)?;
            disabled.remove(name);
            out.extend(expanded);
            Ok(i + 1)
        }
    }

    fn check_arg_count(
        &self,
        mac: &Macro,
        args: &[Vec<Token>],
        name: &str,
        file: &str,
        line: usize,
    ) -> Result<(), PreprocessError> {
        let params = mac.params.as_ref().expect("function-like macro has params");
        let provided = if args.len() == 1 && args[0].is_empty() && params.is_empty() {
            0
        } else {
            args.len()
        };
        let required = params.len();
        let ok = if mac.is_variadic {
            provided >= required
        } else {
            provided == required
        };
        if ok {
            Ok(())
        } else {
            Err(PreprocessError::macro_arg_mismatch(
                file.to_string(),
                line,
                format!("macro '{name}' expects {required} argument(s), got {provided}"),
            ))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn substitute_parameters(
        &self,
        mac: &Macro,
        args: &MacroArguments,
        disabled: &mut HashSet<String>,
        restarts: usize,
        bound: usize,
        file: &str,
        line: usize,
    ) -> Result<Vec<Token>, PreprocessError> {
        let Some(params) = &mac.params else {
            return Ok(mac.body.as_ref().clone());
        };

        let mut replaced = Vec::with_capacity(mac.body.len());
        let mut body_iter = mac.body.iter().peekable();
        let is_param = |id: &str| params.iter().position(|p| p == id);

        while let Some(body_t) = body_iter.next() {
            match body_t {
                Token::Other(s) if s.trim() == "#" => {
                    if let Some(Token::Identifier(id)) = body_iter.peek() {
                        if let Some(pos) = is_param(id) {
                            let expanded_arg = self.expand_inner(
                                &args[pos],
                                disabled,
                                restarts + 1,
                                bound,
                                file,
                                line,
                            )?;
                            let escaped = stringify_argument(&expanded_arg);
                            replaced.push(Token::StringLiteral(format!("\"{escaped}\"")));
                            body_iter.next();
                            continue;
                        }
                    }
                    replaced.push(Token::Other(s.clone()));
                }
                Token::Identifier(id) => {
                    if let Some(pos) = is_param(id) {
                        let expanded = self.expand_inner(
                            &args[pos],
                            disabled,
                            restarts + 1,
                            bound,
                            file,
                            line,
                        )?;
                        replaced.extend(expanded);
                        continue;
                    }
                    if id == "__VA_ARGS__" && mac.is_variadic {
                        let start = params.len();
                        for idx in start..args.len() {
                            let expanded = self.expand_inner(
                                &args[idx],
                                disabled,
                                restarts + 1,
                                bound,
                                file,
                                line,
                            )?;
                            replaced.extend(expanded);
                            if idx + 1 < args.len() {
                                replaced.push(Token::Other(",".into()));
                            }
                        }
                        continue;
                    }
                    replaced.push(Token::Identifier(id.clone()));
                }
                other => replaced.push(other.clone()),
            }
        }
        Ok(replaced)
    }
}

/// Stringify (`#` operator) a macro argument's tokens, already expanded one
/// level by the caller: escape `\` and `"` inside the text.
fn stringify_argument(tokens: &[Token]) -> String {
    tokens_to_string(tokens).replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split a function-like invocation's parenthesized argument list on
/// top-level commas, tracking nested parens so `F(g(a, b), c)` sees two
/// arguments, not four.
fn parse_macro_arguments(
    tokens: &[Token],
    paren_idx: usize,
    file: &str,
    line: usize,
) -> Result<(MacroArguments, usize), PreprocessError> {
    let mut args = Vec::new();
    let mut paren_depth = 0i32;
    let mut current_arg = Vec::new();
    let mut i = paren_idx;
    let mut saw_any_token = false;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Other(s) => {
                for ch in s.chars() {
                    match ch {
                        '(' => {
                            paren_depth += 1;
                            if paren_depth > 1 {
                                current_arg.push(Token::Other(ch.to_string()));
                            }
                        }
                        ')' => {
                            paren_depth -= 1;
                            if paren_depth == 0 {
                                args.push(trim_token_whitespace(current_arg));
                                return Ok((args, i + 1));
                            }
                            current_arg.push(Token::Other(ch.to_string()));
                        }
                        ',' if paren_depth == 1 => {
                            args.push(trim_token_whitespace(current_arg));
                            current_arg = Vec::new();
                        }
                        _ => {
                            saw_any_token = true;
                            current_arg.push(Token::Other(ch.to_string()));
                        }
                    }
                }
            }
            other => {
                saw_any_token = true;
                current_arg.push(other.clone());
            }
        }
        i += 1;
    }
    let _ = saw_any_token;

    Err(PreprocessError::macro_arg_mismatch(
        file.to_string(),
        line,
        "unterminated macro arguments".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macro_table::MacroTable;
    use std::rc::Rc;

    fn obj(table: &mut MacroTable, name: &str, body: &str) {
        table.define(
            name.to_string(),
            Macro {
                params: None,
                is_variadic: false,
                body: Rc::new(tokenize_line(body)),
                definition_site: None,
                is_builtin: false,
            },
        );
    }

    fn func(table: &mut MacroTable, name: &str, params: &[&str], body: &str, variadic: bool) {
        table.define(
            name.to_string(),
            Macro {
                params: Some(params.iter().map(|s| s.to_string()).collect()),
                is_variadic: variadic,
                body: Rc::new(tokenize_line(body)),
                definition_site: None,
                is_builtin: false,
            },
        );
    }

    #[test]
    fn object_like_macro_expands() {
        let mut table = MacroTable::new();
        obj(&mut table, "FOO", "42");
        let expander = MacroExpander::new(&table);
        let out = expander
            .expand(&tokenize_line("FOO"), "t.c", 1, 100)
            .unwrap();
        assert_eq!(tokens_to_string(&out), "42");
    }

    #[test]
    fn self_referential_object_macro_does_not_loop() {
        let mut table = MacroTable::new();
        obj(&mut table, "A", "A");
        let expander = MacroExpander::new(&table);
        let out = expander.expand(&tokenize_line("A"), "t.c", 1, 100).unwrap();
        assert_eq!(tokens_to_string(&out), "A");
    }

    #[test]
    fn function_like_macro_substitutes_arguments() {
        let mut table = MacroTable::new();
        func(&mut table, "ADD", &["a", "b"], "a + b", false);
        let expander = MacroExpander::new(&table);
        let out = expander
            .expand(&tokenize_line("ADD(1, 2)"), "t.c", 1, 100)
            .unwrap();
        assert_eq!(tokens_to_string(&out), "1 + 2");
    }

    #[test]
    fn function_like_macro_requires_no_whitespace_before_paren() {
        let mut table = MacroTable::new();
        func(&mut table, "F", &["a"], "a", false);
        let expander = MacroExpander::new(&table);
        let out = expander.expand(&tokenize_line("F (1)"), "t.c", 1, 100).unwrap();
        assert_eq!(tokens_to_string(&out), "F (1)");
    }

    #[test]
    fn stringification_escapes_quotes_and_backslashes() {
        let mut table = MacroTable::new();
        func(&mut table, "STR", &["x"], "#x", false);
        let expander = MacroExpander::new(&table);
        let out = expander
            .expand(&tokenize_line(r#"STR(a"b)"#), "t.c", 1, 100)
            .unwrap();
        assert_eq!(tokens_to_string(&out), r#""a\"b""#);
    }

    #[test]
    fn stringification_expands_argument_macro_before_quoting() {
        let mut table = MacroTable::new();
        table.define(
            "FOO".to_string(),
            Macro {
                params: None,
                is_variadic: false,
                body: Rc::new(tokenize_line("42")),
                definition_site: None,
                is_builtin: false,
            },
        );
        func(&mut table, "STR", &["x"], "#x", false);
        let expander = MacroExpander::new(&table);
        let out = expander
            .expand(&tokenize_line("STR(FOO)"), "t.c", 1, 100)
            .unwrap();
        assert_eq!(tokens_to_string(&out), r#""42""#);
    }

    #[test]
    fn token_pasting_joins_identifiers() {
        let mut table = MacroTable::new();
        func(&mut table, "CAT", &["a", "b"], "a##b", false);
        let expander = MacroExpander::new(&table);
        let out = expander
            .expand(&tokenize_line("CAT(foo, bar)"), "t.c", 1, 100)
            .unwrap();
        assert_eq!(tokens_to_string(&out), "foobar");
    }

    #[test]
    fn variadic_macro_joins_trailing_args_with_commas() {
        let mut table = MacroTable::new();
        func(&mut table, "LOG", &["fmt"], "fmt, __VA_ARGS__", true);
        let expander = MacroExpander::new(&table);
        let out = expander
            .expand(&tokenize_line(r#"LOG("x", 1, 2)"#), "t.c", 1, 100)
            .unwrap();
        assert_eq!(tokens_to_string(&out), r#""x", 1, 2"#);
    }

    #[test]
    fn wrong_argument_count_is_an_error() {
        let mut table = MacroTable::new();
        func(&mut table, "ADD", &["a", "b"], "a + b", false);
        let expander = MacroExpander::new(&table);
        let err = expander.expand(&tokenize_line("ADD(1)"), "t.c", 1, 100).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::PreprocessErrorKind::BadArgCount(_)
        ));
    }

    #[test]
    fn unterminated_argument_list_is_an_error() {
        let mut table = MacroTable::new();
        func(&mut table, "F", &["a"], "a", false);
        let expander = MacroExpander::new(&table);
        let err = expander.expand(&tokenize_line("F(1"), "t.c", 1, 100).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::PreprocessErrorKind::BadArgCount(_)
        ));
    }
}
