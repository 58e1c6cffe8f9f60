//! Directive classification, the `#if` conditional stack, and the directive
//! dispatch table (`#define`, `#undef`, `#include`, `#if`/`#elif`/`#else`/
//! `#endif`/`#ifdef`/`#ifndef`, `#error`, `#warning`, `#line`, `#pragma`).

use std::rc::Rc;

use crate::error::PreprocessError;
use crate::expander::{self, MacroExpander};
use crate::macro_table::{Macro, MacroTable};
use crate::token::Token;

/// Which half of an `#if`/`#else` chain a frame is currently in. Mirrors
/// spec.md §3's `IfFrame.state`: a frame starts `InIf` and moves to
/// `InElse` on its first `#else`; a second `#else`, or any `#elif` seen
/// after that, is a nesting error rather than a silent re-flip.
#[derive(Clone, Copy, PartialEq, Eq)]
enum IfState {
    InIf,
    InElse,
}

/// One nested `#if`/`#ifdef`/`#ifndef` chain.
struct IfFrame {
    /// Whether any branch so far in this chain has already been taken.
    taken: bool,
    /// Whether the *current* branch is the one being emitted.
    active: bool,
    state: IfState,
}

/// The `#if` conditional stack plus the single skip-depth counter spec's
/// design standardizes on: pushes happen only while still emitting, so
/// anything nested inside an already-skipped region is tracked purely by
/// incrementing/decrementing `skip_depth`, never touching the frame stack.
#[derive(Default)]
pub(crate) struct DirectiveEngine {
    frames: Vec<IfFrame>,
    skip_depth: u32,
}

impl DirectiveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a plain (non-directive) line should currently be emitted.
    pub fn can_emit(&self) -> bool {
        self.skip_depth == 0 && self.frames.iter().all(|f| f.active)
    }

    pub fn at_top_level(&self) -> bool {
        self.frames.is_empty() && self.skip_depth == 0
    }

    fn push_or_skip(&mut self, condition: bool) {
        if self.can_emit() {
            self.frames.push(IfFrame {
                taken: condition,
                active: condition,
                state: IfState::InIf,
            });
        } else {
            self.skip_depth += 1;
        }
    }

    pub fn handle_if(&mut self, condition: bool) {
        self.push_or_skip(condition);
    }

    pub fn handle_ifdef(&mut self, defined: bool) {
        self.push_or_skip(defined);
    }

    pub fn handle_ifndef(&mut self, defined: bool) {
        self.push_or_skip(!defined);
    }

    /// `condition` is only forced when no earlier branch in this chain has
    /// been taken yet, matching C's "don't evaluate an unreachable `#elif`".
    pub fn handle_elif(
        &mut self,
        file: &str,
        line: usize,
        condition: impl FnOnce() -> Result<bool, PreprocessError>,
    ) -> Result<(), PreprocessError> {
        if self.skip_depth > 0 {
            return Ok(());
        }
        let Some(frame) = self.frames.last_mut() else {
            return Err(PreprocessError::conditional_error(
                file.to_string(),
                line,
                "#elif without #if".to_string(),
            ));
        };
        if frame.state == IfState::InElse {
            return Err(PreprocessError::conditional_error(
                file.to_string(),
                line,
                "#elif after #else".to_string(),
            ));
        }
        if frame.taken {
            frame.active = false;
        } else {
            let cond = condition()?;
            frame.active = cond;
            frame.taken = cond;
        }
        Ok(())
    }

    pub fn handle_else(&mut self, file: &str, line: usize) -> Result<(), PreprocessError> {
        if self.skip_depth > 0 {
            return Ok(());
        }
        let Some(frame) = self.frames.last_mut() else {
            return Err(PreprocessError::conditional_error(
                file.to_string(),
                line,
                "#else without #if".to_string(),
            ));
        };
        if frame.state == IfState::InElse {
            return Err(PreprocessError::conditional_error(
                file.to_string(),
                line,
                "#else after #else".to_string(),
            ));
        }
        frame.active = !frame.taken;
        frame.taken = true;
        frame.state = IfState::InElse;
        Ok(())
    }

    pub fn handle_endif(&mut self, file: &str, line: usize) -> Result<(), PreprocessError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(());
        }
        if self.frames.pop().is_none() {
            return Err(PreprocessError::conditional_error(
                file.to_string(),
                line,
                "#endif without #if".to_string(),
            ));
        }
        Ok(())
    }

    pub fn check_balanced_at_eof(&self, file: &str, line: usize) -> Result<(), PreprocessError> {
        if self.skip_depth != 0 || !self.frames.is_empty() {
            return Err(PreprocessError::conditional_error(
                file.to_string(),
                line,
                "unterminated #if/#ifdef/#ifndef".to_string(),
            ));
        }
        Ok(())
    }

}

/// Split `"  define FOO 1"`-style directive text into `(command, rest)`.
pub(crate) fn split_directive(directive: &str) -> (&str, &str) {
    let mut parts = directive.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();
    (cmd, rest)
}

/// Strip a leading `#` from a source line, if present, returning the
/// directive text (still containing the command and its arguments).
pub(crate) fn extract_directive(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix('#').map(str::trim)
}

/// Parse a `#define` directive's argument text into a name and a [`Macro`].
/// Returns `None` if the name is missing (a malformed directive).
pub(crate) fn parse_define(
    rest: &str,
    current_file: &str,
    current_line: usize,
) -> Option<(String, Macro)> {
    let rest = rest.trim_start();
    let mut chars = rest.chars().peekable();
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if name.is_empty() {
        return None;
    }

    let mut params: Option<Vec<String>> = None;
    let mut is_variadic = false;

    if chars.peek() == Some(&'(') {
        chars.next();
        let mut param = String::new();
        let mut params_vec = Vec::new();
        loop {
            match chars.peek() {
                None => return None,
                Some(')') => {
                    if !param.trim().is_empty() {
                        params_vec.push(param.trim().to_string());
                    }
                    chars.next();
                    break;
                }
                Some(',') => {
                    params_vec.push(param.trim().to_string());
                    param.clear();
                    chars.next();
                }
                Some('.') => {
                    is_variadic = true;
                    chars.next();
                    if chars.peek() == Some(&'.') {
                        chars.next();
                        if chars.peek() == Some(&'.') {
                            chars.next();
                        }
                    }
                }
                Some(&c) => {
                    param.push(c);
                    chars.next();
                }
            }
        }
        params = Some(params_vec);
    }

    let body_str: String = chars.collect();
    let stripped = crate::input::strip_comments(&body_str);
    let body_tokens = expander::tokenize_line(stripped.trim());

    Some((
        name,
        Macro {
            params,
            is_variadic,
            body: Rc::new(body_tokens),
            definition_site: Some((current_file.to_string(), current_line)),
            is_builtin: false,
        },
    ))
}

/// Parse an `#include` target's quoting to recover the bare path and kind.
pub(crate) fn parse_include_target(rest: &str) -> Option<(String, crate::config::IncludeKind)> {
    let trimmed = rest.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        Some((
            trimmed[1..trimmed.len() - 1].to_string(),
            crate::config::IncludeKind::Local,
        ))
    } else if trimmed.starts_with('<') && trimmed.ends_with('>') && trimmed.len() >= 2 {
        Some((
            trimmed[1..trimmed.len() - 1].to_string(),
            crate::config::IncludeKind::System,
        ))
    } else {
        None
    }
}

/// Resolve `#line N ["file"]`, returning the 0-based line value to store
/// (the driver adds one per physical line already processed) and an
/// optional new current-file name.
pub(crate) fn parse_line_directive(rest: &str) -> Option<(usize, Option<String>)> {
    let mut parts = rest.split_whitespace();
    let line_num: usize = parts.next()?.parse().ok()?;
    let file = parts.next().map(|f| {
        f.strip_prefix('"')
            .and_then(|f| f.strip_suffix('"'))
            .unwrap_or(f)
            .to_string()
    });
    Some((line_num.saturating_sub(1), file))
}

/// Resolve every `defined X` / `defined(X)` occurrence to a literal `0`/`1`
/// token *before* macro expansion runs, exactly as C requires: the operand
/// of `defined` must never itself be macro-expanded.
fn resolve_defined_operator(tokens: &[Token], macros: &MacroTable) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let is_defined_ident = matches!(&tokens[i], Token::Identifier(s) if s == "defined");
        if !is_defined_ident {
            out.push(tokens[i].clone());
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while matches!(tokens.get(j), Some(t) if is_whitespace_token(t)) {
            j += 1;
        }
        let has_paren = matches!(tokens.get(j), Some(Token::Other(s)) if s == "(");
        if has_paren {
            j += 1;
            while matches!(tokens.get(j), Some(t) if is_whitespace_token(t)) {
                j += 1;
            }
        }
        let Some(Token::Identifier(name)) = tokens.get(j) else {
            out.push(tokens[i].clone());
            i += 1;
            continue;
        };
        let mut k = j + 1;
        if has_paren {
            while matches!(tokens.get(k), Some(t) if is_whitespace_token(t)) {
                k += 1;
            }
            if !matches!(tokens.get(k), Some(Token::Other(s)) if s == ")") {
                out.push(tokens[i].clone());
                i += 1;
                continue;
            }
            k += 1;
        } else {
            k = j + 1;
        }

        let value = if macros.is_defined(name) { "1" } else { "0" };
        out.push(Token::PpNumber(value.to_string()));
        i = k;
    }
    out
}

fn is_whitespace_token(token: &Token) -> bool {
    matches!(token, Token::Other(s) if !s.is_empty() && s.chars().all(char::is_whitespace))
}

/// Run the full `#if`/`#elif` constant-expression pipeline: resolve
/// `defined`, expand the remaining macros, then tokenize and evaluate.
#[allow(clippy::too_many_arguments)]
pub(crate) fn evaluate_condition(
    expander: &MacroExpander<'_>,
    macros: &MacroTable,
    expr_tokens: &[Token],
    file: &str,
    line: usize,
    max_restarts: usize,
) -> Result<bool, PreprocessError> {
    let with_defined_resolved = resolve_defined_operator(expr_tokens, macros);
    let expanded = expander.expand(&with_defined_resolved, file, line, max_restarts)?;
    let text = expander::tokens_to_string(&expanded);
    if text.trim().is_empty() {
        // if_clause_mode: a macro (or the whole clause) that expands to
        // nothing reads as the constant 0, not a syntax error.
        return Ok(false);
    }
    let expr_toks = crate::expr::tokenize(&text, file, line)?;
    let value = crate::expr::evaluate(&expr_toks, |id| macros.is_defined(id), file, line)?;
    Ok(value != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_depth_absorbs_nested_if_inside_skipped_branch() {
        let mut engine = DirectiveEngine::new();
        engine.handle_if(false); // outer #if 0 -- now skipping
        assert!(!engine.can_emit());
        engine.handle_if(true); // nested #if inside skip -- skip_depth, not a frame
        assert!(!engine.can_emit());
        engine.handle_endif("f", 1).unwrap(); // closes nested, still skipping
        assert!(!engine.can_emit());
        engine.handle_endif("f", 1).unwrap(); // closes outer
        assert!(engine.can_emit());
    }

    #[test]
    fn elif_after_taken_branch_stays_inactive() {
        let mut engine = DirectiveEngine::new();
        engine.handle_if(true);
        engine.handle_elif("f", 1, || Ok(true)).unwrap();
        assert!(!engine.can_emit());
    }

    #[test]
    fn else_without_if_is_an_error() {
        let mut engine = DirectiveEngine::new();
        assert!(engine.handle_else("f", 1).is_err());
    }

    #[test]
    fn second_else_on_same_frame_is_an_error() {
        let mut engine = DirectiveEngine::new();
        engine.handle_if(true);
        engine.handle_else("f", 1).unwrap();
        assert!(engine.handle_else("f", 2).is_err());
    }

    #[test]
    fn elif_after_else_is_an_error() {
        let mut engine = DirectiveEngine::new();
        engine.handle_if(true);
        engine.handle_else("f", 1).unwrap();
        assert!(engine.handle_elif("f", 2, || Ok(true)).is_err());
    }

    #[test]
    fn unterminated_if_detected_at_eof() {
        let mut engine = DirectiveEngine::new();
        engine.handle_if(true);
        assert!(engine.check_balanced_at_eof("f", 10).is_err());
    }

    #[test]
    fn parse_define_with_params_and_variadic() {
        let (name, mac) = parse_define("F(a, b, ...) a + b", "t.c", 1).unwrap();
        assert_eq!(name, "F");
        assert!(mac.is_variadic);
        assert_eq!(mac.params.unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn parse_line_directive_sets_pending_line_and_file() {
        let (line, file) = parse_line_directive(r#"100 "foo.c""#).unwrap();
        assert_eq!(line, 99);
        assert_eq!(file.as_deref(), Some("foo.c"));
    }

    #[test]
    fn defined_operand_is_not_macro_expanded() {
        let mut macros = MacroTable::new();
        macros.define(
            "FOO".to_string(),
            Macro {
                params: None,
                is_variadic: false,
                body: Rc::new(expander::tokenize_line("999")),
                definition_site: None,
                is_builtin: false,
            },
        );
        let expander_ = MacroExpander::new(&macros);
        let tokens = expander::tokenize_line("defined(FOO)");
        let result = evaluate_condition(&expander_, &macros, &tokens, "t.c", 1, 100).unwrap();
        assert!(result);
    }

    #[test]
    fn empty_object_macro_in_condition_evaluates_to_false() {
        let mut macros = MacroTable::new();
        macros.define(
            "E".to_string(),
            Macro {
                params: None,
                is_variadic: false,
                body: Rc::new(Vec::new()),
                definition_site: None,
                is_builtin: false,
            },
        );
        let expander_ = MacroExpander::new(&macros);
        let tokens = expander::tokenize_line("E");
        let result = evaluate_condition(&expander_, &macros, &tokens, "t.c", 1, 100).unwrap();
        assert!(!result);
    }
}
