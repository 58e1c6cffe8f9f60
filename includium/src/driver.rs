//! Public API driver: wires the input pipeline, macro table, directive
//! engine and expander together into one `process()` call.

use std::collections::HashMap;
use std::collections::HashSet;
use std::rc::Rc;

use crate::config::{Compiler, IncludeContext, IncludeKind, PreprocessorConfig, Target};
use crate::directive::{self, DirectiveEngine};
use crate::error::PreprocessError;
use crate::expander::{self, MacroExpander};
use crate::input::InputPipeline;
use crate::macro_table::{Macro, MacroTable};

/// Public API driver for C preprocessing.
///
/// Owns the macro table and include-resolution state across a whole run,
/// including every nested `#include`, and exposes the line-oriented
/// `process()` entry point plain text goes in and out of.
pub struct PreprocessorDriver {
    macros: MacroTable,
    pipeline: InputPipeline,
    included_once: HashSet<String>,
    include_resolver: Option<crate::config::IncludeResolver>,
    warning_handler: Option<crate::config::WarningHandler>,
    compiler: Compiler,
    recursion_limit: usize,
    current_file: String,
    current_line: usize,
}

impl Default for PreprocessorDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PreprocessorDriver {
    /// Create a new preprocessor instance with default configuration.
    #[must_use]
    pub fn new() -> Self {
        let mut pipeline = InputPipeline::new();
        pipeline.seed_from_cpath();
        PreprocessorDriver {
            macros: MacroTable::new(),
            pipeline,
            included_once: HashSet::new(),
            include_resolver: None,
            warning_handler: None,
            compiler: Compiler::GCC,
            recursion_limit: 128,
            current_file: "<stdin>".to_string(),
            current_line: 1,
        }
    }

    /// Create a preprocessor with the given configuration.
    #[must_use]
    pub fn with_config(config: &PreprocessorConfig) -> Self {
        let mut driver = Self::new();
        driver.apply_config(config);
        driver
    }

    /// Apply configuration: target/compiler predefined macros, the
    /// recursion bound, hooks, and any `-D`/`-U` command-line definitions.
    pub fn apply_config(&mut self, config: &PreprocessorConfig) {
        self.compiler = config.compiler.clone();
        self.recursion_limit = config.recursion_limit;
        self.include_resolver.clone_from(&config.include_resolver);
        self.warning_handler.clone_from(&config.warning_handler);

        self.define_target_macros(&config.target);
        self.define_compiler_macros(&config.compiler);
        self.stub_compiler_intrinsics();
        self.define_sizeof_stubs();

        for undef in &config.cli_undefines {
            self.macros.ban(undef.clone());
        }
        for def in &config.cli_defines {
            self.define_builtin(&def.name, None, &def.value, false);
        }
    }

    fn define_target_macros(&mut self, target: &Target) {
        match target {
            Target::Linux => {
                self.define_builtin("__linux__", None, "1", false);
                self.define_builtin("__unix__", None, "1", false);
                self.define_builtin("__LP64__", None, "1", false);
            }
            Target::Windows => {
                self.define_builtin("_WIN32", None, "1", false);
                self.define_builtin("WIN32", None, "1", false);
                self.define_builtin("_WINDOWS", None, "1", false);
            }
            Target::MacOS => {
                self.define_builtin("__APPLE__", None, "1", false);
                self.define_builtin("__MACH__", None, "1", false);
                self.define_builtin("TARGET_OS_MAC", None, "1", false);
                self.define_builtin("__LP64__", None, "1", false);
            }
        }
    }

    fn define_compiler_macros(&mut self, compiler: &Compiler) {
        match compiler {
            Compiler::GCC => {
                self.define_builtin("__GNUC__", None, "11", false);
                self.define_builtin("__GNUC_MINOR__", None, "2", false);
                self.define_builtin("__GNUC_PATCHLEVEL__", None, "0", false);
                self.define_builtin("_GNU_SOURCE", None, "1", false);
            }
            Compiler::Clang => {
                self.define_builtin("__clang__", None, "1", false);
                self.define_builtin("__clang_major__", None, "14", false);
                self.define_builtin("__clang_minor__", None, "0", false);
                self.define_builtin("__clang_patchlevel__", None, "0", false);
            }
            Compiler::MSVC => {
                self.define_builtin("_MSC_VER", None, "1920", false);
                self.define_builtin("_MSC_FULL_VER", None, "192027508", false);
                self.define_builtin("WIN32_LEAN_AND_MEAN", None, "", false);
                self.define_builtin("_CRT_SECURE_NO_WARNINGS", None, "", false);
            }
        }
    }

    fn stub_compiler_intrinsics(&mut self) {
        self.define_builtin("__builtin_expect", None, "", false);
        self.define_builtin("__builtin_unreachable", None, "", false);
        self.define_builtin("__builtin_va_start", None, "", false);
        self.define_builtin("__builtin_va_arg", None, "", false);
        self.define_builtin("__builtin_va_end", None, "", false);
    }

    fn define_sizeof_stubs(&mut self) {
        self.define_builtin("__SIZEOF_INT__", None, "4", false);
        self.define_builtin("__SIZEOF_LONG__", None, "8", false);
        self.define_builtin("__SIZEOF_LONG_LONG__", None, "8", false);
        self.define_builtin("__SIZEOF_POINTER__", None, "8", false);
        self.define_builtin("__SIZEOF_SIZE_T__", None, "8", false);
        self.define_builtin("__SIZEOF_PTRDIFF_T__", None, "8", false);
    }

    fn define_builtin(&mut self, name: &str, params: Option<Vec<String>>, body: &str, is_variadic: bool) {
        self.macros.define(
            name.to_string(),
            Macro {
                params,
                is_variadic,
                body: Rc::new(expander::tokenize_line(body)),
                definition_site: None,
                is_builtin: true,
            },
        );
    }

    /// Add a custom include resolver function.
    #[must_use]
    pub fn with_include_resolver<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, IncludeKind, &IncludeContext) -> Option<String> + 'static,
    {
        self.include_resolver = Some(Rc::new(f));
        self
    }

    /// Add a directory to search for `#include <...>`/unresolved `"..."` targets.
    pub fn add_search_dir(&mut self, dir: impl Into<String>) {
        self.pipeline.add_search_dir(dir);
    }

    /// Set the maximum number of macro-expansion restarts (also the
    /// blue-paint depth backstop).
    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    /// Set the current file name for error reporting and `__FILE__`.
    pub fn set_current_file(&mut self, file: String) {
        self.current_file = file;
    }

    /// Define a preprocessor macro directly, bypassing `#define` parsing.
    pub fn define<S: AsRef<str>>(&mut self, name: S, params: Option<Vec<String>>, body: S, is_variadic: bool) {
        let stripped = crate::input::strip_comments(body.as_ref());
        let tokens = expander::tokenize_line(stripped.trim());
        self.macros.define(
            name.as_ref().to_string(),
            Macro {
                params,
                is_variadic,
                body: Rc::new(tokens),
                definition_site: Some((self.current_file.clone(), self.current_line)),
                is_builtin: false,
            },
        );
    }

    /// Remove a macro definition.
    pub fn undef(&mut self, name: &str) {
        self.macros.undef(name);
    }

    /// Get a reference to the defined macros.
    #[must_use]
    pub fn get_macros(&self) -> &HashMap<String, Macro> {
        self.macros.as_map()
    }

    /// Check if a macro is defined.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.is_defined(name)
    }

    fn directive_error(&self, directive: &str, line: &str) -> PreprocessError {
        let column = Self::calculate_column(line, directive);
        PreprocessError::malformed_directive(
            self.current_file.clone(),
            self.current_line,
            directive.to_string(),
        )
        .with_column(column)
        .with_source_line(line.to_string())
    }

    fn include_error(&self, path: &str, line: &str) -> PreprocessError {
        let column = Self::calculate_column(line, path);
        PreprocessError::include_not_found(self.current_file.clone(), self.current_line, path.to_string())
            .with_column(column)
            .with_source_line(line.to_string())
    }

    fn calculate_column(line: &str, substr: &str) -> usize {
        if substr.is_empty() {
            return 1;
        }
        if let Some(pos) = line.find(substr) {
            return pos + 1;
        }
        line.len() + 1
    }

    /// Process the input C code and return the preprocessed result.
    ///
    /// # Errors
    /// Returns `PreprocessError` if there's a malformed directive, macro
    /// expansion exceeds its restart bound, or conditional blocks are
    /// unterminated or unbalanced.
    pub fn process(&mut self, input: &str) -> Result<String, PreprocessError> {
        self.current_line = 1;
        self.process_text(input)
    }

    fn process_text(&mut self, input: &str) -> Result<String, PreprocessError> {
        let spliced = crate::input::line_splice(input);
        let normalized = crate::input::normalize_pragma_operator(&spliced);
        let commentless = crate::input::strip_comments(&normalized);
        let commentless = crate::input::collapse_whitespace(&commentless);

        let mut engine = DirectiveEngine::new();
        let mut out_lines: Vec<String> = Vec::new();

        for raw_line in commentless.lines() {
            if let Some(directive_text) = directive::extract_directive(raw_line) {
                if let Some(emitted) = self.handle_directive(&mut engine, directive_text, raw_line)? {
                    out_lines.push(emitted);
                }
            } else if engine.can_emit() {
                let tokens = expander::tokenize_line(raw_line);
                let expander_ = MacroExpander::new(&self.macros);
                let expanded =
                    expander_.expand(&tokens, &self.current_file, self.current_line, self.recursion_limit)?;
                out_lines.push(expander::tokens_to_string(&expanded));
            }
            self.current_line += 1;
        }

        engine.check_balanced_at_eof(&self.current_file, self.current_line)?;
        Ok(out_lines.join("\n"))
    }

    fn handle_directive(
        &mut self,
        engine: &mut DirectiveEngine,
        directive_text: &str,
        raw_line: &str,
    ) -> Result<Option<String>, PreprocessError> {
        let (cmd, rest) = directive::split_directive(directive_text);
        match cmd {
            "define" => self.handle_define(engine, rest),
            "undef" => {
                if engine.can_emit() {
                    self.macros.undef(rest.trim());
                }
                Ok(None)
            }
            "include" => self.handle_include(engine, rest, raw_line),
            "ifdef" => {
                let defined = self.macros.is_defined(rest.trim());
                engine.handle_ifdef(defined);
                Ok(None)
            }
            "ifndef" => {
                let defined = self.macros.is_defined(rest.trim());
                engine.handle_ifndef(defined);
                Ok(None)
            }
            "if" => self.handle_if(engine, rest),
            "elif" => self.handle_elif(engine, rest),
            "else" => {
                engine.handle_else(&self.current_file, self.current_line)?;
                Ok(None)
            }
            "endif" => {
                engine.handle_endif(&self.current_file, self.current_line)?;
                Ok(None)
            }
            "error" => self.handle_error(engine, rest, raw_line),
            "warning" => {
                self.handle_warning(engine, rest);
                Ok(None)
            }
            "line" => self.handle_line(engine, rest, raw_line),
            "pragma" => {
                self.handle_pragma(engine, rest);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn handle_define(&mut self, engine: &DirectiveEngine, rest: &str) -> Result<Option<String>, PreprocessError> {
        if !engine.can_emit() {
            return Ok(None);
        }
        let Some((name, mac)) = directive::parse_define(rest, &self.current_file, self.current_line) else {
            return Err(self.directive_error("define", rest));
        };
        self.macros.define(name, mac);
        Ok(None)
    }

    fn handle_include(
        &mut self,
        engine: &DirectiveEngine,
        rest: &str,
        raw_line: &str,
    ) -> Result<Option<String>, PreprocessError> {
        if !engine.can_emit() {
            return Ok(None);
        }
        let Some((target, kind)) = directive::parse_include_target(rest) else {
            return Err(self.directive_error("include", raw_line));
        };
        let Some(resolver) = self.include_resolver.clone() else {
            return Err(self.include_error(&target, raw_line));
        };

        if self.pipeline.contains(&target) {
            return Err(PreprocessError::include_not_found(
                self.current_file.clone(),
                self.current_line,
                format!("include cycle detected for '{target}'"),
            ));
        }

        let ctx = IncludeContext {
            include_stack: self.pipeline.names(),
            include_dirs: self.pipeline.search_dirs().to_vec(),
        };
        let Some(content) = resolver(&target, kind, &ctx) else {
            return Err(self.include_error(&target, raw_line));
        };

        if content.contains("#pragma once") && self.included_once.contains(&target) {
            return Ok(Some(String::new()));
        }

        self.pipeline.push(target.clone());
        let saved_file = std::mem::replace(&mut self.current_file, target.clone());
        let saved_line = self.current_line;
        self.current_line = 1;

        let result = self.process_text(&content);

        self.current_line = saved_line;
        self.current_file = saved_file;
        self.pipeline.pop();

        let processed = result?;
        if content.contains("#pragma once") {
            self.included_once.insert(target);
        }
        Ok(Some(processed))
    }

    fn handle_if(&mut self, engine: &mut DirectiveEngine, rest: &str) -> Result<Option<String>, PreprocessError> {
        if engine.can_emit() {
            let tokens = expander::tokenize_line(rest);
            let expander_ = MacroExpander::new(&self.macros);
            let cond = directive::evaluate_condition(
                &expander_,
                &self.macros,
                &tokens,
                &self.current_file,
                self.current_line,
                self.recursion_limit,
            )?;
            engine.handle_if(cond);
        } else {
            engine.handle_if(false);
        }
        Ok(None)
    }

    fn handle_elif(&mut self, engine: &mut DirectiveEngine, rest: &str) -> Result<Option<String>, PreprocessError> {
        let macros = &self.macros;
        let file = self.current_file.clone();
        let line = self.current_line;
        let limit = self.recursion_limit;
        let tokens = expander::tokenize_line(rest);
        engine.handle_elif(&file, line, || {
            let expander_ = MacroExpander::new(macros);
            directive::evaluate_condition(&expander_, macros, &tokens, &file, line, limit)
        })?;
        Ok(None)
    }

    fn handle_error(
        &self,
        engine: &DirectiveEngine,
        rest: &str,
        raw_line: &str,
    ) -> Result<Option<String>, PreprocessError> {
        if !engine.can_emit() {
            return Ok(None);
        }
        let msg = if rest.is_empty() {
            "#error directive".to_string()
        } else {
            format!("#error: {rest}")
        };
        Err(PreprocessError::user_error(self.current_file.clone(), self.current_line, msg)
            .with_source_line(raw_line.to_string()))
    }

    fn handle_warning(&self, engine: &DirectiveEngine, rest: &str) {
        if !engine.can_emit() {
            return;
        }
        let msg = if rest.is_empty() {
            "#warning directive".to_string()
        } else {
            format!("#warning: {rest}")
        };
        if let Some(handler) = &self.warning_handler {
            handler(&msg);
        }
    }

    fn handle_line(
        &mut self,
        engine: &DirectiveEngine,
        rest: &str,
        raw_line: &str,
    ) -> Result<Option<String>, PreprocessError> {
        if !engine.can_emit() {
            return Ok(None);
        }
        let Some((line, file)) = directive::parse_line_directive(rest) else {
            return Err(self.directive_error("line", raw_line));
        };
        self.current_line = line;
        if let Some(f) = file {
            self.current_file = f;
        }
        Ok(None)
    }

    fn handle_pragma(&mut self, engine: &DirectiveEngine, rest: &str) {
        if !engine.can_emit() {
            return;
        }
        if rest.trim() == "once" {
            self.included_once.insert(self.current_file.clone());
        }
    }
}
