//! Preprocessor configuration: target/compiler dialect, recursion limits, and
//! the include-resolution and warning hooks a caller plugs in.

use std::rc::Rc;

/// Kind of `#include` directive.
#[derive(Clone, Debug, PartialEq)]
pub enum IncludeKind {
    /// `#include "file.h"`
    Local,
    /// `#include <file.h>`
    System,
}

/// Context handed to an [`IncludeResolver`] so it can do cycle detection and
/// search-path resolution on its own terms.
#[derive(Clone, Debug, Default)]
pub struct IncludeContext {
    /// Files currently on the include stack, innermost last.
    pub include_stack: Vec<String>,
    /// Search directories, in the order they should be tried (`-I` order,
    /// then `CPATH`).
    pub include_dirs: Vec<String>,
}

/// Resolves an `#include` target to file contents, or `None` if not found.
pub type IncludeResolver = Rc<dyn Fn(&str, IncludeKind, &IncludeContext) -> Option<String>>;

/// Receives the formatted text of a `#warning` directive.
pub type WarningHandler = Rc<dyn Fn(&str)>;

/// Target operating system, used to seed `__linux__`-style predefined macros.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Linux,
    Windows,
    MacOS,
}

/// Compiler dialect, used to seed `__GNUC__`-style predefined macros.
#[derive(Clone, Debug, PartialEq)]
pub enum Compiler {
    GCC,
    Clang,
    MSVC,
}

/// A single `-D NAME`, `-D NAME=`, or `-D NAME=VALUE` command-line macro
/// definition, already split into name and replacement text.
#[derive(Clone, Debug)]
pub struct CliDefine {
    pub name: String,
    pub value: String,
}

impl CliDefine {
    /// Parse the canonical `-D` spelling: `NAME`, `NAME=`, or `NAME=VALUE`.
    /// `NAME` alone defines the macro to `1`, matching `cc`'s own behavior.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.splitn(2, '=');
        let name = parts.next()?.trim();
        if name.is_empty() {
            return None;
        }
        let value = parts.next().unwrap_or("1");
        Some(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// Configuration for the C preprocessor: everything the driver needs besides
/// the input text itself.
pub struct PreprocessorConfig {
    pub target: Target,
    pub compiler: Compiler,
    /// Bound on macro-expansion restarts; also doubles as the blue-paint
    /// expansion depth backstop (see `expander.rs`).
    pub recursion_limit: usize,
    pub include_resolver: Option<IncludeResolver>,
    pub warning_handler: Option<WarningHandler>,
    /// `-D`/`-U` definitions applied before the first line is processed.
    pub cli_defines: Vec<CliDefine>,
    pub cli_undefines: Vec<String>,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self::for_linux()
    }
}

impl PreprocessorConfig {
    #[must_use]
    pub fn for_linux() -> Self {
        Self {
            target: Target::Linux,
            compiler: Compiler::GCC,
            recursion_limit: 128,
            include_resolver: None,
            warning_handler: None,
            cli_defines: Vec::new(),
            cli_undefines: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_windows() -> Self {
        Self {
            target: Target::Windows,
            compiler: Compiler::MSVC,
            ..Self::for_linux()
        }
    }

    #[must_use]
    pub fn for_macos() -> Self {
        Self {
            target: Target::MacOS,
            compiler: Compiler::Clang,
            ..Self::for_linux()
        }
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = compiler;
        self
    }

    #[must_use]
    pub fn with_warning_handler(mut self, handler: WarningHandler) -> Self {
        self.warning_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn with_include_resolver(mut self, resolver: IncludeResolver) -> Self {
        self.include_resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Add a `-D` definition, parsed with [`CliDefine::parse`].
    #[must_use]
    pub fn define(mut self, spec: &str) -> Self {
        if let Some(d) = CliDefine::parse(spec) {
            self.cli_defines.push(d);
        }
        self
    }

    /// Add a `-U` undefinition.
    #[must_use]
    pub fn undefine(mut self, name: &str) -> Self {
        self.cli_undefines.push(name.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_define_parses_bare_name() {
        let d = CliDefine::parse("FOO").unwrap();
        assert_eq!(d.name, "FOO");
        assert_eq!(d.value, "1");
    }

    #[test]
    fn cli_define_parses_name_equals_value() {
        let d = CliDefine::parse("FOO=42").unwrap();
        assert_eq!(d.name, "FOO");
        assert_eq!(d.value, "42");
    }

    #[test]
    fn cli_define_parses_trailing_equals_as_empty() {
        let d = CliDefine::parse("FOO=").unwrap();
        assert_eq!(d.value, "");
    }
}
