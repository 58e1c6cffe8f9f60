#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # C Preprocessor Library
//!
//! This library provides a complete C preprocessor implementation that can process
//! C/C++ source code with macros, conditional compilation, and includes. It supports
//! target-specific preprocessing for different operating systems and compilers.
//!
//! ## Features
//!
//! - Macro expansion (object-like, function-like, and variadic macros)
//! - Conditional compilation (`#ifdef`, `#ifndef`, `#if`, `#else`, `#elif`, `#endif`)
//! - Include processing with custom resolvers
//! - Target-specific macro definitions (Linux, Windows, macOS)
//! - Compiler-specific macro definitions (GCC, Clang, MSVC)
//!
//! ## Example
//!
//! ```rust,no_run
//! use includium::PreprocessorConfig;
//!
//! let code = r#"
//! #define PI 3.14
//! #ifdef __linux__
//! const char* platform = "Linux";
//! #endif
//! "#;
//!
//! let config = PreprocessorConfig::for_linux();
//! let result = includium::process(code, &config).unwrap();
//! //println!("{}", result);
//! ```

mod config;
mod date_time;
mod directive;
mod driver;
mod error;
mod expander;
mod expr;
mod input;
mod macro_table;
mod token;

pub use config::{
    Compiler, IncludeContext, IncludeKind, IncludeResolver, PreprocessorConfig, Target,
    WarningHandler,
};
pub use driver::PreprocessorDriver;
pub use error::{PreprocessError, PreprocessErrorKind};
pub use input::find_include_file;
pub use macro_table::Macro;

// Re-export Preprocessor as an alias to PreprocessorDriver for callers who
// think of this as "the preprocessor" rather than "a driver for one".
pub use PreprocessorDriver as Preprocessor;

use std::fs;
use std::path::Path;

/// Preprocess C code with the given configuration.
/// This automatically defines target and compiler-specific macros.
///
/// # Errors
/// Returns `PreprocessError` if the input code has malformed directives,
/// macro recursion limits are exceeded, or I/O errors occur during include resolution.
pub fn process<S: AsRef<str>>(
    input: S,
    config: &PreprocessorConfig,
) -> Result<String, PreprocessError> {
    let mut driver = PreprocessorDriver::new();
    driver.apply_config(config);
    driver.process(input.as_ref())
}

/// Preprocess a C file and write the result to another file.
///
/// # Errors
/// Returns `PreprocessError` if the input file cannot be read,
/// the output file cannot be written, or if preprocessing fails.
pub fn process_file<P: AsRef<Path>>(
    input_path: P,
    output_path: P,
    config: &PreprocessorConfig,
) -> Result<(), PreprocessError> {
    let input = fs::read_to_string(input_path)?;
    let output = process(&input, config)?;
    fs::write(output_path, output)?;
    Ok(())
}

/// Preprocess a C file and return the result as a string.
///
/// # Errors
/// Returns `PreprocessError` if the file cannot be read or if preprocessing fails.
pub fn preprocess_c_file_to_string<P: AsRef<Path>>(
    input_path: P,
    config: &PreprocessorConfig,
) -> Result<String, PreprocessError> {
    let input = fs::read_to_string(input_path)?;
    process(&input, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_object_macro() {
        let src = "\n#define PI 3.14\nfloat x = PI;\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("3.14"));
    }

    #[test]
    fn function_like_macro() {
        let src = "\n#define ADD(a, b) ((a)+(b))\nint z = ADD(1, 2);\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("((1)+(2))"));
    }

    #[test]
    fn variadic_macro_forwards_trailing_arguments() {
        let src = "\n#define LOG(fmt, ...) printf(fmt, __VA_ARGS__)\nLOG(\"x\", 1, 2);\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains(r#"printf("x", 1, 2);"#));
    }

    #[test]
    fn self_referential_macro_expands_once() {
        let src = "\n#define A B\n#define B A\nint x = A;\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        // blue paint stops the A -> B -> A cycle; one of the two names survives
        assert!(out.contains("int x = A;") || out.contains("int x = B;"));
    }

    #[test]
    fn wrong_argument_count_is_reported() {
        let src = "\n#define ADD(a, b) a + b\nint z = ADD(1);\n";
        let mut pp = Preprocessor::new();
        let err = pp.process(src).unwrap_err();
        assert!(matches!(err.kind(), PreprocessErrorKind::BadArgCount(_)));
    }

    #[test]
    fn ifdef_selects_defined_branch() {
        let src = "\n#define FEATURE\n#ifdef FEATURE\nint on = 1;\n#else\nint on = 0;\n#endif\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("int on = 1;"));
        assert!(!out.contains("int on = 0;"));
    }

    #[test]
    fn nested_conditional_inside_skipped_branch_is_invisible() {
        let src = "\n#if 0\n#if 1\nint hidden = 1;\n#endif\n#endif\nint visible = 1;\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(!out.contains("hidden"));
        assert!(out.contains("visible"));
    }

    #[test]
    fn elif_chain_picks_first_true_branch() {
        let src = "\n#define X 2\n#if X == 1\nint v = 1;\n#elif X == 2\nint v = 2;\n#else\nint v = 3;\n#endif\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("int v = 2;"));
    }

    #[test]
    fn defined_operator_reflects_macro_table() {
        let src = "\n#define FOO\n#if defined(FOO) && !defined(BAR)\nint ok = 1;\n#endif\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("int ok = 1;"));
    }

    #[test]
    fn unterminated_if_is_an_error() {
        let src = "\n#if 1\nint x;\n";
        let mut pp = Preprocessor::new();
        let err = pp.process(src).unwrap_err();
        assert!(matches!(err.kind(), PreprocessErrorKind::BadCondNesting(_)));
    }

    #[test]
    fn line_and_file_builtins_track_current_position() {
        let src = "\nconst char* file = __FILE__;\nint line = __LINE__;\n";
        let mut pp = Preprocessor::new();
        pp.set_current_file("demo.c".to_string());
        let out = pp.process(src).unwrap();
        assert!(out.contains(r#""demo.c""#));
        assert!(out.contains("int line = 3;"));
    }

    #[test]
    fn include_resolver_merges_nested_definitions() {
        let src = "\n#include \"inc.h\"\nint x = FOO;\n";
        let mut pp = Preprocessor::new().with_include_resolver(|p, _kind, _ctx| {
            if p == "inc.h" {
                Some("#define FOO 42\n".to_string())
            } else {
                None
            }
        });
        let out = pp.process(src).unwrap();
        assert!(out.contains("int x = 42;"));
    }

    #[test]
    fn include_cycle_is_rejected() {
        let src = "\n#include \"self.h\"\n";
        let mut pp = Preprocessor::new().with_include_resolver(|p, _kind, ctx| {
            if p == "self.h" && !ctx.include_stack.contains(&"self.h".to_string()) {
                Some("#include \"self.h\"\n".to_string())
            } else {
                None
            }
        });
        let err = pp.process(src).unwrap_err();
        assert!(matches!(err.kind(), PreprocessErrorKind::IncludeNotFound(_)));
    }

    #[test]
    fn pragma_once_is_included_a_single_time() {
        let src = "\n#include \"once.h\"\n#include \"once.h\"\nint x = FOO;\n";
        let mut pp = Preprocessor::new().with_include_resolver(|p, _kind, _ctx| {
            if p == "once.h" {
                Some("#pragma once\n#define FOO 1\n".to_string())
            } else {
                None
            }
        });
        let out = pp.process(src).unwrap();
        assert_eq!(out.matches("#define FOO").count(), 0);
        assert!(out.contains("int x = 1;"));
    }

    #[test]
    fn unresolved_include_is_an_error() {
        let src = "\n#include \"missing.h\"\n";
        let mut pp = Preprocessor::new().with_include_resolver(|_p, _kind, _ctx| None);
        let err = pp.process(src).unwrap_err();
        assert!(matches!(err.kind(), PreprocessErrorKind::IncludeNotFound(_)));
    }

    #[test]
    fn error_directive_halts_processing_with_message() {
        let src = "\n#ifndef FOO\n#error \"FOO must be defined\"\n#endif\n";
        let mut pp = Preprocessor::new();
        let err = pp.process(src).unwrap_err();
        assert!(err.to_string().contains("FOO must be defined"));
    }

    #[test]
    fn error_directive_inside_skipped_branch_is_silent() {
        let src = "\n#if 0\n#error \"never reached\"\n#endif\nint x = 1;\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("int x = 1;"));
    }

    #[test]
    fn line_directive_rewrites_current_position() {
        let src = "\n#line 100 \"generated.c\"\nint x = __LINE__;\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("int x = 100;"));
    }

    #[test]
    fn multiline_block_comments_are_elided_without_shifting_later_lines() {
        let src = "\nint a;\n/* this\nspans\nseveral lines */\nint line = __LINE__;\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("int line = 6;"));
    }

    #[test]
    fn string_literal_contents_are_never_macro_expanded() {
        let src = "\n#define FOO 42\nconst char *s = \"FOO is not a macro\";\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("FOO is not a macro"));
    }

    #[test]
    fn undef_removes_a_definition() {
        let mut pp = Preprocessor::new();
        pp.define("FOO", None, "1", false);
        assert!(pp.is_defined("FOO"));
        pp.undef("FOO");
        assert!(!pp.is_defined("FOO"));
    }

    #[test]
    fn linux_config_predefines_target_macros() {
        let config = PreprocessorConfig::for_linux();
        let out = process("#ifdef __linux__\nint ok = 1;\n#endif\n", &config).unwrap();
        assert!(out.contains("int ok = 1;"));
    }

    #[test]
    fn windows_config_predefines_msvc_macros() {
        let config = PreprocessorConfig::for_windows();
        let out = process("#if defined(_WIN32) && _MSC_VER >= 1900\nint ok = 1;\n#endif\n", &config).unwrap();
        assert!(out.contains("int ok = 1;"));
    }

    #[test]
    fn cli_define_is_visible_to_conditionals() {
        let config = PreprocessorConfig::for_linux().define("DEBUG=1");
        let out = process("#if DEBUG\nint ok = 1;\n#endif\n", &config).unwrap();
        assert!(out.contains("int ok = 1;"));
    }

    #[test]
    fn token_pasting_builds_new_identifiers() {
        let src = "\n#define CAT(a, b) a##b\nint CAT(foo, bar) = 1;\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains("int foobar = 1;"));
    }

    #[test]
    fn stringification_quotes_argument_text() {
        let src = "\n#define STR(x) #x\nconst char *s = STR(hello world);\n";
        let mut pp = Preprocessor::new();
        let out = pp.process(src).unwrap();
        assert!(out.contains(r#""hello world""#));
    }
}
