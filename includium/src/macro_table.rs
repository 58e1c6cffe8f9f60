//! The macro symbol table: definitions, banning, and lookup.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::token::Token;

/// Either an object-like macro (`#define NAME body`) or a function-like one
/// (`#define NAME(params) body`), with its variadic flag folded into the
/// parameter list's shape.
#[derive(Clone, Debug)]
pub struct Macro {
    pub params: Option<Vec<String>>,
    pub is_variadic: bool,
    pub body: Rc<Vec<Token>>,
    /// `(file, line)` of the `#define` that created this, or `None` for
    /// built-ins seeded by `PreprocessorConfig`.
    pub definition_site: Option<(String, usize)>,
    pub is_builtin: bool,
}

impl Macro {
    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }
}

/// Insertion-ordered map of macro definitions plus the set of names a caller
/// has banned (typically reserved/predefined names the driver won't let
/// `#define`/`#undef` touch).
#[derive(Clone, Default)]
pub(crate) struct MacroTable {
    order: Vec<String>,
    macros: HashMap<String, Macro>,
    banned: HashSet<String>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name so `define`/`undef` silently refuse to touch it.
    pub fn ban(&mut self, name: impl Into<String>) {
        self.banned.insert(name.into());
    }

    pub fn is_banned(&self, name: &str) -> bool {
        self.banned.contains(name)
    }

    /// Insert or replace a macro definition. A no-op if `name` is banned.
    pub fn define(&mut self, name: String, mac: Macro) {
        if self.banned.contains(&name) {
            return;
        }
        if !self.macros.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.macros.insert(name, mac);
    }

    /// Remove a macro definition. A no-op if `name` is banned or undefined.
    pub fn undef(&mut self, name: &str) {
        if self.banned.contains(name) {
            return;
        }
        if self.macros.remove(name).is_some() {
            self.order.retain(|n| n != name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn as_map(&self) -> &HashMap<String, Macro> {
        &self.macros
    }

    /// Iterate definitions in the order they were first inserted.
    pub fn print_list(&self) -> impl Iterator<Item = (&str, &Macro)> {
        self.order
            .iter()
            .filter_map(move |name| self.macros.get(name).map(|m| (name.as_str(), m)))
    }

    pub fn clone_map(&self) -> HashMap<String, Macro> {
        self.macros.clone()
    }

    /// Replace this table's contents with a previously-cloned map, e.g. after
    /// merging macro definitions learned while processing a nested `#include`.
    pub fn restore_map(&mut self, macros: HashMap<String, Macro>) {
        self.order
            .retain(|n| macros.contains_key(n) || self.macros.contains_key(n));
        for name in macros.keys() {
            if !self.order.contains(name) {
                self.order.push(name.clone());
            }
        }
        self.macros = macros;
    }
}
