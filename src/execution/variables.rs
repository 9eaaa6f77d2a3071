//! Run Variables
//!
//! String-typed variables visible to every step of a run through
//! `{{name}}` placeholders.

use std::collections::HashMap;

use serde::Serialize;

/// Mutable name to value mapping owned by one run.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    values: HashMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from caller-supplied values.
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Adds workflow defaults for names not already defined.
    ///
    /// Values supplied by the caller (or a parent workflow) win.
    pub fn seed_defaults(&mut self, defaults: &HashMap<String, String>) {
        for (name, value) in defaults {
            self.values
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Replaces every `{{name}}` with the variable's value.
    ///
    /// Whitespace inside the braces is ignored. Placeholders naming an
    /// undefined variable are left as written.
    ///
    /// ```
    /// use tapflow::execution::VariableStore;
    ///
    /// let mut vars = VariableStore::new();
    /// vars.set("user", "demo");
    /// assert_eq!(vars.substitute("hi {{ user }} {{other}}"), "hi demo {{other}}");
    /// ```
    pub fn substitute(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find("{{") {
            output.push_str(&rest[..open]);
            let after_open = &rest[open + 2..];

            let Some(close) = after_open.find("}}") else {
                output.push_str(&rest[open..]);
                return output;
            };

            let name = after_open[..close].trim();
            match self.values.get(name) {
                Some(value) => output.push_str(value),
                None => output.push_str(&rest[open..open + 2 + close + 2]),
            }
            rest = &after_open[close + 2..];
        }

        output.push_str(rest);
        output
    }
}
