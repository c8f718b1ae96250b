//! Template substitution for command executables, args, env values, and cwd (§4.1).

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::model::CommandSpec;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid placeholder regex"));

const SHELL_METACHARACTERS: &[char] = &['`', '|', ';', '&', '<', '>', '*', '?', '[', ']', '{', '}', '~', '#', '!', '$', '(', ')'];

/// Substitutes `{{ name }}` placeholders from a string→string variable mapping.
///
/// Unknown names resolve to the empty string, never an error. A designated set
/// of variable names is treated as user-controlled; when shell-escape mode is
/// on, substituting one of them wraps the value in POSIX single quotes. This
/// engine never invokes a shell itself; escaping exists for operators who
/// template into a command that does (see [`Engine::check`] instead for the
/// default, non-shell path).
#[derive(Debug, Clone)]
pub struct Engine {
    shell_escape: bool,
    user_controlled: HashSet<String>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            shell_escape: false,
            user_controlled: ["prompt"].into_iter().map(String::from).collect(),
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark additional variable names as user-controlled (`prompt` is always included).
    pub fn with_user_controlled(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.user_controlled.extend(names.into_iter().map(Into::into));
        self
    }

    /// Toggle shell-escape mode. Off by default: values are passed as argv
    /// entries, not through a shell, so escaping would corrupt them.
    pub fn with_shell_escape(mut self, enabled: bool) -> Self {
        self.shell_escape = enabled;
        self
    }

    /// Substitute all placeholders in `template` using `vars`.
    pub fn apply(&self, template: &str, vars: &HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                match vars.get(name) {
                    Some(value) if self.shell_escape && self.user_controlled.contains(name) => {
                        shell_single_quote(value)
                    }
                    Some(value) => value.clone(),
                    None => String::new(),
                }
            })
            .into_owned()
    }

    /// Apply substitution to every templated field of a command spec.
    pub fn apply_command(&self, spec: &config::CommandSpecConfig, vars: &HashMap<String, String>) -> CommandSpec {
        let env = spec
            .env
            .as_ref()
            .map(|env| {
                env.iter()
                    .map(|(k, v)| (k.clone(), self.apply(v, vars)))
                    .collect()
            })
            .unwrap_or_default();

        CommandSpec {
            executable: self.apply(&spec.executable, vars),
            args: spec.args.iter().map(|arg| self.apply(arg, vars)).collect(),
            env,
            cwd: spec.cwd.as_ref().map(|cwd| self.apply(cwd, vars)),
            timeout_ms: spec.timeout_ms,
        }
    }

    /// Human-readable warnings when a user-controlled variable's value contains
    /// shell metacharacters. Intended for operator logging, never for blocking
    /// execution: the executor never invokes a shell.
    pub fn check(&self, vars: &HashMap<String, String>) -> Vec<String> {
        let mut warnings = Vec::new();

        for name in &self.user_controlled {
            let Some(value) = vars.get(name) else { continue };

            let found: String = value.chars().filter(|c| SHELL_METACHARACTERS.contains(c)).collect();

            if !found.is_empty() {
                warnings.push(format!(
                    "variable '{name}' contains shell metacharacters ({found}); safe here because commands run without a shell"
                ));
            }
        }

        warnings
    }
}

/// Wrap `value` in POSIX single quotes, escaping embedded single quotes via `'"'"'`.
fn shell_single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn unknown_placeholder_resolves_to_empty_string() {
        let engine = Engine::new();
        assert_eq!(engine.apply("hello {{nope}}!", &HashMap::new()), "hello !");
    }

    #[test]
    fn substitutes_known_placeholder_with_optional_whitespace() {
        let engine = Engine::new();
        let vars = vars(&[("model", "gpt-5")]);
        assert_eq!(engine.apply("--model {{ model }}", &vars), "--model gpt-5");
        assert_eq!(engine.apply("--model {{model}}", &vars), "--model gpt-5");
    }

    #[test]
    fn applying_with_empty_vars_removes_every_known_placeholder_syntax() {
        let engine = Engine::new();
        let out = engine.apply("{{a}} {{ b }} {{c_1}}", &HashMap::new());
        assert_eq!(out, "  ");
    }

    #[test]
    fn shell_escape_off_by_default_passes_value_through() {
        let engine = Engine::new();
        let vars = vars(&[("prompt", "it's a test")]);
        assert_eq!(engine.apply("{{prompt}}", &vars), "it's a test");
    }

    #[test]
    fn shell_escape_wraps_user_controlled_value_and_round_trips_through_sh() {
        let engine = Engine::new().with_shell_escape(true);
        let vars = vars(&[("prompt", "it's a 'quoted' test")]);
        let escaped = engine.apply("{{prompt}}", &vars);

        // Simulate `/bin/sh -c "echo <escaped>"` by hand: single-quote escaping
        // reconstructs the original value byte-for-byte.
        assert_eq!(sh_unquote(&escaped), "it's a 'quoted' test");
    }

    #[test]
    fn shell_escape_only_applies_to_user_controlled_variables() {
        let engine = Engine::new().with_shell_escape(true);
        let vars = vars(&[("model", "weird;value")]);
        assert_eq!(engine.apply("{{model}}", &vars), "weird;value");
    }

    #[test]
    fn check_flags_metacharacters_in_user_controlled_values() {
        let engine = Engine::new();
        let vars = vars(&[("prompt", "rm -rf $(pwd) | cat")]);
        let warnings = engine.check(&vars);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("prompt"));
    }

    #[test]
    fn check_is_silent_for_clean_values() {
        let engine = Engine::new();
        let vars = vars(&[("prompt", "what is the weather today")]);
        assert!(engine.check(&vars).is_empty());
    }

    /// Minimal reimplementation of POSIX single-quote parsing, just enough to
    /// validate the escape idiom without shelling out in a unit test.
    fn sh_unquote(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars().peekable();
        let mut in_quotes = false;

        while let Some(c) = chars.next() {
            match c {
                '\'' if !in_quotes => in_quotes = true,
                '\'' if in_quotes => in_quotes = false,
                other => out.push(other),
            }
        }

        out
    }
}
