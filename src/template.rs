//! Script template rendering.
//!
//! Templates use a logic-less, mustache-style placeholder syntax: `{{name}}`,
//! `{{{name}}}` or `{{& name}}`, optionally padded with spaces inside the
//! braces. A placeholder is replaced by the parameter value verbatim; there is
//! no escaping, so the three forms are equivalent. `{{! comment }}` renders as
//! nothing. Sections, inverted sections and partials (`{{#`, `{{^`, `{{/`,
//! `{{>`) are not supported and fail as malformed.
//!
//! Missing parameters render as the empty string unless the renderer is
//! strict. Substituted values are never scanned again, so a value that itself
//! contains braces is inserted as-is.

use crate::error::{Result, RunError};
use crate::request::ParameterSet;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Triple braces first so `{{{x}}}` is not read as `{` + `{{x}}` + `}`
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"\{\{\{\s*([A-Za-z0-9_]+)\s*\}\}\}",
            r"|\{\{&\s*([A-Za-z0-9_]+)\s*\}\}",
            r"|\{\{\s*([A-Za-z0-9_]+)\s*\}\}",
            r"|\{\{!(?s:.*?)\}\}",
        ))
        .expect("valid placeholder regex")
    })
}

fn malformed(script_name: &str, offset: usize) -> RunError {
    RunError::MalformedTemplate {
        script: script_name.to_string(),
        offset,
    }
}

/// What to do with a placeholder that has no parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Render the placeholder as an empty string
    #[default]
    Empty,
    /// Fail with [`RunError::MissingParameter`]
    Fail,
}

/// Renders script templates against a [`ParameterSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    missing: MissingPolicy,
}

impl Renderer {
    /// Renderer with the default empty-on-missing policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer that rejects placeholders without a parameter
    pub fn strict() -> Self {
        Self::with_policy(MissingPolicy::Fail)
    }

    pub fn with_policy(missing: MissingPolicy) -> Self {
        Self { missing }
    }

    /// Render `template` for `script_name`.
    ///
    /// `script_name` is only used to label errors and traces.
    pub fn render(&self, script_name: &str, template: &str, params: &ParameterSet) -> Result<String> {
        let mut rendered = String::with_capacity(template.len());
        let mut used = BTreeSet::new();
        let mut last = 0;

        for captures in placeholder_pattern().captures_iter(template) {
            let Some(whole) = captures.get(0) else {
                continue;
            };

            let literal = &template[last..whole.start()];
            check_literal(script_name, literal, last)?;
            // A brace on either side would join with the braces of a
            // neighbouring literal once the placeholder renders empty
            if literal.ends_with('{') {
                return Err(malformed(script_name, whole.start() - 1));
            }
            if template[whole.end()..].starts_with('}') {
                return Err(malformed(script_name, whole.end()));
            }
            rendered.push_str(literal);
            last = whole.end();

            // Comments have no name group
            let Some(name) = (1..=3).find_map(|i| captures.get(i)) else {
                continue;
            };
            let name = name.as_str();

            match params.get(name) {
                Some(value) => {
                    used.insert(name);
                    rendered.push_str(value);
                }
                None => match self.missing {
                    MissingPolicy::Empty => {
                        tracing::warn!(
                            script = script_name,
                            placeholder = name,
                            "template placeholder has no parameter, rendering empty"
                        );
                    }
                    MissingPolicy::Fail => {
                        return Err(RunError::MissingParameter {
                            name: name.to_string(),
                        });
                    }
                },
            }
        }

        let tail = &template[last..];
        check_literal(script_name, tail, last)?;
        rendered.push_str(tail);

        let unused: Vec<&str> = params.names().filter(|n| !used.contains(n)).collect();
        if !unused.is_empty() {
            tracing::debug!(script = script_name, ?unused, "parameters not referenced by template");
        }

        Ok(rendered)
    }
}

/// Reject stray mustache delimiters in text between placeholders.
fn check_literal(script_name: &str, literal: &str, base: usize) -> Result<()> {
    let stray = [literal.find("{{"), literal.find("}}")]
        .into_iter()
        .flatten()
        .min();
    match stray {
        Some(offset) => Err(malformed(script_name, base + offset)),
        None => Ok(()),
    }
}

/// Render with the default policy.
pub fn render(script_name: &str, template: &str, params: &ParameterSet) -> Result<String> {
    Renderer::new().render(script_name, template, params)
}
