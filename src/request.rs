//! Run request validation.
//!
//! Turns the raw command-line inputs (script name, `NAME=VALUE` tokens and
//! option flags) into an immutable [`RunRequest`]. Nothing here touches the
//! network: every error raised by this module is reported before the target
//! is contacted.

use crate::config_file::{ScriptCatalog, is_session_safe};
use crate::error::{Result, RunError};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn parameter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `(?s)` lets a value span lines
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^([A-Za-z0-9_]+)=(.*)$").expect("valid parameter regex")
    })
}

/// Script parameters for one invocation, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet(BTreeMap<String, String>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Parse `NAME=VALUE` tokens, rejecting malformed tokens and repeated names.
    pub fn parse<S: AsRef<str>>(raw_params: &[S]) -> Result<Self> {
        let mut params = BTreeMap::new();
        for raw in raw_params {
            let (name, value) = parse_parameter(raw.as_ref())?;
            if params.contains_key(&name) {
                return Err(RunError::DuplicateParameter { name });
            }
            params.insert(name, value);
        }
        Ok(Self(params))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Split one `NAME=VALUE` token. The value may be empty or contain `=`.
pub fn parse_parameter(raw: &str) -> Result<(String, String)> {
    let captures = parameter_pattern()
        .captures(raw)
        .ok_or_else(|| RunError::InvalidParameterFormat {
            param: raw.to_string(),
        })?;
    Ok((captures[1].to_string(), captures[2].to_string()))
}

/// Option flags of the `run` command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub session_name: Option<String>,
    pub sync: bool,
    pub logging: bool,
    pub restart: bool,
}

/// A validated run request. Only [`RunRequest::validate`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    script_name: String,
    params: ParameterSet,
    session_name: Option<String>,
    sync: bool,
    logging: bool,
    restart: bool,
}

impl RunRequest {
    /// Validate raw inputs against the catalog.
    ///
    /// Checks run in a fixed order: script existence, then each parameter in
    /// input order, then the explicit session name.
    pub fn validate<C, S>(
        script_name: &str,
        raw_params: &[S],
        options: RunOptions,
        catalog: &C,
    ) -> Result<Self>
    where
        C: ScriptCatalog + ?Sized,
        S: AsRef<str>,
    {
        if catalog.script(script_name).is_none() {
            return Err(RunError::UnknownScript {
                name: script_name.to_string(),
                available: catalog.script_names(),
            });
        }

        let params = ParameterSet::parse(raw_params)?;

        if let Some(ref name) = options.session_name {
            if !is_session_safe(name) {
                return Err(RunError::InvalidSessionName { name: name.clone() });
            }
        }

        tracing::debug!(
            script = script_name,
            params = params.len(),
            "run request validated"
        );
        tracing::trace!(?params, "run request parameters");

        Ok(Self {
            script_name: script_name.to_string(),
            params,
            session_name: options.session_name,
            sync: options.sync,
            logging: options.logging,
            restart: options.restart,
        })
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Explicit session name, if the caller gave one
    pub fn session_name(&self) -> Option<&str> {
        self.session_name.as_deref()
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn logging(&self) -> bool {
        self.logging
    }

    pub fn restart(&self) -> bool {
        self.restart
    }
}
