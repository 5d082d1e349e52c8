//! `${name}` substitution for step parameters
//!
//! Runtime arguments win over declared variables. Unknown tokens are left in
//! place so that shell lines such as `echo ${HOME}` reach the shell intact.
//!
//! ```rust
//! use buildstep::pipeline::{resolve_str, VariableSet};
//! use std::collections::HashMap;
//!
//! let vars = VariableSet::new().with("dir", "/opt/app");
//! let args = HashMap::from([("dir".to_string(), "/srv/app".to_string())]);
//! assert_eq!(resolve_str("ls ${dir} ${HOME}", &vars, &args), "ls /srv/app ${HOME}");
//! ```

use crate::pipeline::params::Params;
use crate::pipeline::variables::VariableSet;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^{}$]+)\}").expect("token pattern is valid"));

/// Resolves every token in a string
///
/// The input is scanned once; substituted values are not scanned again.
#[must_use]
pub fn resolve_str(input: &str, vars: &VariableSet, args: &HashMap<String, String>) -> String {
    TOKEN_PATTERN
        .replace_all(input, |caps: &Captures| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            args.get(name)
                .map(String::as_str)
                .or_else(|| vars.get(name))
                .map_or_else(|| caps[0].to_string(), ToString::to_string)
        })
        .into_owned()
}

/// Resolves tokens throughout a parameter payload, keeping its shape
///
/// Mapping keys and typed leaves are left untouched.
#[must_use]
pub fn resolve(params: &Params, vars: &VariableSet, args: &HashMap<String, String>) -> Params {
    match params {
        Params::Scalar(s) => Params::Scalar(resolve_str(s, vars, args)),
        Params::List(items) => {
            Params::List(items.iter().map(|s| resolve_str(s, vars, args)).collect())
        }
        Params::Mapping(map) => Params::Mapping(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, vars, args)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Returns the distinct token names referenced by a string, in order
#[must_use]
pub fn referenced_names(input: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in TOKEN_PATTERN.captures_iter(input) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
