use crate::errors::{BrowserError, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;

use super::definition::Workflow;

const PLACEHOLDER: &str = r"\$\{([A-Za-z_][A-Za-z0-9_.-]*)\}";

/// Read a workflow definition from a `.yaml`, `.yml` or `.json` file.
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content, path)
}

pub fn parse_workflow(content: &str, path: &Path) -> Result<Workflow> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(serde_json::from_str(content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(content)?),
        other => Err(BrowserError::ConfigurationError(format!(
            "unsupported workflow format {:?} for {}",
            other,
            path.display()
        ))),
    }
}

/// Expand `${name}` from `vars`. Unknown names are an error, not an empty
/// string.
pub fn substitute(input: &str, vars: &HashMap<String, String>) -> Result<String> {
    let pattern =
        Regex::new(PLACEHOLDER).map_err(|e| BrowserError::ConfigurationError(e.to_string()))?;

    let mut missing = Vec::new();
    let output = pattern.replace_all(input, |caps: &Captures| match vars.get(&caps[1]) {
        Some(value) => value.clone(),
        None => {
            missing.push(caps[1].to_string());
            String::new()
        }
    });

    if !missing.is_empty() {
        return Err(BrowserError::ConfigurationError(format!(
            "unknown variable(s) {} in '{}'",
            missing.join(", "),
            input
        )));
    }
    Ok(output.into_owned())
}

/// `key=value`, as given to `--var`.
pub fn parse_var(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(BrowserError::ConfigurationError(format!(
            "expected key=value, got '{}'",
            raw
        ))),
    }
}
