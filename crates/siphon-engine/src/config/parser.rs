//! Service config YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::ServiceConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        std::env::var(var_name).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == var_name) {
                missing.push(var_name.to_string());
            }
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a service config YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml_str: &str) -> Result<ServiceConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: ServiceConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse service config YAML")?;
    Ok(config)
}

/// Parse a service config YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_config(path: &Path) -> Result<ServiceConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SourceKind;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SIPHON_TEST_HOST", "ch.example.com");
        let input = "host: ${SIPHON_TEST_HOST}\nport: 9005";
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("ch.example.com"));
        assert!(!result.contains("${SIPHON_TEST_HOST}"));
        std::env::remove_var("SIPHON_TEST_HOST");
    }

    #[test]
    fn test_repeated_env_var_is_replaced_everywhere() {
        std::env::set_var("SIPHON_TEST_REPEAT", "x");
        let result = substitute_env_vars("${SIPHON_TEST_REPEAT}-${SIPHON_TEST_REPEAT}").unwrap();
        assert_eq!(result, "x-x");
        std::env::remove_var("SIPHON_TEST_REPEAT");
    }

    #[test]
    fn test_no_env_vars_passthrough() {
        let input = "host: localhost\nport: 9005";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_multiple_missing_env_vars_all_reported() {
        let input = "${SIPHON_MISSING_X} and ${SIPHON_MISSING_Y} and ${SIPHON_MISSING_X}";
        let err_msg = substitute_env_vars(input).unwrap_err().to_string();
        assert!(err_msg.contains("SIPHON_MISSING_X"));
        assert!(err_msg.contains("SIPHON_MISSING_Y"));
        assert_eq!(err_msg.matches("SIPHON_MISSING_X").count(), 1);
    }

    #[test]
    fn test_parse_config_from_string() {
        std::env::set_var("SIPHON_TEST_PG_PASS", "secret");
        let yaml = r#"
version: "1.0"
source:
  kind: postgres
  host: localhost
  password: ${SIPHON_TEST_PG_PASS}
export:
  join_chunk_size: 1000
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.source.kind, SourceKind::Postgres);
        assert_eq!(config.source.settings["password"], "secret");
        assert_eq!(config.export.join_chunk_size, 1000);
        std::env::remove_var("SIPHON_TEST_PG_PASS");
    }

    #[test]
    fn test_parse_invalid_yaml_errors() {
        assert!(parse_config_str("this is not: [valid: yaml: {{{}}}").is_err());
    }

    #[test]
    fn test_parse_config_file_not_found() {
        let err_msg = parse_config(Path::new("/nonexistent/siphon.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err_msg.contains("Failed to read config file"));
    }
}
