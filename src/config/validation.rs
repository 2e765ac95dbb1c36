//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

const SUPPORTED_SCHEMES: [&str; 1] = ["http"];

/// Validate the configuration.
///
/// Checks for:
/// - Non-empty, unique node addresses
/// - Weights of at least 1 and supported schemes
/// - Non-zero pool timeouts
/// - P2C tuning within range
/// - A known log level
///
/// An empty node list is valid; selection fails until nodes are applied.
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing the problem.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();
    let mut addresses = HashSet::new();

    for node in &config.nodes {
        if node.address.trim().is_empty() {
            errors.push("node address cannot be empty".to_string());
            continue;
        }

        if !addresses.insert(node.address.as_str()) {
            errors.push(format!("duplicate node address: {}", node.address));
        }

        if node.weight == Some(0) {
            errors.push(format!(
                "node {} has weight 0 (must be >= 1)",
                node.address
            ));
        }

        if !SUPPORTED_SCHEMES.contains(&node.scheme.as_str()) {
            errors.push(format!(
                "node {} uses unsupported scheme '{}', must be one of: {}",
                node.address,
                node.scheme,
                SUPPORTED_SCHEMES.join(", ")
            ));
        }
    }

    // Validate pool timeouts
    let pool = &config.pool;
    if pool.connect_timeout.is_zero() {
        errors.push("pool connect_timeout must be greater than zero".to_string());
    }
    if pool.idle_timeout.is_zero() {
        errors.push("pool idle_timeout must be greater than zero".to_string());
    }
    if pool.request_timeout.is_some_and(|t| t.is_zero()) {
        errors.push("pool request_timeout must be greater than zero".to_string());
    }

    // Validate P2C tuning
    let p2c = &config.selector.p2c;
    if !(p2c.decay > 0.0 && p2c.decay < 1.0) {
        errors.push(format!("p2c decay {} must be between 0 and 1", p2c.decay));
    }
    if !(p2c.error_penalty >= 1.0) {
        errors.push(format!(
            "p2c error_penalty {} must be at least 1",
            p2c.error_penalty
        ));
    }
    if p2c.force_pick.is_zero() {
        errors.push("p2c force_pick must be greater than zero".to_string());
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
