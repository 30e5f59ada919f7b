// ABOUTME: Identifier validation and quoting helpers for ClickHouse SQL
// ABOUTME: Also sanitizes URLs and identifiers before they reach the logs

use anyhow::{bail, Result};

/// Validate a ClickHouse identifier (database, table, view, cluster).
///
/// Identifiers are spliced into DDL and INSERT statements, so only plain
/// names are accepted: ASCII letters, digits and underscores, not starting
/// with a digit, at most 127 characters.
///
/// # Examples
///
/// ```
/// # use tracker_import::utils::validate_identifier;
/// assert!(validate_identifier("tracker_issues").is_ok());
/// assert!(validate_identifier("_tmp").is_ok());
/// assert!(validate_identifier("1issues").is_err());
/// assert!(validate_identifier("issues; DROP TABLE x").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    if trimmed != identifier {
        bail!(
            "Identifier '{}' must not have leading or trailing whitespace",
            sanitize_identifier(identifier)
        );
    }

    if trimmed.len() > 127 {
        bail!(
            "Identifier '{}' exceeds maximum length of 127 characters (got {})",
            sanitize_identifier(trimmed),
            trimmed.len()
        );
    }

    let mut chars = trimmed.chars();
    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            bail!(
                "Identifier '{}' must start with a letter or underscore, not '{}'",
                sanitize_identifier(trimmed),
                first
            );
        }
    }

    for (i, c) in trimmed.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            bail!(
                "Identifier '{}' contains invalid character '{}' at position {}. \
                 Only letters, digits, and underscores are allowed",
                sanitize_identifier(trimmed),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Validate a cluster name: a plain identifier or a server macro such as `{cluster}`.
///
/// ```
/// # use tracker_import::utils::validate_cluster_name;
/// assert!(validate_cluster_name("analytics").is_ok());
/// assert!(validate_cluster_name("{cluster}").is_ok());
/// assert!(validate_cluster_name("{a}{b}").is_err());
/// ```
pub fn validate_cluster_name(name: &str) -> Result<()> {
    match name.strip_prefix('{').and_then(|inner| inner.strip_suffix('}')) {
        Some(inner) => validate_identifier(inner),
        None => validate_identifier(name),
    }
}

/// Sanitize an identifier for display: drops control characters, caps length.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Quote a ClickHouse identifier with backticks.
///
/// ```
/// # use tracker_import::utils::quote_ident;
/// assert_eq!(quote_ident("issues"), "`issues`");
/// assert_eq!(quote_ident("a`b"), "`a\\`b`");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('`');
    for ch in identifier.chars() {
        if ch == '`' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('`');
    quoted
}

/// Quote a ClickHouse string literal.
///
/// ```
/// # use tracker_import::utils::quote_literal;
/// assert_eq!(quote_literal("main"), "'main'");
/// assert_eq!(quote_literal("it's"), "'it\\'s'");
/// ```
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Strip the query string from a URL before logging it.
///
/// Scroll tokens and pagination cursors travel in the query string.
pub fn url_for_log(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => url.split('?').next().unwrap_or_default().to_string(),
    }
}
