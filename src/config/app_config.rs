// src/config/app_config.rs

//! Database credentials read from the application's own `config.php`.

use std::path::Path;

use regex::Regex;

use crate::config::model::DatabaseSection;
use crate::errors::{Result, UpdaterError};
use crate::fs::FileSystem;

/// Credentials handed to the dump tool.
#[derive(Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub name: String,
    pub user: String,
    pub password: Option<String>,
    pub host: Option<String>,
}

impl std::fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCredentials")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "*****"))
            .field("host", &self.host)
            .finish()
    }
}

fn cfg_value(content: &str, key: &str) -> Option<String> {
    let pattern = format!(r"\$CFG->{key}\s*=\s*'([^']*)'");
    // `key` is one of our fixed identifiers, so the pattern always compiles.
    let re = Regex::new(&pattern).ok()?;
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract `$CFG->dbname`, `dbuser`, `dbpass` and `dbhost` from PHP config
/// source.
pub fn parse_app_config(content: &str) -> Result<DbCredentials> {
    let name = cfg_value(content, "dbname").filter(|v| !v.is_empty());
    let user = cfg_value(content, "dbuser").filter(|v| !v.is_empty());

    match (name, user) {
        (Some(name), Some(user)) => Ok(DbCredentials {
            name,
            user,
            password: cfg_value(content, "dbpass").filter(|v| !v.is_empty()),
            host: cfg_value(content, "dbhost").filter(|v| !v.is_empty()),
        }),
        _ => Err(UpdaterError::ConfigError(
            "application config does not define $CFG->dbname and $CFG->dbuser".to_string(),
        )),
    }
}

/// Resolve credentials from either the app config file or `[database]`.
pub fn resolve_credentials(
    fs: &dyn FileSystem,
    section: &DatabaseSection,
    app_config_path: &Path,
) -> Result<DbCredentials> {
    if section.read_from_app_config {
        let content = fs.read_to_string(app_config_path)?;
        return parse_app_config(&content);
    }

    match (&section.name, &section.user) {
        (Some(name), Some(user)) => Ok(DbCredentials {
            name: name.clone(),
            user: user.clone(),
            password: section.password.clone(),
            host: None,
        }),
        _ => Err(UpdaterError::ConfigError(
            "[database].name and [database].user are required".to_string(),
        )),
    }
}
