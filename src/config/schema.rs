use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Session cookie and session store settings
    pub session: SessionConfig,
    /// Credential hashing and response settings
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.auth.hash_params()?;
        Ok(())
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 5000,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session id
    pub cookie_name: String,
    /// Secret used to sign the session cookie
    pub secret: String,
    /// Session lifetime in seconds, applied to both the cookie and the stored row
    pub max_age_secs: u64,
    /// Hide the cookie from client-side scripts
    pub http_only: bool,
    /// Only send the cookie over HTTPS
    pub secure: bool,
    /// Persist sessions that were never written to
    pub save_uninitialized: bool,
    /// Table holding session rows
    pub table_name: String,
    /// Primary key column of the session table
    pub sid_field: String,
    /// Create the session table on startup if missing
    pub create_table: bool,
    /// How often expired session rows are swept, in seconds
    pub sweep_interval_secs: u64,
}

pub const DEFAULT_SESSION_SECRET: &str = "myspeshulsecret";

/// Longest accepted session lifetime (ten years)
pub const MAX_SESSION_AGE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "chocolate-chip".to_string(),
            secret: DEFAULT_SESSION_SECRET.to_string(),
            max_age_secs: 3600,
            http_only: true,
            // Plain HTTP deployments need this off; enable behind TLS
            secure: false,
            save_uninitialized: false,
            table_name: "sessions".to_string(),
            sid_field: "sid".to_string(),
            create_table: true,
            sweep_interval_secs: 3600,
        }
    }
}

impl SessionConfig {
    /// Session lifetime in seconds, capped at [`MAX_SESSION_AGE_SECS`]
    pub fn max_age(&self) -> i64 {
        let secs = self.max_age_secs.min(MAX_SESSION_AGE_SECS);
        i64::try_from(secs).unwrap_or(i64::MAX)
    }

    fn validate(&self) -> Result<()> {
        if self.cookie_name.trim().is_empty() {
            return Err(AppError::Config("session cookie name is empty".to_string()));
        }
        if self.secret.is_empty() {
            return Err(AppError::Config("session secret is empty".to_string()));
        }
        if self.max_age_secs == 0 {
            return Err(AppError::Config("session max age must be positive".to_string()));
        }
        if self.max_age_secs > MAX_SESSION_AGE_SECS {
            return Err(AppError::Config(format!(
                "session max age must not exceed {} seconds",
                MAX_SESSION_AGE_SECS
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(AppError::Config(
                "session sweep interval must be positive".to_string(),
            ));
        }
        // Both names are interpolated into SQL
        for ident in [&self.table_name, &self.sid_field] {
            if !is_sql_identifier(ident) {
                return Err(AppError::Config(format!(
                    "'{}' is not a valid SQL identifier",
                    ident
                )));
            }
        }
        Ok(())
    }
}

fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Argon2 memory cost in KiB
    pub hash_memory_kib: u32,
    /// Argon2 iteration count
    pub hash_iterations: u32,
    /// Argon2 lane count
    pub hash_parallelism: u32,
    /// Include the stored password hash in user payloads
    pub expose_password_hash: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
            hash_parallelism: 1,
            expose_password_hash: false,
        }
    }
}

impl AuthConfig {
    /// Build the fixed Argon2 work factor
    pub fn hash_params(&self) -> Result<argon2::Params> {
        argon2::Params::new(
            self.hash_memory_kib,
            self.hash_iterations,
            self.hash_parallelism,
            None,
        )
        .map_err(|e| AppError::Config(format!("invalid password hash parameters: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.cookie_name, "chocolate-chip");
        assert!(config.session.http_only);
        assert!(!config.session.secure);
        assert!(!config.auth.expose_password_hash);
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let mut config = AppConfig::default();
        config.session.table_name = "sessions; DROP TABLE users".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.session.sid_field = "1sid".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.table_name = "app_sessions".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_durations() {
        let mut config = AppConfig::default();
        config.session.max_age_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_max_age() {
        let mut config = AppConfig::default();
        config.session.max_age_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
        assert_eq!(config.session.max_age(), MAX_SESSION_AGE_SECS as i64);

        config.session.max_age_secs = MAX_SESSION_AGE_SECS + 1;
        assert!(config.validate().is_err());

        config.session.max_age_secs = MAX_SESSION_AGE_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(config.session.max_age(), MAX_SESSION_AGE_SECS as i64);
    }

    #[test]
    fn test_rejects_bad_hash_params() {
        let mut config = AppConfig::default();
        config.auth.hash_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"session":{"secure":true}}"#).unwrap();
        assert!(config.session.secure);
        assert_eq!(config.session.max_age_secs, 3600);
        assert_eq!(config.web.http_port, 5000);
    }
}
