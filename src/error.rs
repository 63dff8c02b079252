//! Adapter error types with numeric error codes.
//!
//! [`AdapterError`] is the central error type for the adapter. Each variant
//! maps to a numeric code so callers embedding the adapter in a service can
//! translate failures without matching on message text.

/// Message fragments that identify a unique-constraint failure when the
/// driver gives no structured signal.
///
/// SQLite reports `UNIQUE constraint failed: ...`, MySQL/MariaDB report
/// `Duplicate entry ...`, and PostgreSQL/SQL Server mention both `unique` and
/// `constraint`.
const UNIQUE_MARKERS: [&[&str]; 3] = [
    &["unique constraint failed"],
    &["duplicate", "entry"],
    &["unique", "constraint"],
];

/// Adapter error enum with error code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category                     |
/// |-----------|------------------------------|
/// | 1000–1999 | Configuration / caller input |
/// | 2000–2999 | Constraint conflicts         |
/// | 3000–3999 | Storage and transactions     |
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The adapter was composed in a way the storage engine cannot honor.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A table identifier failed validation.
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    /// An argument passed by the caller is inconsistent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Insert rejected by the `(ptype, v0..v5)` uniqueness constraint.
    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Storage engine failure (query, connection, missing table).
    #[error("storage error: {0}")]
    Storage(String),

    /// Begin, commit or rollback failed, or was issued in the wrong state.
    #[error("transaction error: {0}")]
    Transaction(String),
}

impl AdapterError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Configuration(_) => 1001,
            Self::InvalidTable(_) => 1002,
            Self::InvalidArgument(_) => 1003,
            Self::UniqueViolation(_) => 2001,
            Self::Storage(_) => 3001,
            Self::Transaction(_) => 3002,
        }
    }

    /// Returns `true` if this error means the row already exists.
    ///
    /// Storage errors whose text matches a known engine message are treated
    /// the same as the structured variant. This can also match other
    /// constraint failures that share the wording.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::UniqueViolation(_) => true,
            Self::Storage(message) => looks_like_unique_violation(message),
            _ => false,
        }
    }
}

/// Matches an engine error message against the known unique-violation
/// wordings, case-insensitively.
#[must_use]
pub fn looks_like_unique_violation(message: &str) -> bool {
    let lowered = message.to_lowercase();
    UNIQUE_MARKERS
        .iter()
        .any(|markers| markers.iter().all(|m| lowered.contains(m)))
}

/// Converts a `sqlx` error into an [`AdapterError`], separating unique
/// violations from other database failures.
#[must_use]
pub fn map_sqlx_error(e: sqlx::Error) -> AdapterError {
    match e {
        sqlx::Error::Database(db_err) => {
            let is_unique = db_err.is_unique_violation()
                || db_err.code().is_some_and(|code| code.as_ref() == "23505");
            if is_unique {
                AdapterError::UniqueViolation(db_err.to_string())
            } else {
                AdapterError::Storage(db_err.to_string())
            }
        }
        sqlx::Error::PoolTimedOut => {
            AdapterError::Storage("database connection pool timeout".to_string())
        }
        sqlx::Error::PoolClosed => {
            AdapterError::Storage("database connection pool is closed".to_string())
        }
        other => AdapterError::Storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_fall_in_documented_ranges() {
        assert_eq!(AdapterError::Configuration(String::new()).error_code(), 1001);
        assert_eq!(AdapterError::InvalidTable(String::new()).error_code(), 1002);
        assert_eq!(AdapterError::UniqueViolation(String::new()).error_code(), 2001);
        assert_eq!(AdapterError::Storage(String::new()).error_code(), 3001);
        assert_eq!(AdapterError::Transaction(String::new()).error_code(), 3002);
    }

    #[test]
    fn recognizes_engine_specific_wordings() {
        assert!(looks_like_unique_violation(
            "UNIQUE constraint failed: casbin_rule.ptype, casbin_rule.v0"
        ));
        assert!(looks_like_unique_violation(
            "Duplicate entry 'p-alice' for key 'ux_casbin_rule'"
        ));
        assert!(looks_like_unique_violation(
            "duplicate key value violates unique constraint \"casbin_rule_ptype_v0_key\""
        ));
        assert!(!looks_like_unique_violation("no such table: casbin_rule"));
        assert!(!looks_like_unique_violation("NOT NULL constraint failed"));
    }

    #[test]
    fn storage_error_with_unique_text_counts_as_conflict() {
        let err = AdapterError::Storage("UNIQUE constraint failed: t.ptype".to_string());
        assert!(err.is_unique_violation());

        let err = AdapterError::Transaction("UNIQUE constraint failed".to_string());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn pool_timeout_maps_to_storage() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AdapterError::Storage(_)));
    }

    #[test]
    fn row_not_found_maps_to_storage() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, AdapterError::Storage(_)));
        assert!(!err.is_unique_violation());
    }
}
