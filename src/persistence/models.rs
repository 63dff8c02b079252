//! Database row model for the rule table.

use serde::{Deserialize, Serialize};

use crate::domain::RuleRecord;

/// Column list of the rule table in select order.
pub const COLUMNS: &str = "id, ptype, v0, v1, v2, v3, v4, v5, v6, v7, v8, v9, v10, v11, v12, v13, v14";

/// A stored row from a `casbin_rule`-shaped table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RuleRow {
    /// Auto-increment row ID.
    pub id: i64,
    /// Rule category (`p`, `g2`, ...).
    pub ptype: String,
    /// Value column 0.
    pub v0: Option<String>,
    /// Value column 1.
    pub v1: Option<String>,
    /// Value column 2.
    pub v2: Option<String>,
    /// Value column 3.
    pub v3: Option<String>,
    /// Value column 4.
    pub v4: Option<String>,
    /// Value column 5.
    pub v5: Option<String>,
    /// Value column 6.
    pub v6: Option<String>,
    /// Value column 7.
    pub v7: Option<String>,
    /// Value column 8.
    pub v8: Option<String>,
    /// Value column 9.
    pub v9: Option<String>,
    /// Value column 10.
    pub v10: Option<String>,
    /// Value column 11.
    pub v11: Option<String>,
    /// Value column 12.
    pub v12: Option<String>,
    /// Value column 13.
    pub v13: Option<String>,
    /// Value column 14.
    pub v14: Option<String>,
}

impl From<RuleRow> for RuleRecord {
    fn from(row: RuleRow) -> Self {
        Self {
            id: Some(row.id),
            ptype: row.ptype,
            fields: [
                row.v0, row.v1, row.v2, row.v3, row.v4, row.v5, row.v6, row.v7, row.v8, row.v9,
                row.v10, row.v11, row.v12, row.v13, row.v14,
            ],
        }
    }
}
