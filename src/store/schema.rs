//! The fixed two-table schema of the financial dataset.

/// Columns of the `loans` table, in table order.
pub const LOANS_COLUMNS: &[&str] = &[
    "loan_id",
    "application_date",
    "loan_type",
    "amount",
    "interest_rate",
    "term_months",
    "credit_score",
    "province",
    "customer_age",
    "income",
    "employment_status",
    "defaulted",
    "days_past_due",
];

/// Columns of the `transactions` table, in table order.
pub const TRANSACTIONS_COLUMNS: &[&str] = &[
    "transaction_id",
    "timestamp",
    "customer_id",
    "type",
    "amount",
    "merchant",
    "is_fraud",
];

/// DDL for an empty dataset. Dates are stored as ISO-8601 text.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS loans (
    loan_id           TEXT PRIMARY KEY,
    application_date  TEXT NOT NULL,
    loan_type         TEXT NOT NULL,
    amount            REAL NOT NULL,
    interest_rate     REAL NOT NULL,
    term_months       INTEGER NOT NULL,
    credit_score      INTEGER NOT NULL,
    province          TEXT NOT NULL,
    customer_age      INTEGER NOT NULL,
    income            REAL NOT NULL,
    employment_status TEXT NOT NULL,
    defaulted         INTEGER NOT NULL DEFAULT 0,
    days_past_due     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS transactions (
    transaction_id TEXT PRIMARY KEY,
    timestamp      TEXT NOT NULL,
    customer_id    TEXT NOT NULL,
    type           TEXT NOT NULL,
    amount         REAL NOT NULL,
    merchant       TEXT NOT NULL,
    is_fraud       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_loans_application_date ON loans(application_date);
CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp);
"#;

/// Renders a table's column list the way prompts describe it:
/// `name: col_a, col_b, ...`.
pub fn describe_table(name: &str, columns: &[&str]) -> String {
    format!("{}: {}", name, columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mentions_every_column() {
        for column in LOANS_COLUMNS.iter().chain(TRANSACTIONS_COLUMNS) {
            assert!(SCHEMA_SQL.contains(column), "missing column {}", column);
        }
    }

    #[test]
    fn test_describe_table() {
        assert_eq!(
            describe_table("transactions", TRANSACTIONS_COLUMNS),
            "transactions: transaction_id, timestamp, customer_id, type, amount, merchant, is_fraud"
        );
    }
}
