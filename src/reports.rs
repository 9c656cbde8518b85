//! Read-only queries over `user_balance`.

use std::str::FromStr;

use crate::db::{DbError, DbPool, DbValue};

const TOP_HOLDERS_DEFAULT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Latest balance of every holder
    Holders,
    /// Largest latest balances
    TopHolders,
    /// Balance change between consecutive records of each holder over the last week
    WeeklyChange,
}

impl FromStr for Report {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "holders" => Ok(Report::Holders),
            "top" | "top-holders" => Ok(Report::TopHolders),
            "weekly" | "weekly-change" => Ok(Report::WeeklyChange),
            other => Err(format!(
                "unknown report '{}', expected holders, top or weekly",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub address: String,
    pub balance: String,
    pub delta: Option<String>,
    pub transaction_hash: String,
    pub created_at: String,
}

impl std::fmt::Display for ReportRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}  {}", self.address, self.balance)?;
        if let Some(delta) = &self.delta {
            write!(f, "  ({})", delta)?;
        }
        write!(f, "  {}  {}", self.transaction_hash, self.created_at)
    }
}

impl Report {
    fn sql(&self) -> &'static str {
        match self {
            Report::Holders => {
                "SELECT address, balance::text, NULL::text, transaction_hash, created_at::text
                 FROM (
                     SELECT DISTINCT ON (address) *
                     FROM user_balance
                     ORDER BY address, created_at DESC, id DESC
                 ) latest
                 ORDER BY address
                 LIMIT $1"
            }
            Report::TopHolders => {
                "SELECT address, balance::text, NULL::text, transaction_hash, created_at::text
                 FROM (
                     SELECT DISTINCT ON (address) *
                     FROM user_balance
                     ORDER BY address, created_at DESC, id DESC
                 ) latest
                 ORDER BY balance DESC
                 LIMIT $1"
            }
            Report::WeeklyChange => {
                "WITH changes AS (
                     SELECT address, balance, transaction_hash, created_at,
                            balance - lag(balance) OVER (
                                PARTITION BY address ORDER BY created_at, id
                            ) AS delta
                     FROM user_balance
                 )
                 SELECT address, balance::text, delta::text, transaction_hash, created_at::text
                 FROM changes
                 WHERE created_at >= NOW() - INTERVAL '7 days'
                 ORDER BY address, created_at
                 LIMIT $1"
            }
        }
    }

    fn effective_limit(&self, limit: Option<i64>) -> i64 {
        match (self, limit) {
            (_, Some(limit)) => limit.max(0),
            (Report::TopHolders, None) => TOP_HOLDERS_DEFAULT,
            (_, None) => i64::MAX,
        }
    }

    pub async fn run(&self, pool: &DbPool, limit: Option<i64>) -> Result<Vec<ReportRow>, DbError> {
        let rows = pool
            .select_all(
                &format!("{:?} report", self),
                self.sql(),
                &[DbValue::Int64(self.effective_limit(limit))],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ReportRow {
                address: row.get(0),
                balance: row.get(1),
                delta: row.get(2),
                transaction_hash: row.get(3),
                created_at: row.get(4),
            })
            .collect())
    }
}
