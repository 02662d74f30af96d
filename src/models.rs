// src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::identity;

/// One ledger row as handed over by the parsing collaborator.
/// Only `Date Time`, `To Wallet`, `Fiat Value Out` and `Account` are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    #[serde(rename = "Date Time", deserialize_with = "text")]
    pub date_time: String,
    #[serde(rename = "Txn Hash", deserialize_with = "text")]
    pub txn_hash: String,
    #[serde(rename = "Type", deserialize_with = "text")]
    pub kind: String,
    #[serde(rename = "From Wallet", deserialize_with = "text")]
    pub from_wallet: String,
    #[serde(rename = "To Wallet", deserialize_with = "text")]
    pub to_wallet: String,
    #[serde(rename = "Token Name", deserialize_with = "text")]
    pub token_name: String,
    #[serde(rename = "Token Amount In", deserialize_with = "text")]
    pub token_amount_in: String,
    #[serde(rename = "Token Amount Out", deserialize_with = "text")]
    pub token_amount_out: String,
    #[serde(rename = "Fiat Value In", deserialize_with = "text")]
    pub fiat_value_in: String,
    #[serde(rename = "Fiat Value Out", deserialize_with = "text")]
    pub fiat_value_out: String,
    #[serde(rename = "Account", deserialize_with = "text")]
    pub account: String,
}

/// Cells may arrive as strings, numbers or null; all become text.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

impl Record {
    /// Case-insensitive substring match of the account tag.
    pub fn in_cohort(&self, marker: &str) -> bool {
        self.account
            .to_lowercase()
            .contains(&marker.to_lowercase())
    }

    /// Unparseable timestamps decode to `MIN_UTC` instead of dropping the row.
    pub fn timestamp(&self) -> DateTime<Utc> {
        parse_timestamp(&self.date_time).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn fiat_out(&self) -> Decimal {
        parse_amount(&self.fiat_value_out)
    }

    pub fn recipient(&self) -> WalletIdentity {
        WalletIdentity::from_label(&self.to_wallet)
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .map(midnight_utc)
}

fn amount_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("invalid amount regex")
    })
}

/// Lenient amount decoding: the longest leading numeric prefix wins,
/// anything unreadable is zero.
pub fn parse_amount(raw: &str) -> Decimal {
    let Some(prefix) = amount_prefix_re().find(raw.trim()) else {
        return Decimal::ZERO;
    };
    let prefix = prefix.as_str();

    Decimal::from_str(prefix)
        .or_else(|_| Decimal::from_scientific(prefix))
        .ok()
        .or_else(|| prefix.parse::<f64>().ok().and_then(Decimal::from_f64))
        .unwrap_or(Decimal::ZERO)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A recipient as decoded from its label. Identity is the address alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub address: String,
    pub display_name: String,
}

impl WalletIdentity {
    pub fn from_label(label: &str) -> Self {
        Self {
            address: identity::extract_address(label),
            display_name: identity::extract_display_name(label),
        }
    }
}

impl PartialEq for WalletIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for WalletIdentity {}

impl Hash for WalletIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// A candidate duplicate awaiting a human verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityPair {
    pub first: WalletIdentity,
    pub second: WalletIdentity,
    pub score: f64,
}

/// Members in insertion order; `key` is the founder's address and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub key: String,
    pub members: Vec<WalletIdentity>,
}

/// One report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationResult {
    pub key: String,
    pub wallets: Vec<WalletIdentity>,
    pub total_amount: Decimal,
    pub display_name: String,
}

/// Inclusive timestamp window; open bounds fall back to the representable extremes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    /// Calendar dates map to midnight UTC on both ends, so an end date
    /// excludes the remainder of that day.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start: start.map(midnight_utc),
            end: end.map(midnight_utc),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start() && ts <= self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_amount_is_lenient() {
        assert_eq!(parse_amount("100"), Decimal::from(100));
        assert_eq!(parse_amount(" 12.50 "), Decimal::from_str("12.50").unwrap());
        assert_eq!(parse_amount("12abc"), Decimal::from(12));
        assert_eq!(parse_amount("1,234.00"), Decimal::from(1));
        assert_eq!(parse_amount("1e3"), Decimal::from(1000));
        assert_eq!(parse_amount("-3.5"), Decimal::from_str("-3.5").unwrap());
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("n/a"), Decimal::ZERO);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-05 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("03/05/2024 14:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-05"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_malformed_timestamp_falls_back_to_sentinel() {
        let record = Record {
            date_time: "not a date".into(),
            ..Record::default()
        };
        assert_eq!(record.timestamp(), DateTime::<Utc>::MIN_UTC);
        assert!(DateRange::all().contains(record.timestamp()));
    }

    #[test]
    fn test_cohort_match_is_case_insensitive() {
        let record = Record {
            account: "Spring COHORT 2024".into(),
            ..Record::default()
        };
        assert!(record.in_cohort("cohort"));
        assert!(!record.in_cohort("grants"));
    }

    #[test]
    fn test_date_range_bounds_are_inclusive() {
        let range = DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1),
            NaiveDate::from_ymd_opt(2024, 1, 31),
        );
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 1).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn test_identity_equality_ignores_display_name() {
        let a = WalletIdentity {
            address: "0xCC".into(),
            display_name: "Carol".into(),
        };
        let b = WalletIdentity {
            address: "0xCC".into(),
            display_name: "Carol Ltd".into(),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_record_deserializes_ledger_columns() {
        let json = r#"{
            "Date Time": "2024-02-01 09:00:00",
            "To Wallet": "=HYPERLINK(\"https://etherscan.io/address/0xAA\",\"Alice Corp\")",
            "Fiat Value Out": "42.10",
            "Account": "Cohort 3",
            "Unrelated": "ignored"
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.recipient().address, "0xAA");
        assert_eq!(record.recipient().display_name, "Alice Corp");
        assert_eq!(record.fiat_out(), Decimal::from_str("42.10").unwrap());
        assert!(record.txn_hash.is_empty());
    }

    #[test]
    fn test_numeric_and_null_cells_become_text() {
        let json = r#"{"Fiat Value Out": 12.5, "Account": null, "Date Time": "2024-02-01"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.fiat_value_out, "12.5");
        assert_eq!(record.fiat_out(), Decimal::from_str("12.5").unwrap());
        assert!(record.account.is_empty());
    }
}
