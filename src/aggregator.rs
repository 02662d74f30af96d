// src/aggregator.rs
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::groups::GroupStore;
use crate::models::{AggregationResult, DateRange, Record, WalletIdentity};

/// Running total for one accumulation key.
struct Bucket {
    key: String,
    total: Decimal,
}

/// Adds without panicking; an overflowing sum pins to the representable bound.
fn saturating_add(total: Decimal, amount: Decimal) -> Decimal {
    total.checked_add(amount).unwrap_or_else(|| {
        warn!("Total overflowed adding {} to {}; clamped", amount, total);
        if amount.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        }
    })
}

/// Sums fiat outflows per resolved recipient over cohort rows inside `range`.
/// Grouped addresses accumulate under their group key, the rest under their
/// own address. Rows come out in first-seen key order.
pub fn aggregate(
    records: &[Record],
    store: &GroupStore,
    range: &DateRange,
    cohort_marker: &str,
) -> Vec<AggregationResult> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut last_names: HashMap<String, String> = HashMap::new();
    let mut rows = 0usize;

    for record in records
        .iter()
        .filter(|r| r.in_cohort(cohort_marker))
        .filter(|r| range.contains(r.timestamp()))
    {
        rows += 1;
        let WalletIdentity {
            address,
            display_name,
        } = record.recipient();
        let amount = record.fiat_out();

        let key = store
            .lookup_group(&address)
            .map_or_else(|| address.clone(), str::to_string);

        let slot = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push(Bucket {
                key: key.clone(),
                total: Decimal::ZERO,
            });
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];
        bucket.total = saturating_add(bucket.total, amount);

        debug!("{} -> {} (+{} = {})", address, key, amount, bucket.total);
        last_names.insert(address, display_name);
    }

    info!("Aggregated {} rows into {} recipients", rows, buckets.len());

    buckets
        .into_iter()
        .map(|bucket| {
            // last name seen for the key's own address, else the key itself
            let display_name = last_names
                .get(&bucket.key)
                .cloned()
                .unwrap_or_else(|| bucket.key.clone());
            let wallets = match store.group(&bucket.key) {
                Some(group) => group.members.clone(),
                None => vec![WalletIdentity {
                    address: bucket.key.clone(),
                    display_name: display_name.clone(),
                }],
            };
            AggregationResult {
                key: bucket.key,
                wallets,
                total_amount: bucket.total,
                display_name,
            }
        })
        .collect()
}

/// Stable sort, largest total first.
pub fn rank(mut results: Vec<AggregationResult>) -> Vec<AggregationResult> {
    results.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
    results
}
