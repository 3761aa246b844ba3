//! Content matching of ledger snapshot entries against live rows.
//!
//! Per entry, every eligible unclaimed row is scored. Name (trimmed,
//! case-insensitive) and quantity are gates: a row failing either scores
//! nothing. Past the gates, points are awarded per agreeing attribute under
//! [`MatchPolicy`]. The best row is claimed only when it clears the
//! threshold and is not tied with a row of different content. Rows with
//! identical content are interchangeable; among those the earliest created
//! (then lowest id) is claimed.

use std::collections::BTreeSet;

use uuid::Uuid;

use svo_pricing::{ItemKind, Money};
use svo_schemas::{Amendment, AmendmentItemSnapshot, FulfillmentStatus, OrderItem};

use crate::policy::MatchPolicy;
use crate::types::{
    Claim, LocatePath, LocatedRows, MatchOutcome, UnmatchedEntry, UnmatchedReason,
};

fn normalized(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A row can be reverted only if it appeared with or after the amendment,
/// is not priced-locked, and no work has started on it.
pub fn is_eligible(item: &OrderItem, amendment: &Amendment) -> bool {
    item.order_id == amendment.order_id
        && item.created_at_utc >= amendment.created_at_utc
        && !item.pricing.pricing_locked
        && item.fulfillment == FulfillmentStatus::Pending
}

/// Score of `item` against `entry`; `None` when a gate fails.
pub fn score(policy: &MatchPolicy, entry: &AmendmentItemSnapshot, item: &OrderItem) -> Option<u32> {
    if normalized(&entry.name) != normalized(&item.name) || entry.quantity != item.quantity {
        return None;
    }
    let w = &policy.weights;
    let mut s = 0;
    if item.pricing.stored_total == entry.computed_total {
        s += w.total;
    }
    if item.catalog_ref == entry.catalog_ref {
        s += w.catalog_ref;
    }
    if let (Some(a), Some(b)) = (item.unit_price(), entry.unit_price()) {
        if a == b {
            s += w.unit_price;
        }
    }
    if item.pricing.vat_bps == entry.vat_bps {
        s += w.vat;
    }
    Some(s)
}

type ContentKey<'a> = (String, i64, Money, &'a str, ItemKind, Option<Money>, Option<u32>);

fn content_key(item: &OrderItem) -> ContentKey<'_> {
    (
        normalized(&item.name),
        item.quantity,
        item.pricing.stored_total,
        item.catalog_ref.as_str(),
        item.pricing.kind,
        item.unit_price(),
        item.pricing.vat_bps,
    )
}

/// Match every snapshot entry of `amendment` against `items`.
///
/// A row is claimed by at most one entry. Entries are processed in snapshot
/// order.
pub fn match_entries(policy: &MatchPolicy, amendment: &Amendment, items: &[OrderItem]) -> MatchOutcome {
    let mut claimed: BTreeSet<Uuid> = BTreeSet::new();
    let mut out = MatchOutcome::default();

    for (entry_index, entry) in amendment.items.iter().enumerate() {
        let scored: Vec<(u32, &OrderItem)> = items
            .iter()
            .filter(|i| is_eligible(i, amendment) && !claimed.contains(&i.item_id))
            .filter_map(|i| score(policy, entry, i).map(|s| (s, i)))
            .collect();

        let unmatched = |reason| UnmatchedEntry {
            entry_index,
            name: entry.name.clone(),
            reason,
        };

        let Some(best) = scored.iter().map(|(s, _)| *s).max() else {
            out.unmatched.push(unmatched(UnmatchedReason::NoCandidate));
            continue;
        };
        if !policy.clears(best) {
            out.unmatched
                .push(unmatched(UnmatchedReason::BelowThreshold { best }));
            continue;
        }

        let mut top: Vec<&OrderItem> = scored
            .iter()
            .filter(|(s, _)| *s == best)
            .map(|(_, i)| *i)
            .collect();
        top.sort_by(|a, b| {
            a.created_at_utc
                .cmp(&b.created_at_utc)
                .then(a.item_id.cmp(&b.item_id))
        });

        let first = top[0];
        let key = content_key(first);
        if top.iter().any(|i| content_key(i) != key) {
            out.unmatched.push(unmatched(UnmatchedReason::Ambiguous {
                score: best,
                candidates: top.iter().map(|i| i.item_id).collect(),
            }));
            continue;
        }

        claimed.insert(first.item_id);
        out.claims.push(Claim {
            entry_index,
            item_id: first.item_id,
            score: best,
        });
    }

    out
}

/// Rows that belong to `amendment` and may be reverted.
///
/// Rows linked by `amendment_id` are taken directly; ineligible linked rows
/// are reported as skipped. Without any linked row the content matcher runs.
pub fn locate_amendment_rows(
    policy: &MatchPolicy,
    amendment: &Amendment,
    items: &[OrderItem],
) -> LocatedRows {
    let linked: Vec<&OrderItem> = items
        .iter()
        .filter(|i| i.amendment_id == Some(amendment.amendment_id))
        .collect();

    if linked.is_empty() {
        let outcome = match_entries(policy, amendment, items);
        return LocatedRows {
            path: LocatePath::ContentMatch,
            item_ids: outcome.claimed_ids(),
            unmatched: outcome.unmatched,
            skipped_linked: Vec::new(),
        };
    }

    let (ok, skipped): (Vec<&OrderItem>, Vec<&OrderItem>) =
        linked.into_iter().partition(|i| is_eligible(i, amendment));
    LocatedRows {
        path: LocatePath::Linked,
        item_ids: ok.iter().map(|i| i.item_id).collect(),
        unmatched: Vec::new(),
        skipped_linked: skipped.iter().map(|i| i.item_id).collect(),
    }
}
