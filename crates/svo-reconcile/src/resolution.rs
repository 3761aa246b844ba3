use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use svo_orders::{transition, OrderEvent, OrderStatus, ResolvedBy};
use svo_pricing::{Money, PricingRules};
use svo_schemas::{
    order_total, Amendment, AuthorizationSignature, OrderItem, OrderSnapshot, SignatureCapture,
    SignatureKind,
};

use crate::matcher::locate_amendment_rows;
use crate::policy::MatchPolicy;
use crate::types::{ApprovalPlan, LocatePath, RejectionPlan, ResolutionError};

fn find_pending(snapshot: &OrderSnapshot, amendment_id: Uuid) -> Result<&Amendment, ResolutionError> {
    let a = snapshot
        .amendments
        .iter()
        .find(|a| a.amendment_id == amendment_id)
        .ok_or(ResolutionError::AmendmentNotFound { amendment_id })?;
    if !a.is_pending() {
        return Err(ResolutionError::AmendmentNotPending {
            amendment_id,
            resolution: a.resolution,
        });
    }
    Ok(a)
}

/// Order status once `amendment_id` is resolved.
///
/// From the awaiting state the order returns to `Active`, unless another
/// amendment is still unresolved, in which case it keeps waiting. A status
/// reached by a forced transition is left as is. Terminal orders refuse.
pub fn status_after_resolution(
    snapshot: &OrderSnapshot,
    amendment_id: Uuid,
    resolved_by: ResolvedBy,
) -> Result<OrderStatus, ResolutionError> {
    let status = snapshot.order.status;
    let event = OrderEvent::AmendmentResolved {
        amendment_id,
        resolved_by,
    };
    let others_pending = snapshot
        .unresolved_amendments()
        .any(|a| a.amendment_id != amendment_id);

    match status {
        OrderStatus::AwaitingAmendmentAuthorization if others_pending => Ok(status),
        OrderStatus::AwaitingAmendmentAuthorization => Ok(transition(status, &event)?),
        s if s.is_terminal() => transition(s, &event).map_err(ResolutionError::from),
        s => Ok(s),
    }
}

/// Plan the approval of a pending amendment.
///
/// The signature records the current computed order total and the
/// amendment's reason. Rows added by the amendment get their pricing frozen.
/// The stored order total stays where the proposal put it.
pub fn plan_approval(
    rules: &PricingRules,
    policy: &MatchPolicy,
    snapshot: &OrderSnapshot,
    amendment_id: Uuid,
    capture: &SignatureCapture,
    now: DateTime<Utc>,
) -> Result<ApprovalPlan, ResolutionError> {
    let signer_name = capture.signer_name.trim();
    if signer_name.is_empty() {
        return Err(ResolutionError::MissingSignerName);
    }
    let amendment = find_pending(snapshot, amendment_id)?;
    let signature_id = Uuid::new_v4();
    let status_after =
        status_after_resolution(snapshot, amendment_id, ResolvedBy::Approval { signature_id })?;

    // Linked rows are frozen even when work on them has started.
    let linked: Vec<Uuid> = snapshot
        .items
        .iter()
        .filter(|i| i.amendment_id == Some(amendment_id) && !i.pricing.pricing_locked)
        .map(|i| i.item_id)
        .collect();
    let (path, to_lock) = if linked.is_empty() {
        let located = locate_amendment_rows(policy, amendment, &snapshot.items);
        (located.path, located.item_ids)
    } else {
        (LocatePath::Linked, linked)
    };

    let mut items = snapshot.items.clone();
    let mut locked_items = Vec::with_capacity(to_lock.len());
    for item in items.iter_mut().filter(|i| to_lock.contains(&i.item_id)) {
        item.lock_pricing(rules);
        locked_items.push(item.clone());
    }

    let signature = AuthorizationSignature {
        signature_id,
        order_id: snapshot.order.order_id,
        kind: SignatureKind::Amendment,
        signature_image: capture.signature_image.clone(),
        signer_name: signer_name.to_string(),
        signed_at_utc: now,
        reason: amendment.reason.clone(),
        authorized_amount: order_total(rules, &items),
        amendment_id: Some(amendment_id),
    };

    Ok(ApprovalPlan {
        amendment_id,
        order_id: snapshot.order.order_id,
        signature,
        locked_items,
        path,
        order_total: snapshot.order.total,
        status_after,
    })
}

/// Plan the reversal of a pending amendment.
///
/// `pre_count` is taken from the snapshot before anything is deleted. The
/// restored total is `previous_total` when the order still shows this
/// amendment's `new_total`. Otherwise the order total moved since the
/// proposal (another amendment, a cancelled line) and only the lines this
/// rejection deletes are taken back out.
pub fn plan_rejection(
    rules: &PricingRules,
    policy: &MatchPolicy,
    snapshot: &OrderSnapshot,
    amendment_id: Uuid,
) -> Result<RejectionPlan, ResolutionError> {
    let amendment = find_pending(snapshot, amendment_id)?;
    let status_after = status_after_resolution(snapshot, amendment_id, ResolvedBy::Rejection)?;
    let located = locate_amendment_rows(policy, amendment, &snapshot.items);

    let line_totals: BTreeMap<Uuid, Money> = snapshot
        .items
        .iter()
        .filter(|i| located.item_ids.contains(&i.item_id))
        .map(|i| {
            let line = if i.counts_toward_total() {
                i.displayed_total(rules)
            } else {
                Money::ZERO
            };
            (i.item_id, line)
        })
        .collect();

    let current = snapshot.order.total;
    let restore_total = if current == amendment.new_total {
        amendment.previous_total
    } else {
        let removed: Money = line_totals.values().sum();
        current.checked_sub(removed).unwrap_or_else(|| {
            let remaining: Vec<OrderItem> = snapshot
                .items
                .iter()
                .filter(|i| !line_totals.contains_key(&i.item_id))
                .cloned()
                .collect();
            order_total(rules, &remaining)
        })
    };

    Ok(RejectionPlan {
        amendment_id,
        order_id: snapshot.order.order_id,
        path: located.path,
        pre_count: snapshot.items.len(),
        expected_removed: amendment.items.len(),
        delete_item_ids: located.item_ids,
        unmatched: located.unmatched,
        skipped_linked: located.skipped_linked,
        previous_total: amendment.previous_total,
        restore_total,
        line_totals,
        status_after,
    })
}
