use svo_pricing::Money;

use crate::types::{
    PreviousTotalDeviation, RejectionOutcome, RejectionPlan, RejectionReport, RejectionWarning,
    TotalDrift,
};

/// Check a committed rejection against its plan.
///
/// - `deleted`: rows the store actually removed.
/// - `post_count`: item count re-read after the commit.
/// - `restored_total`: order total the store wrote.
/// - `total_after`: order total re-read after the commit.
/// - `recomputed_total`: total recomputed from the remaining rows.
///
/// Count and storage discrepancies make the outcome `Inconsistent`. A
/// recomputed total that differs from the restored one is recorded as
/// `total_drift` only: catalog values may have moved while the amendment
/// was pending. A restored total other than `previous_total` is noted in
/// `previous_total_deviation`, also without affecting the outcome.
pub fn verify_rejection(
    plan: &RejectionPlan,
    deleted: u64,
    post_count: usize,
    restored_total: Money,
    total_after: Money,
    recomputed_total: Money,
) -> RejectionReport {
    let mut warnings: Vec<RejectionWarning> = Vec::new();

    for u in &plan.unmatched {
        warnings.push(RejectionWarning::UnmatchedEntry {
            entry_index: u.entry_index,
            name: u.name.clone(),
            reason: u.reason.clone(),
        });
    }
    for id in &plan.skipped_linked {
        warnings.push(RejectionWarning::LinkedRowSkipped { item_id: *id });
    }

    let planned = plan.delete_item_ids.len();
    if deleted != planned as u64 {
        warnings.push(RejectionWarning::DeletedCountMismatch { planned, deleted });
    }

    let expected_post = plan.pre_count.saturating_sub(plan.expected_removed);
    if post_count != expected_post {
        warnings.push(RejectionWarning::ItemCountMismatch {
            pre_count: plan.pre_count,
            expected_removed: plan.expected_removed,
            post_count,
        });
    }

    if total_after != restored_total {
        warnings.push(RejectionWarning::TotalNotRestored {
            expected: restored_total,
            actual: total_after,
        });
    }

    let total_drift = (recomputed_total != restored_total).then_some(TotalDrift {
        restored: restored_total,
        recomputed: recomputed_total,
    });
    let previous_total_deviation =
        (restored_total != plan.previous_total).then_some(PreviousTotalDeviation {
            previous_total: plan.previous_total,
            restored: restored_total,
        });

    let outcome = if warnings.is_empty() {
        RejectionOutcome::Clean
    } else {
        RejectionOutcome::Inconsistent { warnings }
    };

    RejectionReport {
        amendment_id: plan.amendment_id,
        order_id: plan.order_id,
        path: plan.path,
        deleted,
        outcome,
        total_drift,
        previous_total_deviation,
    }
}
