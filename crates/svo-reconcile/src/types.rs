use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use svo_orders::{OrderStatus, TransitionError};
use svo_pricing::Money;
use svo_schemas::{AmendmentResolution, AuthorizationSignature, OrderItem};

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// A snapshot entry that claimed a live row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    /// Index into `Amendment::items`.
    pub entry_index: usize,
    pub item_id: Uuid,
    pub score: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnmatchedReason {
    /// No eligible row passed the name and quantity gates.
    NoCandidate,
    /// The best candidate scored under the threshold.
    BelowThreshold { best: u32 },
    /// Rows with different content tied for the best score.
    Ambiguous { score: u32, candidates: Vec<Uuid> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnmatchedEntry {
    pub entry_index: usize,
    pub name: String,
    pub reason: UnmatchedReason,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub claims: Vec<Claim>,
    pub unmatched: Vec<UnmatchedEntry>,
}

impl MatchOutcome {
    pub fn claimed_ids(&self) -> Vec<Uuid> {
        self.claims.iter().map(|c| c.item_id).collect()
    }
}

/// How the rows of an amendment were located.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocatePath {
    /// Rows carry `amendment_id`.
    Linked,
    /// Legacy rows: content matching against the ledger snapshot.
    ContentMatch,
}

impl LocatePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatePath::Linked => "linked",
            LocatePath::ContentMatch => "content_match",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocatedRows {
    pub path: LocatePath,
    pub item_ids: Vec<Uuid>,
    pub unmatched: Vec<UnmatchedEntry>,
    /// Linked rows left alone because they are locked or already in work.
    pub skipped_linked: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Writes that resolve an amendment by approval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalPlan {
    pub amendment_id: Uuid,
    pub order_id: Uuid,
    pub signature: AuthorizationSignature,
    /// Rows of this amendment with pricing now frozen.
    pub locked_items: Vec<OrderItem>,
    pub path: LocatePath,
    /// Order total after approval; unchanged from the proposal.
    pub order_total: Money,
    pub status_after: OrderStatus,
}

/// Writes that resolve an amendment by rejection, plus what to verify after.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectionPlan {
    pub amendment_id: Uuid,
    pub order_id: Uuid,
    pub path: LocatePath,
    /// Item count before any deletion.
    pub pre_count: usize,
    /// Number of snapshot entries, i.e. rows the amendment added.
    pub expected_removed: usize,
    pub delete_item_ids: Vec<Uuid>,
    pub unmatched: Vec<UnmatchedEntry>,
    pub skipped_linked: Vec<Uuid>,
    pub previous_total: Money,
    /// Order total to write back once every planned row is gone.
    pub restore_total: Money,
    /// What each row in `delete_item_ids` contributes to the order total.
    pub line_totals: BTreeMap<Uuid, Money>,
    pub status_after: OrderStatus,
}

impl RejectionPlan {
    /// Total to write when only `deleted` of the planned rows were removed.
    /// Lines of planned rows that stayed are added back.
    pub fn restore_total_after(&self, deleted: &[Uuid]) -> Money {
        self.delete_item_ids
            .iter()
            .filter(|id| !deleted.contains(id))
            .filter_map(|id| self.line_totals.get(id))
            .fold(self.restore_total, |t, line| t.saturating_add(*line))
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionWarning {
    /// A snapshot entry found no confident match; its row may be orphaned.
    UnmatchedEntry {
        entry_index: usize,
        name: String,
        reason: UnmatchedReason,
    },
    /// A linked row was not removed because it is locked or in work.
    LinkedRowSkipped { item_id: Uuid },
    /// The store deleted a different number of rows than were planned.
    DeletedCountMismatch { planned: usize, deleted: u64 },
    /// `post_count != pre_count - expected_removed`.
    ItemCountMismatch {
        pre_count: usize,
        expected_removed: usize,
        post_count: usize,
    },
    /// The stored order total read back differs from the one written.
    TotalNotRestored { expected: Money, actual: Money },
}

impl fmt::Display for RejectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionWarning::UnmatchedEntry {
                entry_index,
                name,
                reason,
            } => write!(f, "entry {entry_index} ({name}) unmatched: {reason:?}"),
            RejectionWarning::LinkedRowSkipped { item_id } => {
                write!(f, "linked row {item_id} not removed: locked or in work")
            }
            RejectionWarning::DeletedCountMismatch { planned, deleted } => {
                write!(f, "planned to delete {planned} rows, deleted {deleted}")
            }
            RejectionWarning::ItemCountMismatch {
                pre_count,
                expected_removed,
                post_count,
            } => write!(
                f,
                "item count {post_count} after rejection, expected {pre_count} - {expected_removed}"
            ),
            RejectionWarning::TotalNotRestored { expected, actual } => {
                write!(f, "order total reads {actual}, expected {expected}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionOutcome {
    /// Every added row was removed and the counts agree.
    Clean,
    /// The reversal completed what it could; see warnings.
    Inconsistent { warnings: Vec<RejectionWarning> },
}

/// Non-fatal difference between the restored total and the total recomputed
/// from the remaining rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TotalDrift {
    pub restored: Money,
    pub recomputed: Money,
}

/// The restored total is not the amendment's `previous_total`, because
/// other changes moved the order total while the amendment was pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviousTotalDeviation {
    pub previous_total: Money,
    pub restored: Money,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectionReport {
    pub amendment_id: Uuid,
    pub order_id: Uuid,
    pub path: LocatePath,
    pub deleted: u64,
    pub outcome: RejectionOutcome,
    pub total_drift: Option<TotalDrift>,
    pub previous_total_deviation: Option<PreviousTotalDeviation>,
}

impl RejectionReport {
    pub fn is_clean(&self) -> bool {
        self.outcome == RejectionOutcome::Clean
    }

    pub fn warnings(&self) -> &[RejectionWarning] {
        match &self.outcome {
            RejectionOutcome::Clean => &[],
            RejectionOutcome::Inconsistent { warnings } => warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    AmendmentNotFound { amendment_id: Uuid },
    AmendmentNotPending {
        amendment_id: Uuid,
        resolution: AmendmentResolution,
    },
    Transition(TransitionError),
    MissingSignerName,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::AmendmentNotFound { amendment_id } => {
                write!(f, "amendment {amendment_id} not found on order")
            }
            ResolutionError::AmendmentNotPending {
                amendment_id,
                resolution,
            } => write!(
                f,
                "amendment {amendment_id} already resolved: {}",
                resolution.as_str()
            ),
            ResolutionError::Transition(e) => write!(f, "{e}"),
            ResolutionError::MissingSignerName => write!(f, "a signature needs a signer name"),
        }
    }
}

impl std::error::Error for ResolutionError {}

impl From<TransitionError> for ResolutionError {
    fn from(e: TransitionError) -> Self {
        ResolutionError::Transition(e)
    }
}
