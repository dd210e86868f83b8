//! Status transition rules.
//!
//! Status updates arrive from two uncoordinated paths (the send step of the
//! queue consumer and the provider's webhook callbacks), possibly duplicated
//! and out of order. Every write is filtered through [`admits`]: a target
//! state is accepted only if it moves the record strictly forward in the
//! delivery ordering, `failed` is reachable from any non-terminal state, and
//! once `failed` the record is never rewritten. The Postgres repository
//! encodes the same rule inside its row UPDATE so concurrent writers cannot
//! interleave a regression between a read and a write.

use courier_common::types::MessageStatus;

/// Whether a transition from `current` to `target` may be applied.
///
/// A `false` return is a no-op for the caller, not an error: rejected
/// transitions are duplicate or late updates by construction.
pub fn admits(current: MessageStatus, target: MessageStatus) -> bool {
    // Terminal: nothing overwrites failed.
    if current == MessageStatus::Failed {
        return false;
    }
    // Absorbing: failed is reachable from any non-terminal state.
    if target == MessageStatus::Failed {
        return true;
    }
    match (current.rank(), target.rank()) {
        (Some(current_rank), Some(target_rank)) => target_rank > current_rank,
        // Unreachable given the guards above, but keep the ordering rule total.
        _ => false,
    }
}
