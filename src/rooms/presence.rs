use std::collections::HashMap;

use super::room::ConnectionId;
use crate::models::Member;

/// Merge a joining member into the presence map, deduplicating on username.
///
/// Two connections sharing a display name collapse into a single presence
/// entry, and only the first connection owns that entry. This is display-level
/// deduplication, not an identity check; it lives here as a named policy so
/// the identity model can change without touching the coordinator.
///
/// Returns whether a new entry was inserted.
pub fn merge_member(
    members: &mut HashMap<ConnectionId, Member>,
    connection_id: &str,
    candidate: Member,
) -> bool {
    if members
        .values()
        .any(|member| member.username == candidate.username)
    {
        return false;
    }
    members.insert(connection_id.to_string(), candidate);
    true
}
