//! Kademlia distance calculations.

use super::entities::NodeId;
use std::cmp::Ordering;

/// Bucket index for a remote node relative to the local node.
///
/// Equals the bit length of the XOR distance minus one, so bucket 159 holds
/// the farthest half of the ID space and bucket 0 the single closest ID.
/// Returns `None` for the local node itself.
pub fn bucket_index(local: &NodeId, remote: &NodeId) -> Option<usize> {
    let distance = local.distance(remote);
    for (i, byte) in distance.iter().enumerate() {
        if *byte != 0 {
            let highest_bit = 7 - byte.leading_zeros() as usize;
            return Some((19 - i) * 8 + highest_bit);
        }
    }
    None
}

/// Order two nodes by XOR distance to `target`, closest first.
pub fn cmp_distance(target: &NodeId, a: &NodeId, b: &NodeId) -> Ordering {
    target.distance(a).cmp(&target.distance(b))
}
