use rand::seq::SliceRandom;

use super::selection_policy::DatanodeSelectionPolicy;
use crate::registry::datanode_details::DatanodeEndpoint;

/// Round robin primaries, uniformly sampled replicas and lowest id first
/// reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDatanodeSelectionPolicy;

impl DatanodeSelectionPolicy for DefaultDatanodeSelectionPolicy {
    fn select_primary<'a>(
        &self,
        active: &'a [DatanodeEndpoint],
        block_index: usize,
    ) -> Option<&'a DatanodeEndpoint> {
        if active.is_empty() {
            return None;
        }
        active.get(block_index % active.len())
    }

    // sampled independently per call so blocks of one file spread out
    fn select_replicas(
        &self,
        candidates: &[DatanodeEndpoint],
        count: usize,
    ) -> Vec<DatanodeEndpoint> {
        let mut rng = rand::thread_rng();
        candidates
            .choose_multiple(&mut rng, count.min(candidates.len()))
            .cloned()
            .collect()
    }

    fn order_for_read(&self, mut holders: Vec<DatanodeEndpoint>) -> Vec<DatanodeEndpoint> {
        holders.sort();
        holders
    }
}
