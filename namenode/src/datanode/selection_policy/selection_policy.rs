use crate::registry::datanode_details::DatanodeEndpoint;

/// Decides which datanodes take part in a block write or read. Inputs are
/// snapshots of the active set ordered by ascending id.
pub trait DatanodeSelectionPolicy: Send + Sync {
    fn select_primary<'a>(
        &self,
        active: &'a [DatanodeEndpoint],
        block_index: usize,
    ) -> Option<&'a DatanodeEndpoint>;
    /// At most `count` distinct nodes out of `candidates`.
    fn select_replicas(
        &self,
        candidates: &[DatanodeEndpoint],
        count: usize,
    ) -> Vec<DatanodeEndpoint>;
    /// Order in which live holders are tried when serving a block.
    fn order_for_read(&self, holders: Vec<DatanodeEndpoint>) -> Vec<DatanodeEndpoint>;
}
