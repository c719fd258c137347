pub mod config;
pub mod datanode;
pub mod dispatcher;
pub mod error;
pub mod namenode_state;
pub mod namespace;
pub mod placement;
pub mod registry;

#[cfg(test)]
mod test_support;
