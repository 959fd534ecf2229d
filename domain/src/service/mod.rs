mod cluster;
mod executor;

#[rustfmt::skip]
pub use self::{
    cluster::{ClusterClient, LogStream},
    executor::Executor,
};
