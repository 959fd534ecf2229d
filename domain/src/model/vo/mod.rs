pub mod cluster;
pub mod request;

#[rustfmt::skip]
pub use self::{
    cluster::{ClusterJobSpec, ClusterJobStatus, VolumeSpec},
    request::JobRequest,
};
