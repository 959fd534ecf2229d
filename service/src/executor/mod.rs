mod basic;
mod kubernetes;

#[rustfmt::skip]
pub use self::{
    basic::BasicExecutor,
    kubernetes::KubernetesExecutor,
};
