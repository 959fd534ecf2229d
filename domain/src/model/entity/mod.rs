pub mod job;
pub mod project;
pub mod user;

#[rustfmt::skip]
pub use self::{
    job::{Job, JobCheckpoint, JobLog},
    project::Project,
    user::User,
};
