mod job;
mod project;
mod user;
