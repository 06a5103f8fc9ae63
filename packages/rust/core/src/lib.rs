//! Ingestion pipeline and scheduling for the business directory.
//!
//! Stages run strictly in order, each on the full output of the previous one:
//! [`collector`] → [`normalizer`] → [`validator`] → [`merger`]. The
//! [`scheduler`] owns the only run state and drives [`pipeline::Pipeline`].

pub mod collector;
pub mod extraction;
pub mod merger;
pub mod normalizer;
pub mod pipeline;
pub mod reports;
pub mod scheduler;
pub mod validator;
