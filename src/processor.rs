//! Scan pipeline: dispatcher, scanner pool, snapshot reporter and the
//! coordinator that runs them.

pub mod dispatcher;
pub mod lifecycle;
pub mod pipeline;
pub mod queue;
pub mod reporter;
pub mod scanner;
pub mod worker_pool;
