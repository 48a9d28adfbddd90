//! Route handlers, grouped by resource.

pub mod executions;
pub mod status;
pub mod webhooks;
