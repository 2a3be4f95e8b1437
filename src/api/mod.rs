//! Request construction and dispatch.
//!
//! - [`ApiOperation`] - a remote call described as data
//! - [`RequestDispatcher`] - authenticates, submits and retries once on token rejection

mod dispatcher;
mod operation;

pub use dispatcher::RequestDispatcher;
pub use operation::ApiOperation;
