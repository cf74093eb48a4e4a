//! Authorized transport: request description, execution and dispatch.

pub mod dispatcher;
pub mod http;

pub use dispatcher::RequestDispatcher;
pub use http::{ApiRequest, AuthorizedClient, RawResponse};
