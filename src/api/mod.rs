//! Web API contract
//!
//! The HTTP router is not part of this crate; it deserializes an
//! `ApiRequest`, calls [`dispatch`] and writes the `ApiReply` back.

mod dispatch;
mod types;

pub use dispatch::{dispatch, download_filename, upload_reply};
pub use types::{ApiAction, ApiReply, ApiRequest, ApiResponse, GenericBody, UNSUPPORTED_MESSAGE};
