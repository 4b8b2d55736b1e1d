//! HTTP types shared by every driver.

mod context;
mod request;
mod response;

pub use context::HttpContext;
pub use request::{ActionRequest, UploadedFile};
pub use response::{
    ActionResponse, ByteStream, HttpBody, ResponseBody, BINARY_CONTENT_TYPE, HTML_CONTENT_TYPE,
    JSON_CONTENT_TYPE, TEXT_CONTENT_TYPE,
};
pub use hyper::{Method, StatusCode};
