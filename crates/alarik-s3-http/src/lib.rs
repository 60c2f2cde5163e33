//! The Alarik HTTP layer.
//!
//! Wires the S3 protocol pipeline into a hyper service:
//!
//! 1. Request-id allocation and the per-request deadline
//! 2. Admin JSON routes (`/api/v1/...`) with bearer-token auth
//! 3. S3 routing ([`router`]) for everything else
//! 4. SigV4 verification, including `aws-chunked` payloads
//! 5. Dispatch to the service core ([`dispatch`])
//! 6. Response and error-envelope rendering ([`response`])

pub mod admin;
pub mod body;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod router;
pub mod service;

pub use body::ResponseBody;
pub use router::S3Router;
pub use service::{AlarikHttpService, HttpConfig};
