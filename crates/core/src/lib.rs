//! `harbor-core`: shared building blocks of the interception layer.
//!
//! This crate contains **pure** types (no IO): identifiers, storage
//! generations, request/response snapshots and the route table that decides
//! how an intercepted request is handled.

pub mod error;
pub mod http;
pub mod id;
pub mod routes;

pub use error::{CoreError, CoreResult};
pub use http::{HeaderList, RequestSnapshot, ResponseSnapshot};
pub use id::{ItemId, StorageGeneration};
pub use routes::{ResourceClass, RouteTable};
