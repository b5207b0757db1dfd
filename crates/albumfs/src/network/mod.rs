//! Network layer for albumfs
//!
//! Moves bytes between the resource layer and the album service.
//!
//! # Credentials
//!
//! - The token comes from a [`TokenProvider`]
//! - It is attached only to URLs on the service origin ([`OriginAllowlist`])
//! - A 401 triggers exactly one refresh

mod allowlist;
mod client;
mod memory;
mod token;
mod transport;

pub use allowlist::{OriginAllowlist, UrlMatch};
pub use client::{Backend, Method, Request, ReqwestBackend, Response};
pub use memory::{DEFAULT_MEMORY_URL, DEFAULT_PAGE_SIZE, MemoryService, sample_image};
pub use token::{StaticToken, TokenProvider};
pub use transport::{HttpTransport, Transport};
