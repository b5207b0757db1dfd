//! Remote resources: Atom codec and the client that fetches them.

pub mod atom;
mod client;

pub use atom::{Feed, Resource, rel};
pub use client::{IMAGE_CONTENT_TYPE, ResourceClient, decode_slug, encode_slug};
