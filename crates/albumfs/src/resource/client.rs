//! Typed access to the AtomPub service.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::atom::{self, ENTRY_CONTENT_TYPE, Resource, rel};
use crate::error::{Error, Result};
use crate::network::{Request, Transport};

/// Content type used for photo uploads.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Resolves collections, walks paginated feeds and performs create, upload,
/// delete and media download on top of a [`Transport`].
#[derive(Clone)]
pub struct ResourceClient {
    transport: Arc<dyn Transport>,
    service_url: Url,
}

impl ResourceClient {
    pub fn new(transport: Arc<dyn Transport>, service_url: &str) -> Result<Self> {
        let service_url = Url::parse(service_url)
            .map_err(|e| Error::protocol(format!("invalid service URL: {}", e)))?;
        Ok(Self {
            transport,
            service_url,
        })
    }

    pub fn service_url(&self) -> &Url {
        &self.service_url
    }

    async fn get(&self, href: &str) -> Result<(Url, Vec<u8>)> {
        let base = Url::parse(href).map_err(|e| Error::protocol(format!("bad href: {}", e)))?;
        let response = self.transport.send(Request::get(href)).await?;
        Ok((base, response.body))
    }

    /// Collection id → href, from the service document.
    pub async fn service_document(&self) -> Result<IndexMap<String, String>> {
        let response = self
            .transport
            .send(Request::get(self.service_url.as_str()))
            .await?;
        atom::parse_service(&response.body, &self.service_url)
    }

    /// Fetch the top-level collection named `id` (e.g. `album-list`).
    ///
    /// The returned resource always carries a `self` link pointing at the
    /// collection, even when the feed omits it.
    pub async fn resolve(&self, id: &str) -> Result<Resource> {
        let collections = self.service_document().await?;
        let href = collections
            .get(id)
            .ok_or_else(|| Error::protocol(format!("service has no collection '{}'", id)))?;
        let (base, body) = self.get(href).await?;
        let mut feed = atom::parse_feed(&body, &base)?;
        feed.resource
            .links
            .entry(rel::SELF.to_string())
            .or_insert_with(|| href.clone());
        Ok(feed.resource)
    }

    /// Every entry of the feed behind `resource`'s `rel` link, following
    /// `next` links until the last page.
    pub async fn children(&self, resource: &Resource, rel: &str) -> Result<Vec<Resource>> {
        let mut href = resource.require_link(rel)?.to_string();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        loop {
            if !seen.insert(href.clone()) {
                return Err(Error::protocol(format!(
                    "pagination loop at page {}",
                    seen.len() + 1
                )));
            }
            let (base, body) = self.get(&href).await?;
            let feed = atom::parse_feed(&body, &base)?;
            tracing::trace!(page = seen.len(), entries = feed.entries.len(), "feed page");
            entries.extend(feed.entries);
            match feed.resource.link(rel::NEXT) {
                Some(next) => href = next.to_string(),
                None => return Ok(entries),
            }
        }
    }

    /// POST a new entry titled `title` to `collection` and parse the result.
    pub async fn create_entry(&self, collection: &Resource, title: &str) -> Result<Resource> {
        let href = collection.require_link(rel::SELF)?;
        let request = Request::post(href, atom::entry_document(title)?)
            .header("Content-Type", ENTRY_CONTENT_TYPE);
        self.created(href, request).await
    }

    /// POST raw image bytes to `parent`'s `rel` link, naming them `title`.
    pub async fn upload(
        &self,
        parent: &Resource,
        rel: &str,
        title: &str,
        bytes: Vec<u8>,
    ) -> Result<Resource> {
        let href = parent.require_link(rel)?;
        let request = Request::post(href, bytes)
            .header("Content-Type", IMAGE_CONTENT_TYPE)
            .header("Slug", encode_slug(title));
        self.created(href, request).await
    }

    async fn created(&self, href: &str, request: Request) -> Result<Resource> {
        let base = Url::parse(href).map_err(|e| Error::protocol(format!("bad href: {}", e)))?;
        let response = self.transport.send(request).await?;
        atom::parse_entry(&response.body, &base)
    }

    /// DELETE through the resource's `edit` link.
    pub async fn delete(&self, resource: &Resource) -> Result<()> {
        let href = resource.require_link(rel::EDIT)?;
        self.transport.send(Request::delete(href)).await?;
        Ok(())
    }

    /// Download the media behind `edit-media`, or the original image href.
    pub async fn media(&self, resource: &Resource) -> Result<Vec<u8>> {
        let href = resource
            .link(rel::EDIT_MEDIA)
            .or(resource.image_href.as_deref())
            .ok_or_else(|| Error::protocol(format!("resource {} has no media", resource.id)))?;
        let (_, body) = self.get(href).await?;
        Ok(body)
    }
}

/// Percent-encode a title for the `Slug` header (RFC 5023 §9.7).
pub fn encode_slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for byte in title.bytes() {
        if (0x20..0x7f).contains(&byte) && byte != b'%' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Inverse of [`encode_slug`]. Malformed escapes are kept literally.
pub fn decode_slug(slug: &str) -> String {
    let bytes = slug.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
