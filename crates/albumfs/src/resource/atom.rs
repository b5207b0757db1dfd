//! Atom / AtomPub documents.
//!
//! Parses service documents, feeds and entries into [`Resource`] values with
//! a fixed field set, and writes the minimal entry used to create albums.
//!
//! | Element | Field |
//! |---------|-------|
//! | `atom:id` | `id` |
//! | `atom:title` | `title` |
//! | `atom:published`, `atom:updated` | timestamps (RFC 3339) |
//! | `atom:link[@rel]/@href` | `links` (first per rel, absolute) |
//! | `f:image-count/@value` | `image_count` |
//! | `f:img[@size="orig"]/@bytesize` | `byte_size` |
//! | `f:img[@size="orig"]/@href`, `atom:content/@src` | `image_href` |

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use roxmltree::{Document, Node};
use url::Url;

use crate::error::{Error, Result};

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const APP_NS: &str = "http://www.w3.org/2007/app";
pub const FOTKI_NS: &str = "yandex:fotki";

/// Content type for posting a new Atom entry.
pub const ENTRY_CONTENT_TYPE: &str = "application/atom+xml; charset=utf-8; type=entry";

/// Link relations used by the album service.
pub mod rel {
    pub const SELF: &str = "self";
    pub const EDIT: &str = "edit";
    pub const EDIT_MEDIA: &str = "edit-media";
    pub const PHOTOS: &str = "photos";
    pub const NEXT: &str = "next";
}

/// A remote album, photo or feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// rel → absolute href
    pub links: IndexMap<String, String>,
    /// Number of photos (albums)
    pub image_count: Option<u64>,
    /// Size of the original image in bytes (photos)
    pub byte_size: Option<u64>,
    /// Original image location (photos)
    pub image_href: Option<String>,
}

impl Resource {
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links.get(rel).map(String::as_str)
    }

    /// Like [`link`](Self::link) but missing links are a protocol error.
    pub fn require_link(&self, rel: &str) -> Result<&str> {
        self.link(rel)
            .ok_or_else(|| Error::protocol(format!("resource {} has no '{}' link", self.id, rel)))
    }
}

/// One page of a feed: the feed's own metadata plus its entries.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub resource: Resource,
    pub entries: Vec<Resource>,
}

fn document(body: &[u8]) -> Result<Document<'_>> {
    let text = std::str::from_utf8(body)
        .map_err(|e| Error::protocol(format!("document is not UTF-8: {}", e)))?;
    Document::parse(text).map_err(|e| Error::protocol(format!("malformed XML: {}", e)))
}

/// Collection id → absolute href, from an AtomPub service document.
pub fn parse_service(body: &[u8], base: &Url) -> Result<IndexMap<String, String>> {
    let doc = document(body)?;
    let mut collections = IndexMap::new();
    for node in doc
        .descendants()
        .filter(|n| n.has_tag_name((APP_NS, "collection")))
    {
        let (Some(id), Some(href)) = (node.attribute("id"), node.attribute("href")) else {
            continue;
        };
        collections
            .entry(id.to_string())
            .or_insert(resolve_href(base, href)?);
    }
    Ok(collections)
}

/// Parse one page of a feed.
pub fn parse_feed(body: &[u8], base: &Url) -> Result<Feed> {
    let doc = document(body)?;
    let root = doc.root_element();
    if !root.has_tag_name((ATOM_NS, "feed")) {
        return Err(Error::protocol(format!(
            "expected atom:feed, found {}",
            root.tag_name().name()
        )));
    }
    let resource = resource_from(root, base)?;
    let entries = root
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
        .map(|n| resource_from(n, base))
        .collect::<Result<Vec<_>>>()?;
    Ok(Feed { resource, entries })
}

/// Parse a standalone entry document, e.g. the response to a create.
pub fn parse_entry(body: &[u8], base: &Url) -> Result<Resource> {
    let doc = document(body)?;
    let root = doc.root_element();
    if !root.has_tag_name((ATOM_NS, "entry")) {
        return Err(Error::protocol(format!(
            "expected atom:entry, found {}",
            root.tag_name().name()
        )));
    }
    resource_from(root, base)
}

/// Serialize `<entry xmlns="…Atom"><title>…</title></entry>`.
pub fn entry_document(title: &str) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let mut entry = BytesStart::new("entry");
    entry.push_attribute(("xmlns", ATOM_NS));
    let events = [
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        Event::Start(entry),
        Event::Start(BytesStart::new("title")),
        Event::Text(BytesText::new(title)),
        Event::End(BytesEnd::new("title")),
        Event::End(BytesEnd::new("entry")),
    ];
    for event in events {
        writer
            .write_event(event)
            .map_err(|e| Error::protocol(format!("failed to write entry: {}", e)))?;
    }
    Ok(writer.into_inner())
}

/// Resolve a possibly relative href against the document URL.
pub fn resolve_href(base: &Url, href: &str) -> Result<String> {
    base.join(href)
        .map(String::from)
        .map_err(|e| Error::protocol(format!("bad href {:?}: {}", href, e)))
}

fn child<'a, 'i>(node: Node<'a, 'i>, ns: &str, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name((ns, name)))
}

fn child_text(node: Node<'_, '_>, ns: &str, name: &str) -> Option<String> {
    child(node, ns, name).map(|n| n.text().unwrap_or("").trim().to_string())
}

fn timestamp(node: Node<'_, '_>, name: &str) -> Result<Option<DateTime<Utc>>> {
    match child_text(node, ATOM_NS, name) {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| Error::protocol(format!("bad {} timestamp {:?}: {}", name, text, e))),
    }
}

fn parse_count(value: &str, what: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::protocol(format!("bad {} {:?}", what, value)))
}

fn resource_from(node: Node<'_, '_>, base: &Url) -> Result<Resource> {
    let mut links = IndexMap::new();
    for link in node.children().filter(|n| n.has_tag_name((ATOM_NS, "link"))) {
        let (Some(rel), Some(href)) = (link.attribute("rel"), link.attribute("href")) else {
            continue;
        };
        if !links.contains_key(rel) {
            links.insert(rel.to_string(), resolve_href(base, href)?);
        }
    }

    let image_count = child(node, FOTKI_NS, "image-count")
        .and_then(|n| n.attribute("value"))
        .map(|v| parse_count(v, "image-count"))
        .transpose()?;

    let original = node
        .children()
        .find(|n| n.has_tag_name((FOTKI_NS, "img")) && n.attribute("size") == Some("orig"));
    let byte_size = original
        .and_then(|n| n.attribute("bytesize"))
        .map(|v| parse_count(v, "bytesize"))
        .transpose()?;
    let image_href = original
        .and_then(|n| n.attribute("href"))
        .or_else(|| child(node, ATOM_NS, "content").and_then(|n| n.attribute("src")))
        .map(|href| resolve_href(base, href))
        .transpose()?;

    Ok(Resource {
        id: child_text(node, ATOM_NS, "id").unwrap_or_default(),
        title: child_text(node, ATOM_NS, "title").unwrap_or_default(),
        published: timestamp(node, "published")?,
        updated: timestamp(node, "updated")?,
        links,
        image_count,
        byte_size,
        image_href,
    })
}
