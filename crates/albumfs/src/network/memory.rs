//! In-memory AtomPub album service.
//!
//! Speaks the same documents as the remote service so the whole stack
//! (transport, codec, cache, filesystem) can run without a network. Used by
//! the test-suite and by `albumfs --demo`.
//!
//! # URL layout (relative to the base URL)
//!
//! | Path | GET | POST | DELETE |
//! |------|-----|------|--------|
//! | `` | service document | | |
//! | `albums/?page=N` | album feed | create album | |
//! | `album/{id}/` | album entry | | delete album and its photos |
//! | `album/{id}/photos/?page=N` | photo feed | upload photo | |
//! | `photo/{id}/` | photo entry | | delete photo |
//! | `photo/{id}/media` | image bytes | | |

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use indexmap::IndexMap;
use quick_xml::escape::escape;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use url::Url;

use super::client::{Backend, Method, Request, Response};
use crate::error::{Error, Result};
use crate::resource::{atom, decode_slug};

/// Base URL used by [`MemoryService::new`].
pub const DEFAULT_MEMORY_URL: &str = "http://albums.invalid/api/me/";

/// Default number of entries per feed page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct StoredAlbum {
    title: String,
    published: DateTime<Utc>,
    updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredPhoto {
    album: u64,
    title: String,
    bytes: Vec<u8>,
    published: DateTime<Utc>,
    updated: DateTime<Utc>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    clock: DateTime<Utc>,
    albums: IndexMap<u64, StoredAlbum>,
    photos: IndexMap<u64, StoredPhoto>,
    page_size: usize,
    token: Option<String>,
    faults: VecDeque<u16>,
    requests: Vec<String>,
}

impl State {
    fn allocate(&mut self) -> (u64, DateTime<Utc>) {
        self.next_id += 1;
        self.clock += ChronoDuration::minutes(1);
        (self.next_id, self.clock)
    }
}

/// AtomPub album service held in memory. Implements [`Backend`].
#[derive(Debug)]
pub struct MemoryService {
    base: Url,
    state: Mutex<State>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    /// Empty service at [`DEFAULT_MEMORY_URL`].
    pub fn new() -> Self {
        Self::with_base(DEFAULT_MEMORY_URL)
    }

    /// Empty service rooted at `base`. An unparseable base falls back to
    /// [`DEFAULT_MEMORY_URL`].
    pub fn with_base(base: &str) -> Self {
        let mut base = Url::parse(base)
            .or_else(|_| Url::parse(DEFAULT_MEMORY_URL))
            .unwrap_or_else(|_| unreachable!("default memory URL is valid"));
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let clock = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self {
            base,
            state: Mutex::new(State {
                next_id: 0,
                clock,
                albums: IndexMap::new(),
                photos: IndexMap::new(),
                page_size: DEFAULT_PAGE_SIZE,
                token: None,
                faults: VecDeque::new(),
                requests: Vec::new(),
            }),
        }
    }

    /// A service pre-populated with a few small albums.
    pub fn demo() -> Self {
        let service = Self::new();
        let trip = service.add_album("Trip");
        service.add_photo(trip, "beach.jpg", sample_image(100, 1));
        service.add_photo(trip, "sunset.jpg", sample_image(200, 2));
        let home = service.add_album("Home");
        service.add_photo(home, "cat.jpg", sample_image(150, 3));
        service.add_photo(home, "", sample_image(80, 4));
        service.add_album("Empty");
        service
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Service document URL.
    pub fn url(&self) -> &str {
        self.base.as_str()
    }

    pub fn set_page_size(&self, size: usize) {
        self.state().page_size = size.max(1);
    }

    /// Reject requests not carrying `token` with 401.
    pub fn require_token(&self, token: impl Into<String>) {
        self.state().token = Some(token.into());
    }

    /// Answer the next `count` requests with `status` instead of serving them.
    pub fn fail_next(&self, count: usize, status: u16) {
        self.state().faults.extend(std::iter::repeat_n(status, count));
    }

    /// Requests seen so far, as `"METHOD path?query"`.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    /// Create an album directly, bypassing HTTP. Returns its id.
    pub fn add_album(&self, title: &str) -> u64 {
        let mut state = self.state();
        let (id, now) = state.allocate();
        state.albums.insert(
            id,
            StoredAlbum {
                title: title.to_string(),
                published: now,
                updated: now,
            },
        );
        id
    }

    /// Create a photo directly, bypassing HTTP. Returns its id.
    pub fn add_photo(&self, album: u64, title: &str, bytes: Vec<u8>) -> u64 {
        let mut state = self.state();
        let (id, now) = state.allocate();
        state.photos.insert(
            id,
            StoredPhoto {
                album,
                title: title.to_string(),
                bytes,
                published: now,
                updated: now,
            },
        );
        if let Some(stored) = state.albums.get_mut(&album) {
            stored.updated = now;
        }
        id
    }

    pub fn album_titles(&self) -> Vec<String> {
        self.state()
            .albums
            .values()
            .map(|a| a.title.clone())
            .collect()
    }

    /// Titles of the photos in the album titled `album`.
    pub fn photo_titles(&self, album: &str) -> Vec<String> {
        let state = self.state();
        let Some(album_id) = find_album(&state, album) else {
            return Vec::new();
        };
        state
            .photos
            .values()
            .filter(|p| p.album == album_id)
            .map(|p| p.title.clone())
            .collect()
    }

    /// Stored bytes of the photo titled `title` in album `album`.
    pub fn photo_bytes(&self, album: &str, title: &str) -> Option<Vec<u8>> {
        let state = self.state();
        let album_id = find_album(&state, album)?;
        state
            .photos
            .values()
            .find(|p| p.album == album_id && p.title == title)
            .map(|p| p.bytes.clone())
    }

    fn href(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authorized(&self, state: &State, request: &Request) -> bool {
        match &state.token {
            None => true,
            Some(expected) => request
                .header_value("authorization")
                .and_then(|v| v.split_once(' '))
                .is_some_and(|(_, token)| token == expected),
        }
    }

    fn route(&self, state: &mut State, request: &Request, url: &Url) -> Response {
        let Some(path) = url.path().strip_prefix(self.base.path()) else {
            return not_found();
        };
        let page = url
            .query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let segments: Vec<&str> = path.split('/').collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, [""]) => xml(200, self.service_document()),
            (Method::Get, ["albums", ""]) => {
                let ids: Vec<u64> = state.albums.keys().copied().collect();
                let body = self.feed(state, "albums/", "Albums", &ids, page, |s, id| {
                    self.album_entry(s, id)
                });
                xml(200, body)
            }
            (Method::Post, ["albums", ""]) => {
                let body = request.body.as_deref().unwrap_or_default();
                let title = match atom::parse_entry(body, &self.base) {
                    Ok(entry) => entry.title,
                    Err(_) => return Response::new(400, b"bad entry".to_vec()),
                };
                let (id, now) = state.allocate();
                state.albums.insert(
                    id,
                    StoredAlbum {
                        title,
                        published: now,
                        updated: now,
                    },
                );
                xml(201, entry_document(self.album_entry(state, id)))
            }
            (method, ["album", id, ""]) => {
                let Some(id) = parse_id(id).filter(|id| state.albums.contains_key(id)) else {
                    return not_found();
                };
                match method {
                    Method::Get => xml(200, entry_document(self.album_entry(state, id))),
                    Method::Delete => {
                        state.albums.shift_remove(&id);
                        state.photos.retain(|_, p| p.album != id);
                        Response::new(204, Vec::new())
                    }
                    _ => method_not_allowed(),
                }
            }
            (method, ["album", id, "photos", ""]) => {
                let Some(album_id) = parse_id(id).filter(|id| state.albums.contains_key(id))
                else {
                    return not_found();
                };
                match method {
                    Method::Get => {
                        let ids: Vec<u64> = state
                            .photos
                            .iter()
                            .filter(|(_, p)| p.album == album_id)
                            .map(|(id, _)| *id)
                            .collect();
                        let path = format!("album/{}/photos/", album_id);
                        let body = self.feed(state, &path, "Photos", &ids, page, |s, id| {
                            self.photo_entry(s, id)
                        });
                        xml(200, body)
                    }
                    Method::Post => {
                        let title = request
                            .header_value("slug")
                            .map(decode_slug)
                            .unwrap_or_default();
                        let bytes = request.body.clone().unwrap_or_default();
                        let (id, now) = state.allocate();
                        state.photos.insert(
                            id,
                            StoredPhoto {
                                album: album_id,
                                title,
                                bytes,
                                published: now,
                                updated: now,
                            },
                        );
                        if let Some(album) = state.albums.get_mut(&album_id) {
                            album.updated = now;
                        }
                        xml(201, entry_document(self.photo_entry(state, id)))
                    }
                    _ => method_not_allowed(),
                }
            }
            (method, ["photo", id, ""]) => {
                let Some(id) = parse_id(id).filter(|id| state.photos.contains_key(id)) else {
                    return not_found();
                };
                match method {
                    Method::Get => xml(200, entry_document(self.photo_entry(state, id))),
                    Method::Delete => {
                        state.photos.shift_remove(&id);
                        Response::new(204, Vec::new())
                    }
                    _ => method_not_allowed(),
                }
            }
            (Method::Get, ["photo", id, "media"]) => {
                match parse_id(id).and_then(|id| state.photos.get(&id)) {
                    Some(photo) => Response::new(200, photo.bytes.clone()),
                    None => not_found(),
                }
            }
            _ => not_found(),
        }
    }

    fn service_document(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<app:service xmlns:app="{app}" xmlns:atom="{atom}">
  <app:workspace>
    <atom:title>albumfs memory service</atom:title>
    <app:collection href="{albums}" id="album-list"><atom:title>Albums</atom:title></app:collection>
  </app:workspace>
</app:service>"#,
            app = atom::APP_NS,
            atom = atom::ATOM_NS,
            albums = escape(&self.href("albums/")),
        )
    }

    fn feed(
        &self,
        state: &State,
        path: &str,
        title: &str,
        ids: &[u64],
        page: usize,
        entry: impl Fn(&State, u64) -> String,
    ) -> String {
        let size = state.page_size;
        let start = (page - 1).saturating_mul(size);
        let entries: String = ids.iter().skip(start).take(size).map(|id| entry(state, *id)).collect();
        let next = if start.saturating_add(size) < ids.len() {
            format!(
                r#"<link rel="next" href="{}"/>"#,
                escape(&format!("{}?page={}", self.href(path), page + 1))
            )
        } else {
            String::new()
        };
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="{atom}" xmlns:f="{fotki}">
  <id>urn:memory:{path}</id>
  <title>{title}</title>
  <updated>{updated}</updated>
  <link rel="self" href="{self_href}"/>
  {next}
{entries}</feed>"#,
            atom = atom::ATOM_NS,
            fotki = atom::FOTKI_NS,
            path = escape(path),
            title = escape(title),
            updated = state.clock.to_rfc3339(),
            self_href = escape(&self.href(path)),
        )
    }

    fn album_entry(&self, state: &State, id: u64) -> String {
        let Some(album) = state.albums.get(&id) else {
            return String::new();
        };
        let count = state.photos.values().filter(|p| p.album == id).count();
        let href = self.href(&format!("album/{}/", id));
        format!(
            r#"<entry>
  <id>urn:memory:album:{id}</id>
  <title>{title}</title>
  <published>{published}</published>
  <updated>{updated}</updated>
  <link rel="self" href="{href}"/>
  <link rel="edit" href="{href}"/>
  <link rel="photos" href="{photos}"/>
  <f:image-count value="{count}"/>
</entry>
"#,
            title = escape(&album.title),
            published = album.published.to_rfc3339(),
            updated = album.updated.to_rfc3339(),
            href = escape(&href),
            photos = escape(&format!("{}photos/", href)),
        )
    }

    fn photo_entry(&self, state: &State, id: u64) -> String {
        let Some(photo) = state.photos.get(&id) else {
            return String::new();
        };
        let href = self.href(&format!("photo/{}/", id));
        let media = format!("{}media", href);
        format!(
            r#"<entry>
  <id>urn:memory:photo:{id}</id>
  <title>{title}</title>
  <published>{published}</published>
  <updated>{updated}</updated>
  <link rel="self" href="{href}"/>
  <link rel="edit" href="{href}"/>
  <link rel="edit-media" href="{media}"/>
  <f:img size="orig" href="{media}" bytesize="{size}"/>
  <content src="{media}" type="image/jpeg"/>
</entry>
"#,
            title = escape(&photo.title),
            published = photo.published.to_rfc3339(),
            updated = photo.updated.to_rfc3339(),
            href = escape(&href),
            media = escape(&media),
            size = photo.bytes.len(),
        )
    }
}

#[async_trait]
impl Backend for MemoryService {
    async fn exchange(&self, request: &Request) -> Result<Response> {
        let url = Url::parse(&request.url)
            .map_err(|e| Error::TransportFailure(format!("invalid URL: {}", e)))?;
        let mut state = self.state();
        let line = match url.query() {
            Some(query) => format!("{} {}?{}", request.method.as_str(), url.path(), query),
            None => format!("{} {}", request.method.as_str(), url.path()),
        };
        state.requests.push(line);

        if let Some(status) = state.faults.pop_front() {
            return Ok(Response::new(status, Vec::new()));
        }
        if url.origin() != self.base.origin() {
            return Err(Error::TransportFailure(format!(
                "connection refused: {}",
                url.host_str().unwrap_or("")
            )));
        }
        if !self.authorized(&state, request) {
            return Ok(Response::new(401, b"unauthorized".to_vec()));
        }
        Ok(self.route(&mut state, request, &url))
    }
}

fn find_album(state: &State, title: &str) -> Option<u64> {
    state
        .albums
        .iter()
        .find(|(_, a)| a.title == title)
        .map(|(id, _)| *id)
}

fn parse_id(segment: &str) -> Option<u64> {
    segment.parse().ok()
}

fn entry_document(entry: String) -> String {
    // Standalone entries declare their own namespaces.
    entry.replacen(
        "<entry>",
        &format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<entry xmlns="{}" xmlns:f="{}">"#,
            atom::ATOM_NS,
            atom::FOTKI_NS
        ),
        1,
    )
}

fn xml(status: u16, body: String) -> Response {
    Response::new(status, body.into_bytes())
}

fn not_found() -> Response {
    Response::new(404, b"not found".to_vec())
}

fn method_not_allowed() -> Response {
    Response::new(405, b"method not allowed".to_vec())
}

/// Deterministic JPEG-framed filler of exactly `len` bytes (minimum 4).
pub fn sample_image(len: usize, seed: u8) -> Vec<u8> {
    let len = len.max(4);
    let mut bytes = Vec::with_capacity(len);
    bytes.extend_from_slice(&[0xFF, 0xD8]);
    bytes.extend((0..len - 4).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)));
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}
