//! In-memory mirror of the remote albums.
//!
//! ```text
//! AlbumStore ── Cached<AlbumMap> ──► Album ── Cached<PhotoMap> ──► Photo ── Cached<image>
//! ```
//!
//! Each level loads on first access and is updated in place by local
//! mutations, so a directory listing after `mkdir` or an upload does not
//! need another round trip.

mod album;
mod photo;
mod store;

use indexmap::IndexMap;
use md5::{Digest, Md5};
use std::sync::Arc;

pub use album::Album;
pub use photo::Photo;
pub use store::AlbumStore;

/// Album title → album, in feed order.
pub type AlbumMap = Arc<IndexMap<String, Arc<Album>>>;

/// Photo file name → photo, in feed order.
pub type PhotoMap = Arc<IndexMap<String, Arc<Photo>>>;

/// Lowercase hex MD5 of `input`.
pub fn md5_hex(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// File name for a photo with this remote title and id.
///
/// Untitled photos (empty or `placeholder`) are named `<md5(id)>.jpg`,
/// which stays stable across reloads. `/` becomes `_`.
pub fn photo_file_name(title: &str, id: &str, placeholder: &str) -> String {
    let title = title.trim();
    if title.is_empty() || title == placeholder || title == "." || title == ".." {
        return hashed_photo_name(id);
    }
    sanitize(title)
}

pub fn hashed_photo_name(id: &str) -> String {
    format!("{}.jpg", md5_hex(id))
}

/// Directory name for an album with this remote title and id.
pub fn album_dir_name(title: &str, id: &str) -> String {
    let title = title.trim();
    if title.is_empty() || title == "." || title == ".." {
        return md5_hex(id);
    }
    sanitize(title)
}

/// Whether a photo uploaded as `name` lists under that same name after a
/// reload. Names the listing would rewrite are refused up front.
pub fn is_stable_photo_name(name: &str, placeholder: &str) -> bool {
    is_stable_name(name) && name != placeholder
}

/// Album counterpart of [`is_stable_photo_name`].
pub fn is_stable_album_name(name: &str) -> bool {
    is_stable_name(name)
}

fn is_stable_name(name: &str) -> bool {
    !name.is_empty()
        && name.trim() == name
        && name != "."
        && name != ".."
        && !name.contains(['/', '\0'])
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect()
}

/// `name` if free in `map`, else `fallback()` if that is free.
pub(crate) fn unique_name<V>(
    map: &IndexMap<String, V>,
    name: String,
    fallback: impl FnOnce() -> String,
) -> Option<String> {
    if !map.contains_key(&name) {
        return Some(name);
    }
    let alt = fallback();
    (!map.contains_key(&alt)).then_some(alt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_placeholder_titles_hash_the_id() {
        let id = "urn:yandex:fotki:user:photo:42";
        let expected = format!("{}.jpg", md5_hex(id));
        assert_eq!(photo_file_name("", id, "Untitled"), expected);
        assert_eq!(photo_file_name("Untitled", id, "Untitled"), expected);
        assert_eq!(photo_file_name("  ", id, "Untitled"), expected);
        // stable
        assert_eq!(photo_file_name("", id, "Untitled"), expected);
    }

    #[test]
    fn test_slashes_replaced() {
        assert_eq!(photo_file_name("a/b.jpg", "x", "Untitled"), "a_b.jpg");
        assert_eq!(album_dir_name("2024/06", "x"), "2024_06");
    }

    #[test]
    fn test_stable_names_match_listing() {
        for name in ["a.jpg", "IMG 0001.jpg", "d41d8cd98f00b204e9800998ecf8427e.jpg"] {
            assert!(is_stable_photo_name(name, "Untitled"));
            assert_eq!(photo_file_name(name, "id", "Untitled"), name);
        }
        for name in ["", " a.jpg", "a.jpg ", "Untitled", ".", ".."] {
            assert!(!is_stable_photo_name(name, "Untitled"), "{:?}", name);
            assert_ne!(photo_file_name(name, "id", "Untitled"), name);
        }
        assert!(is_stable_album_name("Trip"));
        assert!(is_stable_album_name("Untitled"));
        assert!(!is_stable_album_name("Trip "));
        assert!(!is_stable_album_name(".."));
    }

    #[test]
    fn test_unique_name_falls_back() {
        let mut map = IndexMap::new();
        assert_eq!(unique_name(&map, "a".into(), || "b".into()), Some("a".into()));
        map.insert("a".to_string(), 1);
        assert_eq!(unique_name(&map, "a".into(), || "b".into()), Some("b".into()));
        map.insert("b".to_string(), 2);
        assert_eq!(unique_name(&map, "a".into(), || "b".into()), None);
    }
}
