//! Remote object key construction.
//!
//! Keys are `MyFolderPrivate/<category>/<folders root..leaf>/<blob name>`.
//! The final segment is the opaque blob name, never the user's original
//! filename — remote keys must not leak filenames to the storage
//! provider.

use obscura_types::{FolderId, FolderRecord, MediaType};
use std::collections::{HashMap, HashSet};

/// Fixed namespace prefix for every object this device uploads.
pub const REMOTE_NAMESPACE: &str = "MyFolderPrivate";

/// Read-only view of the folder hierarchy.
pub trait FolderLookup: Send + Sync {
    fn folder(&self, id: &FolderId) -> Option<FolderRecord>;
}

impl FolderLookup for HashMap<FolderId, FolderRecord> {
    fn folder(&self, id: &FolderId) -> Option<FolderRecord> {
        self.get(id).cloned()
    }
}

/// Computes the remote object key for a media record.
///
/// The folder path is built by walking parent links from the leaf to the
/// root, prepending each name so the result reads root-to-leaf. A missing
/// parent truncates the walk instead of failing the upload — a shallower
/// but valid key beats no upload at all. A cycle in the hierarchy also
/// stops the walk.
pub fn object_key(
    media_type: MediaType,
    folder_id: Option<&FolderId>,
    folders: &dyn FolderLookup,
    blob_name: &str,
) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut cursor = folder_id.copied();
    let mut seen: HashSet<FolderId> = HashSet::new();

    while let Some(id) = cursor {
        if !seen.insert(id) {
            break;
        }
        match folders.folder(&id) {
            Some(record) => {
                segments.insert(0, record.name);
                cursor = record.parent;
            }
            None => break,
        }
    }

    let mut parts: Vec<&str> = Vec::with_capacity(segments.len() + 3);
    parts.push(REMOTE_NAMESPACE);
    parts.push(media_type.category_segment());
    parts.extend(segments.iter().map(String::as_str));
    parts.push(blob_name);
    parts.join("/")
}
