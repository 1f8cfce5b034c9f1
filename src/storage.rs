//! Zarr V3 hierarchy plumbing on top of `zarrs` storage.
//!
//! Node metadata is written and read as `zarr.json` documents directly,
//! so that groups and arrays can be created before any chunk is stored.

use std::{fmt::Write as _, path::Path, sync::Arc};

use bytes::Bytes;
use serde_json::{Map, Value};
use zarrs::{
    array::ArrayMetadataV3,
    filesystem::FilesystemStore,
    group::GroupMetadataV3,
    metadata::v3::NodeMetadataV3,
    storage::{ReadableWritableListableStorage, StoreKey, StorePrefix},
};

use crate::{Error, Result};

const ZARR_JSON: &str = "zarr.json";

/// Open a filesystem-backed store rooted at `path`, creating the directory if needed.
pub fn filesystem_store(path: impl AsRef<Path>) -> Result<ReadableWritableListableStorage> {
    std::fs::create_dir_all(path.as_ref())?;
    let store = FilesystemStore::new(path.as_ref()).map_err(Error::zarr)?;
    Ok(Arc::new(store))
}

/// Join a parent node path and a child name, e.g. `/images` + `a` -> `/images/a`.
pub fn child_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{parent}/{name}")
}

fn metadata_key(node_path: &str) -> Result<StoreKey> {
    let trimmed = node_path.trim_matches('/');
    let key = if trimmed.is_empty() {
        ZARR_JSON.to_string()
    } else {
        format!("{trimmed}/{ZARR_JSON}")
    };
    StoreKey::new(key).map_err(Error::zarr)
}

fn node_prefix(node_path: &str) -> Result<StorePrefix> {
    let trimmed = node_path.trim_matches('/');
    if trimmed.is_empty() {
        Ok(StorePrefix::root())
    } else {
        StorePrefix::new(format!("{trimmed}/")).map_err(Error::zarr)
    }
}

fn put_node(
    store: &ReadableWritableListableStorage,
    node_path: &str,
    node: &NodeMetadataV3,
) -> Result<()> {
    let key = metadata_key(node_path)?;
    let json = serde_json::to_vec_pretty(node)?;
    store.set(&key, Bytes::from(json)).map_err(Error::zarr)?;
    log::debug!("wrote {}", key.as_str());
    Ok(())
}

/// Write group metadata with the given attributes.
pub fn put_group(
    store: &ReadableWritableListableStorage,
    node_path: &str,
    attributes: Map<String, Value>,
) -> Result<()> {
    let meta = GroupMetadataV3::default().with_attributes(attributes);
    put_node(store, node_path, &NodeMetadataV3::Group(meta))
}

/// Write array metadata; chunks can then be stored through [zarrs::array::Array::open].
pub fn put_array_metadata(
    store: &ReadableWritableListableStorage,
    node_path: &str,
    metadata: ArrayMetadataV3,
) -> Result<()> {
    put_node(store, node_path, &NodeMetadataV3::Array(metadata))
}

/// Read the metadata of a node, if there is one at `node_path`.
pub fn node_metadata(
    store: &ReadableWritableListableStorage,
    node_path: &str,
) -> Result<Option<NodeMetadataV3>> {
    let key = metadata_key(node_path)?;
    let Some(bytes) = store.get(&key).map_err(Error::zarr)? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Attributes of a node, or an empty map if the node does not exist.
pub fn node_attributes(
    store: &ReadableWritableListableStorage,
    node_path: &str,
) -> Result<Map<String, Value>> {
    Ok(match node_metadata(store, node_path)? {
        Some(NodeMetadataV3::Group(g)) => g.attributes,
        Some(NodeMetadataV3::Array(a)) => a.attributes,
        None => Map::new(),
    })
}

/// Names of the child nodes of `node_path`, sorted.
pub fn children(store: &ReadableWritableListableStorage, node_path: &str) -> Result<Vec<String>> {
    let prefix = node_prefix(node_path)?;
    let listing = store.list_dir(&prefix).map_err(Error::zarr)?;
    let mut names = Vec::new();
    for child in listing.prefixes() {
        let name = child
            .as_str()
            .strip_prefix(prefix.as_str())
            .unwrap_or(child.as_str())
            .trim_end_matches('/');
        // plain directories such as chunk folders are not nodes
        if node_metadata(store, &child_path(node_path, name))?.is_some() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Render the hierarchy below the root, one node per line.
pub fn tree(store: &ReadableWritableListableStorage) -> Result<String> {
    let mut out = String::from("/\n");
    tree_inner(store, "/", " ", &mut out)?;
    Ok(out)
}

fn tree_inner(
    store: &ReadableWritableListableStorage,
    node_path: &str,
    indent: &str,
    out: &mut String,
) -> Result<()> {
    let names = children(store, node_path)?;
    let count = names.len();
    for (idx, name) in names.into_iter().enumerate() {
        let last = idx + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let path = child_path(node_path, &name);
        match node_metadata(store, &path)? {
            Some(NodeMetadataV3::Array(a)) => {
                let shape = a
                    .shape
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(
                    out,
                    "{indent}{branch}{name} ({shape}) {}",
                    a.data_type.name()
                )
                .map_err(Error::wrap)?;
            }
            _ => {
                writeln!(out, "{indent}{branch}{name}").map_err(Error::wrap)?;
                let child_indent = format!("{indent}{}", if last { "    " } else { "│   " });
                tree_inner(store, &path, &child_indent, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Compression, uint16_array_metadata};

    #[test]
    fn hierarchy_roundtrip_and_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let store = filesystem_store(tmp.path().join("h.zarr")).unwrap();
        put_group(&store, "/", Map::new()).unwrap();
        put_group(&store, "/images", Map::new()).unwrap();
        let mut attrs = Map::new();
        attrs.insert("k".into(), Value::from(1));
        put_group(&store, "/images/Channel B", attrs).unwrap();
        put_group(&store, "/images/Channel A", Map::new()).unwrap();
        let meta = uint16_array_metadata(&[2, 3, 4], &[1, 3, 4], &Compression::Raw).unwrap();
        put_array_metadata(&store, "/images/Channel A/0", meta).unwrap();

        assert_eq!(children(&store, "/").unwrap(), ["images"]);
        assert_eq!(
            children(&store, "/images").unwrap(),
            ["Channel A", "Channel B"]
        );
        assert_eq!(
            node_attributes(&store, "/images/Channel B").unwrap()["k"],
            1
        );
        assert!(node_metadata(&store, "/missing").unwrap().is_none());

        let rendered = tree(&store).unwrap();
        assert_eq!(
            rendered,
            "/\n \
             └── images\n     \
             ├── Channel A\n     \
             │   └── 0 (2, 3, 4) uint16\n     \
             └── Channel B\n"
        );
    }

    #[test]
    fn paths_and_keys() {
        assert_eq!(child_path("/", "images"), "/images");
        assert_eq!(child_path("/images", "a"), "/images/a");
        assert_eq!(metadata_key("/").unwrap().as_str(), "zarr.json");
        assert_eq!(
            metadata_key("/images/a").unwrap().as_str(),
            "images/a/zarr.json"
        );
    }
}
