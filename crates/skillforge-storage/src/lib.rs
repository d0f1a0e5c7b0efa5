//! Content and metadata storage for the skill catalog: the ObjectStore
//! (C1) and MetadataStore (C2) components, plus the archive-ingestion
//! helpers the admin upload path and SkillLoader share.

mod archive;
mod keys;
mod metadata_store;
mod metadata_store_local;
mod metadata_store_remote;
mod object_store;
mod object_store_local;
mod object_store_remote;
pub mod sqlite;

pub use archive::{read_tree, sniff_format, unpack_into_scratch, ArchiveFormat};
pub use keys::{latest_key, object_key, skill_prefix, version_from_key, version_prefix};
pub use metadata_store::{MetadataStore, SkillMetadataRow};
pub use metadata_store_local::LocalMetadataStore;
pub use metadata_store_remote::RemoteMetadataStore;
pub use object_store::{FileTree, LatestPointer, ObjectStore};
pub use object_store_local::LocalObjectStore;
pub use object_store_remote::RemoteObjectStore;
pub use sqlite::SqliteHandle;
