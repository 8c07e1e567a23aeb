use serde::Deserialize;
use std::path::PathBuf;

/// A storage backend declaration, dispatched on `type`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum CacheConfig {
	/// Tiles as files below a root directory, WMTS path layout.
	Filesystem { folder: PathBuf },

	/// One SQLite database file per layer below a root directory.
	Sqlite { folder: PathBuf },

	/// An S3 bucket, credentials from the environment.
	S3 {
		bucket: String,
		#[serde(default)]
		folder: String,
	},

	/// In-process cache for tests and dry runs.
	Memory {},
}
