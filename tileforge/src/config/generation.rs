use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
	/// Cache written to when `--cache` is not given.
	#[serde(default)]
	pub default_cache: Option<String>,

	/// Layers generated when `--layer` is not given.
	#[serde(default)]
	pub default_layers: Vec<String>,

	/// Consecutive errored tiles tolerated before the run aborts.
	#[serde(default = "default_maxconsecutive_errors")]
	pub maxconsecutive_errors: u32,

	/// Append errored coordinates to this file, timestamped.
	#[serde(default)]
	pub error_file: Option<PathBuf>,

	/// Number of processes a `local` run is partitioned across.
	#[serde(default = "default_number_process")]
	pub number_process: usize,

	/// Only this user may run generation.
	#[serde(default)]
	pub authorised_user: Option<String>,
}

fn default_maxconsecutive_errors() -> u32 {
	10
}

fn default_number_process() -> usize {
	1
}

impl Default for GenerationConfig {
	fn default() -> Self {
		GenerationConfig {
			default_cache: None,
			default_layers: Vec::new(),
			maxconsecutive_errors: default_maxconsecutive_errors(),
			error_file: None,
			number_process: default_number_process(),
			authorised_user: None,
		}
	}
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
	/// e.g. `redis://127.0.0.1:6379`
	pub url: String,

	#[serde(default = "default_stream")]
	pub stream: String,

	#[serde(default = "default_group")]
	pub group: String,

	/// How long a pull blocks on an empty queue, in milliseconds.
	#[serde(default = "default_block_ms")]
	pub block_ms: usize,
}

fn default_stream() -> String {
	"tileforge:jobs".to_string()
}

fn default_group() -> String {
	"generators".to_string()
}

fn default_block_ms() -> usize {
	5000
}
