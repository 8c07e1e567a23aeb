//! This module provides the [`Blob`] struct, a thin wrapper around [`Vec<u8>`]
//! used for raw tile data.

use std::fmt::Debug;

/// A simple wrapper around [`Vec<u8>`] holding the raw bytes of a tile image.
///
/// # Examples
///
/// ```rust
/// use tileforge_core::Blob;
///
/// let blob = Blob::from("Hello, world!");
/// assert_eq!(blob.len(), 13);
/// assert_eq!(blob.as_str(), "Hello, world!");
/// ```
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Returns the underlying bytes as a slice.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		self.0.as_slice()
	}

	/// Returns the content interpreted as UTF-8 text (lossy).
	#[must_use]
	pub fn as_str(&self) -> &str {
		std::str::from_utf8(&self.0).unwrap_or("")
	}

	/// Consumes the `Blob`, returning the underlying vector.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Length in bytes.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether the blob holds no bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(vec: Vec<u8>) -> Self {
		Blob(vec)
	}
}

impl From<&[u8]> for Blob {
	fn from(slice: &[u8]) -> Self {
		Blob(slice.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(array: &[u8; N]) -> Self {
		Blob(array.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(text: &str) -> Self {
		Blob(text.as_bytes().to_vec())
	}
}

impl From<String> for Blob {
	fn from(text: String) -> Self {
		Blob(text.into_bytes())
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_fmt(format_args!("Blob({} bytes)", self.0.len()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basics() {
		let blob = Blob::from(vec![1u8, 2, 3]);
		assert_eq!(blob.len(), 3);
		assert!(!blob.is_empty());
		assert_eq!(blob.as_slice(), &[1, 2, 3]);
		assert_eq!(blob.clone().into_vec(), vec![1, 2, 3]);
	}

	#[test]
	fn empty() {
		let blob = Blob::new_empty();
		assert_eq!(blob.len(), 0);
		assert!(blob.is_empty());
	}

	#[test]
	fn from_text() {
		let blob = Blob::from("Xylofön");
		assert_eq!(blob.as_str(), "Xylofön");
	}

	#[test]
	fn debug_format() {
		assert_eq!(format!("{:?}", Blob::from("abc")), "Blob(3 bytes)");
	}
}
