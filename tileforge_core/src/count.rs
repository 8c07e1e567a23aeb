//! Shared counters attached to stream stages as observers.
//!
//! Counters are process-local and never persisted; clones share the same
//! underlying value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A shared item counter.
#[derive(Clone, Debug, Default)]
pub struct Count(Arc<AtomicU64>);

impl Count {
	#[must_use]
	pub fn new() -> Count {
		Count::default()
	}

	pub fn inc(&self) {
		self.0.fetch_add(1, Ordering::Relaxed);
	}

	#[must_use]
	pub fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}

/// A shared counter tracking items and their payload bytes.
#[derive(Clone, Debug, Default)]
pub struct CountSize {
	count: Arc<AtomicU64>,
	size: Arc<AtomicU64>,
}

impl CountSize {
	#[must_use]
	pub fn new() -> CountSize {
		CountSize::default()
	}

	pub fn observe(&self, bytes: u64) {
		self.count.fetch_add(1, Ordering::Relaxed);
		self.size.fetch_add(bytes, Ordering::Relaxed);
	}

	#[must_use]
	pub fn count(&self) -> u64 {
		self.count.load(Ordering::Relaxed)
	}

	#[must_use]
	pub fn size(&self) -> u64 {
		self.size.load(Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clones_share_the_value() {
		let count = Count::new();
		let other = count.clone();
		count.inc();
		other.inc();
		assert_eq!(count.get(), 2);
	}

	#[test]
	fn count_size_accumulates() {
		let counter = CountSize::new();
		counter.observe(100);
		counter.observe(50);
		assert_eq!(counter.count(), 2);
		assert_eq!(counter.size(), 150);
	}
}
