// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Growable accumulation buffer that splits a byte stream on a fixed delimiter.

use crate::framing::FramingError;

/// Starting size of the backing store.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Accumulates incoming chunks and yields every complete payload that is
/// terminated by the delimiter.
///
/// The backing store doubles whenever a chunk would overflow it. Bytes after
/// the last delimiter stay buffered until a later chunk completes them.
#[derive(Debug, Clone)]
pub struct DelimitedBuffer {
    storage: Vec<u8>,
    len: usize,
    delimiter: Vec<u8>,
}

impl DelimitedBuffer {
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Result<Self, FramingError> {
        Self::with_capacity(delimiter, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(delimiter: impl Into<Vec<u8>>, capacity: usize) -> Result<Self, FramingError> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(FramingError::EmptyDelimiter);
        }
        Ok(Self {
            storage: vec![0; capacity.max(1)],
            len: 0,
            delimiter,
        })
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    /// Size of the backing store.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes received but not yet terminated by a delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Appends `chunk` and returns every payload it completes, in order.
    ///
    /// A payload may be empty when two delimiters are adjacent.
    pub fn append_and_scan(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        // A delimiter may straddle the old tail and the new chunk.
        let mut cursor = self.len.saturating_sub(self.delimiter.len() - 1);

        self.reserve(chunk.len());
        self.storage[self.len..self.len + chunk.len()].copy_from_slice(chunk);
        self.len += chunk.len();

        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(offset) = find(&self.storage[cursor..self.len], &self.delimiter) {
            let at = cursor + offset;
            payloads.push(self.storage[start..at].to_vec());
            start = at + self.delimiter.len();
            cursor = start;
        }

        if start > 0 {
            self.storage.copy_within(start..self.len, 0);
            self.len -= start;
        }
        payloads
    }

    /// Drops any partial payload.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    fn reserve(&mut self, additional: usize) {
        let needed = self.len + additional;
        if needed <= self.storage.len() {
            return;
        }
        let mut capacity = self.storage.len();
        while capacity < needed {
            capacity *= 2;
        }
        self.storage.resize(capacity, 0);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
