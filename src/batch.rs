//! Write batches
//!
//! An ordered list of puts and deletes applied as one indivisible unit: the
//! whole batch is logged as a single WAL record and shares one sequence
//! number.

use crate::wal::Operation;

/// Per-batch bookkeeping overhead counted by `approximate_size`.
const BATCH_HEADER_SIZE: usize = 12;

/// Receives the operations of a batch in insertion order.
pub trait BatchHandler {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Ordered collection of updates, mutable until submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    operations: Vec<Operation>,
    approximate_size: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.approximate_size += 1 + key.len() + value.len() + 8;
        self.operations.push(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self
    }

    pub fn delete(&mut self, key: &[u8]) -> &mut Self {
        self.approximate_size += 1 + key.len() + 4;
        self.operations.push(Operation::Delete { key: key.to_vec() });
        self
    }

    /// Drop every buffered operation.
    pub fn clear(&mut self) {
        self.operations.clear();
        self.approximate_size = 0;
    }

    /// Append all operations of `other` after this batch's operations.
    pub fn append(&mut self, other: &WriteBatch) {
        self.operations.extend(other.operations.iter().cloned());
        self.approximate_size += other.approximate_size;
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Rough encoded size, used for memory accounting.
    pub fn approximate_size(&self) -> usize {
        BATCH_HEADER_SIZE + self.approximate_size
    }

    /// Replay operations in order.
    pub fn iterate<H: BatchHandler + ?Sized>(&self, handler: &mut H) {
        for op in &self.operations {
            match op {
                Operation::Put { key, value } => handler.put(key, value),
                Operation::Delete { key } => handler.delete(key),
            }
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub(crate) fn from_operations(operations: Vec<Operation>) -> Self {
        let approximate_size = operations
            .iter()
            .map(|op| match op {
                Operation::Put { key, value } => 1 + key.len() + value.len() + 8,
                Operation::Delete { key } => 1 + key.len() + 4,
            })
            .sum();
        Self {
            operations,
            approximate_size,
        }
    }

    pub(crate) fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}
