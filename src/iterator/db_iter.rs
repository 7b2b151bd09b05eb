//! User-facing iterator.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::{Result, StrataError};
use crate::key::{extract_user_key, make_internal_key, parse_internal_key, SequenceNumber, ValueType, VALUE_TYPE_FOR_SEEK};
use crate::version::Version;

use super::InternalIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// The inner iterator sits on the entry that produced `key()`
    Forward,
    /// The inner iterator sits just before every entry for `key()`; the
    /// current key and value are cached in `saved_key`/`saved_value`
    Reverse,
}

/// Ordered view over user keys as of one sequence number.
///
/// Each live user key appears once, carrying its newest value with a
/// sequence at or below the ceiling. Tombstoned keys are skipped. The
/// iterator pins the version it was created from, so tables it reads are
/// kept on disk until it is dropped.
///
/// A new iterator is not positioned; call one of the `seek*` methods first.
pub struct DbIterator {
    user_cmp: Arc<dyn Comparator>,
    iter: Box<dyn InternalIterator>,
    sequence: SequenceNumber,
    direction: Direction,
    valid: bool,
    saved_key: Vec<u8>,
    saved_value: Vec<u8>,
    status: Option<StrataError>,
    _version: Arc<Version>,
}

impl DbIterator {
    pub(crate) fn new(
        user_cmp: Arc<dyn Comparator>,
        iter: Box<dyn InternalIterator>,
        sequence: SequenceNumber,
        version: Arc<Version>,
    ) -> Self {
        Self {
            user_cmp,
            iter,
            sequence,
            direction: Direction::Forward,
            valid: false,
            saved_key: Vec::new(),
            saved_value: Vec::new(),
            status: None,
            _version: version,
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Current user key. Only meaningful while `valid()`.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid);
        match self.direction {
            Direction::Forward => extract_user_key(self.iter.key()),
            Direction::Reverse => &self.saved_key,
        }
    }

    /// Current value. Only meaningful while `valid()`.
    pub fn value(&self) -> &[u8] {
        debug_assert!(self.valid);
        match self.direction {
            Direction::Forward => self.iter.value(),
            Direction::Reverse => &self.saved_value,
        }
    }

    /// First error met while iterating, if any.
    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => self.iter.status(),
        }
    }

    pub fn seek_to_first(&mut self) {
        self.direction = Direction::Forward;
        self.saved_value.clear();
        self.iter.seek_to_first();
        if self.iter.valid() {
            self.find_next_user_entry(false);
        } else {
            self.valid = false;
        }
    }

    pub fn seek_to_last(&mut self) {
        self.direction = Direction::Reverse;
        self.saved_value.clear();
        self.iter.seek_to_last();
        self.find_prev_user_entry();
    }

    /// Position at the first user key ≥ `target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.direction = Direction::Forward;
        self.saved_value.clear();
        self.saved_key = make_internal_key(target, self.sequence, VALUE_TYPE_FOR_SEEK);
        self.iter.seek(&self.saved_key);
        if self.iter.valid() {
            self.find_next_user_entry(false);
        } else {
            self.valid = false;
        }
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid);
        if self.direction == Direction::Reverse {
            // saved_key already holds the key to step past
            self.direction = Direction::Forward;
            if self.iter.valid() {
                self.iter.next();
            } else {
                self.iter.seek_to_first();
            }
        } else {
            self.saved_key.clear();
            self.saved_key.extend_from_slice(extract_user_key(self.iter.key()));
            self.iter.next();
        }

        if !self.iter.valid() {
            self.valid = false;
            self.saved_key.clear();
            return;
        }
        self.find_next_user_entry(true);
    }

    pub fn prev(&mut self) {
        debug_assert!(self.valid);
        if self.direction == Direction::Forward {
            // Back up to the last entry of the previous user key
            self.saved_key.clear();
            self.saved_key.extend_from_slice(extract_user_key(self.iter.key()));
            loop {
                self.iter.prev();
                if !self.iter.valid() {
                    self.valid = false;
                    self.saved_key.clear();
                    self.saved_value.clear();
                    return;
                }
                if self.user_cmp.compare(extract_user_key(self.iter.key()), &self.saved_key) == Ordering::Less {
                    break;
                }
            }
            self.direction = Direction::Reverse;
        }
        self.find_prev_user_entry();
    }

    /// Advance to the next visible entry. With `skipping`, entries for user
    /// keys ≤ `saved_key` are hidden.
    fn find_next_user_entry(&mut self, mut skipping: bool) {
        debug_assert!(self.iter.valid());
        debug_assert_eq!(self.direction, Direction::Forward);
        loop {
            match parse_internal_key(self.iter.key()) {
                Some(ikey) if ikey.sequence <= self.sequence => match ikey.value_type {
                    ValueType::Deletion => {
                        self.saved_key.clear();
                        self.saved_key.extend_from_slice(ikey.user_key);
                        skipping = true;
                    }
                    ValueType::Value => {
                        let hidden =
                            skipping && self.user_cmp.compare(ikey.user_key, &self.saved_key) != Ordering::Greater;
                        if !hidden {
                            self.valid = true;
                            self.saved_key.clear();
                            return;
                        }
                    }
                },
                Some(_) => {}
                None => {
                    self.status = Some(StrataError::corruption("malformed internal key during iteration"));
                }
            }
            self.iter.next();
            if !self.iter.valid() {
                break;
            }
        }
        self.saved_key.clear();
        self.valid = false;
    }

    /// Walk backwards collecting the newest visible entry of the previous
    /// user key into `saved_key`/`saved_value`.
    fn find_prev_user_entry(&mut self) {
        debug_assert_eq!(self.direction, Direction::Reverse);
        let mut value_type = ValueType::Deletion;
        while self.iter.valid() {
            match parse_internal_key(self.iter.key()) {
                Some(ikey) if ikey.sequence <= self.sequence => {
                    if value_type != ValueType::Deletion
                        && self.user_cmp.compare(ikey.user_key, &self.saved_key) == Ordering::Less
                    {
                        // Passed the entries of the key we collected
                        break;
                    }
                    value_type = ikey.value_type;
                    match value_type {
                        ValueType::Deletion => {
                            self.saved_key.clear();
                            self.saved_value.clear();
                        }
                        ValueType::Value => {
                            self.saved_key.clear();
                            self.saved_key.extend_from_slice(ikey.user_key);
                            self.saved_value.clear();
                            self.saved_value.extend_from_slice(self.iter.value());
                        }
                    }
                }
                Some(_) => {}
                None => {
                    self.status = Some(StrataError::corruption("malformed internal key during iteration"));
                }
            }
            self.iter.prev();
        }

        if value_type == ValueType::Deletion {
            // Ran off the front
            self.valid = false;
            self.saved_key.clear();
            self.saved_value.clear();
            self.direction = Direction::Forward;
        } else {
            self.valid = true;
        }
    }
}
