//! Internal key format
//!
//! Every record is stored under an internal key:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────┐
//! │ user key (var)   │ tag: (sequence << 8 | type) u64 LE   │
//! └──────────────────┴──────────────────────────────────────┘
//! ```
//!
//! Ordering: user key ascending (via the user comparator), then tag
//! descending, so the newest version of a key sorts first.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::coding::decode_fixed64;
use crate::comparator::Comparator;

/// Monotonically increasing write counter.
pub type SequenceNumber = u64;

/// Sequence numbers share the tag with an 8-bit type.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Size of the trailing tag.
pub const TAG_SIZE: usize = 8;

/// Kind of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    /// Tombstone
    Deletion = 0x00,
    /// Live value
    Value = 0x01,
}

/// Highest type; seeking with it lands on the newest entry `<=` a sequence.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl ValueType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ValueType::Deletion),
            0x01 => Some(ValueType::Value),
            _ => None,
        }
    }
}

pub fn pack_sequence_and_type(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}

pub fn append_internal_key(dst: &mut Vec<u8>, user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) {
    dst.extend_from_slice(user_key);
    dst.extend_from_slice(&pack_sequence_and_type(sequence, value_type).to_le_bytes());
}

pub fn make_internal_key(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_key.len() + TAG_SIZE);
    append_internal_key(&mut key, user_key, sequence, value_type);
    key
}

/// Borrowed view of a decoded internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl fmt::Display for ParsedInternalKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' @ {} : {:?}",
            String::from_utf8_lossy(self.user_key),
            self.sequence,
            self.value_type
        )
    }
}

pub fn parse_internal_key(internal_key: &[u8]) -> Option<ParsedInternalKey<'_>> {
    if internal_key.len() < TAG_SIZE {
        return None;
    }
    let split = internal_key.len() - TAG_SIZE;
    let tag = decode_fixed64(&internal_key[split..]);
    let value_type = ValueType::from_u8((tag & 0xff) as u8)?;
    Some(ParsedInternalKey {
        user_key: &internal_key[..split],
        sequence: tag >> 8,
        value_type,
    })
}

/// User-key portion of an internal key. Malformed (short) keys yield themselves.
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    if internal_key.len() < TAG_SIZE {
        return internal_key;
    }
    &internal_key[..internal_key.len() - TAG_SIZE]
}

fn extract_tag(internal_key: &[u8]) -> u64 {
    if internal_key.len() < TAG_SIZE {
        return 0;
    }
    decode_fixed64(&internal_key[internal_key.len() - TAG_SIZE..])
}

/// Orders internal keys with a user comparator.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user: Arc<dyn Comparator>) -> Self {
        Self { user }
    }

    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user
    }

    pub fn compare_user(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user.compare(a, b)
    }
}

impl fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalKeyComparator")
            .field("user", &self.user.name())
            .finish()
    }
}

impl Comparator for InternalKeyComparator {
    fn name(&self) -> &str {
        "stratakv.InternalKeyComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.user.compare(extract_user_key(a), extract_user_key(b)) {
            // Higher tag (newer) sorts first
            Ordering::Equal => extract_tag(b).cmp(&extract_tag(a)),
            other => other,
        }
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let user_start = extract_user_key(start);
        let user_limit = extract_user_key(limit);
        let mut tmp = user_start.to_vec();
        self.user.find_shortest_separator(&mut tmp, user_limit);
        if tmp.len() < user_start.len() && self.user.compare(user_start, &tmp) == Ordering::Less {
            // Physically shorter but logically larger: tag with the earliest
            // possible position for that user key.
            tmp.extend_from_slice(
                &pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK).to_le_bytes(),
            );
            debug_assert!(self.compare(start, &tmp) == Ordering::Less);
            debug_assert!(self.compare(&tmp, limit) == Ordering::Less);
            *start = tmp;
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let user_key = extract_user_key(key);
        let mut tmp = user_key.to_vec();
        self.user.find_short_successor(&mut tmp);
        if tmp.len() < user_key.len() && self.user.compare(user_key, &tmp) == Ordering::Less {
            tmp.extend_from_slice(
                &pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK).to_le_bytes(),
            );
            *key = tmp;
        }
    }
}

/// Key used for point lookups: `user_key` at `sequence`, positioned so that a
/// seek lands on the newest entry not newer than `sequence`.
#[derive(Debug, Clone)]
pub struct LookupKey {
    internal: Vec<u8>,
}

impl LookupKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> Self {
        Self {
            internal: make_internal_key(user_key, sequence, VALUE_TYPE_FOR_SEEK),
        }
    }

    pub fn internal_key(&self) -> &[u8] {
        &self.internal
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.internal)
    }
}
