//! Choosing compaction inputs.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::info;

use crate::comparator::Comparator;
use crate::version::{
    expanded_compaction_byte_size_limit, total_file_size, FileMetaData, VersionSet, NUM_LEVELS,
};

use super::Compaction;

impl VersionSet {
    /// Size-triggered compaction of the level with the highest score, or
    /// `None` when every level is within its budget.
    pub fn pick_compaction(&mut self) -> Option<Compaction> {
        let current = self.current();
        if current.compaction_score < 1.0 {
            return None;
        }
        let level = current.compaction_level;

        // Round-robin: first file past where the last compaction of this
        // level stopped.
        let pointer = &self.compact_pointers[level];
        let files = current.files(level);
        let chosen = files
            .iter()
            .find(|f| pointer.is_empty() || self.cmp.compare(&f.largest, pointer) == Ordering::Greater)
            .or_else(|| files.first())
            .map(Arc::clone)?;

        let mut c = Compaction::new(level, self.max_file_size, Arc::clone(&current));
        c.inputs[0].push(chosen);

        // Level-0 files overlap each other; pull in every file the range touches.
        if level == 0 {
            let (smallest, largest) = self.get_range(&c.inputs[0]);
            c.inputs[0] = current.overlapping_inputs(0, Some(&smallest), Some(&largest));
        }

        self.setup_other_inputs(&mut c);
        Some(c)
    }

    /// Compaction of the files in `level` overlapping `[begin, end]`
    /// (internal keys, `None` for open bounds).
    pub fn compact_range(&mut self, level: usize, begin: Option<&[u8]>, end: Option<&[u8]>) -> Option<Compaction> {
        let current = self.current();
        let mut inputs = current.overlapping_inputs(level, begin, end);
        if inputs.is_empty() {
            return None;
        }

        // Bound a single manual step; the caller loops until the range is done.
        // Level-0 files overlap, so all of them must go together.
        if level > 0 {
            let limit = self.max_file_size as u64;
            let mut total = 0;
            if let Some(cut) = inputs.iter().position(|f| {
                total += f.file_size;
                total >= limit
            }) {
                inputs.truncate(cut + 1);
            }
        }

        let mut c = Compaction::new(level, self.max_file_size, current);
        c.inputs[0] = inputs;
        self.setup_other_inputs(&mut c);
        Some(c)
    }

    fn setup_other_inputs(&mut self, c: &mut Compaction) {
        let level = c.level();
        let version = Arc::clone(&c.input_version);

        let (smallest, mut largest) = self.get_range(&c.inputs[0]);
        c.inputs[1] = version.overlapping_inputs(level + 1, Some(&smallest), Some(&largest));
        let (mut all_start, mut all_limit) = self.get_range2(&c.inputs[0], &c.inputs[1]);

        // Grow the level inputs if that does not change the next-level inputs.
        if !c.inputs[1].is_empty() {
            let expanded0 = version.overlapping_inputs(level, Some(&all_start), Some(&all_limit));
            let inputs1_size = total_file_size(&c.inputs[1]);
            let expanded0_size = total_file_size(&expanded0);
            if expanded0.len() > c.inputs[0].len()
                && inputs1_size + expanded0_size < expanded_compaction_byte_size_limit(self.max_file_size)
            {
                let (new_start, new_limit) = self.get_range(&expanded0);
                let expanded1 = version.overlapping_inputs(level + 1, Some(&new_start), Some(&new_limit));
                if expanded1.len() == c.inputs[1].len() {
                    info!(
                        level,
                        from_files = c.inputs[0].len(),
                        to_files = expanded0.len(),
                        next_level_files = c.inputs[1].len(),
                        "Expanding compaction inputs"
                    );
                    largest = new_limit;
                    c.inputs[0] = expanded0;
                    c.inputs[1] = expanded1;
                    (all_start, all_limit) = self.get_range2(&c.inputs[0], &c.inputs[1]);
                }
            }
        }

        if level + 2 < NUM_LEVELS {
            c.grandparents = version.overlapping_inputs(level + 2, Some(&all_start), Some(&all_limit));
        }

        // The next compaction of this level starts after this range, even if
        // this one fails.
        self.compact_pointers[level] = largest.clone();
        c.edit.set_compact_pointer(level, &largest);
    }

    /// Smallest and largest internal keys across `files` (non-empty).
    fn get_range(&self, files: &[Arc<FileMetaData>]) -> (Vec<u8>, Vec<u8>) {
        let mut smallest: &[u8] = &files[0].smallest;
        let mut largest: &[u8] = &files[0].largest;
        for file in &files[1..] {
            if self.cmp.compare(&file.smallest, smallest) == Ordering::Less {
                smallest = &file.smallest;
            }
            if self.cmp.compare(&file.largest, largest) == Ordering::Greater {
                largest = &file.largest;
            }
        }
        (smallest.to_vec(), largest.to_vec())
    }

    fn get_range2(&self, a: &[Arc<FileMetaData>], b: &[Arc<FileMetaData>]) -> (Vec<u8>, Vec<u8>) {
        let all: Vec<Arc<FileMetaData>> = a.iter().chain(b).cloned().collect();
        self.get_range(&all)
    }
}
