//! Two-level iteration: an index cursor whose values open inner cursors.
//!
//! Used for block-structured tables (index block → data block) and for the
//! files of a sorted level (file list → table).

use crate::error::{Result, StrataError};

use super::{EmptyIterator, InternalIterator};

/// Opens the inner iterator for one index value.
pub type BlockFunction = Box<dyn Fn(&[u8]) -> Result<Box<dyn InternalIterator>> + Send>;

pub struct TwoLevelIterator {
    index: Box<dyn InternalIterator>,
    open_block: BlockFunction,
    data: Option<Box<dyn InternalIterator>>,
    /// Index value that produced `data`
    data_handle: Vec<u8>,
    /// First error from a discarded inner iterator
    error: Option<StrataError>,
}

impl TwoLevelIterator {
    pub fn new(index: Box<dyn InternalIterator>, open_block: BlockFunction) -> Self {
        Self {
            index,
            open_block,
            data: None,
            data_handle: Vec::new(),
            error: None,
        }
    }

    fn save_error(&mut self, result: Result<()>) {
        if let Err(e) = result {
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
    }

    fn set_data(&mut self, data: Option<Box<dyn InternalIterator>>) {
        if let Some(old) = self.data.take() {
            self.save_error(old.status());
        }
        self.data = data;
    }

    fn init_data_block(&mut self) {
        if !self.index.valid() {
            self.set_data(None);
            return;
        }
        let handle = self.index.value();
        if self.data.is_some() && handle == self.data_handle.as_slice() {
            return;
        }
        let handle = handle.to_vec();
        let data = match (self.open_block)(&handle) {
            Ok(iter) => iter,
            Err(e) => Box::new(EmptyIterator::with_error(e)),
        };
        self.data_handle = handle;
        self.set_data(Some(data));
    }

    fn data_valid(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.valid())
    }

    fn skip_empty_forward(&mut self) {
        while !self.data_valid() {
            if !self.index.valid() {
                self.set_data(None);
                return;
            }
            self.index.next();
            self.init_data_block();
            if let Some(data) = self.data.as_mut() {
                data.seek_to_first();
            }
        }
    }

    fn skip_empty_backward(&mut self) {
        while !self.data_valid() {
            if !self.index.valid() {
                self.set_data(None);
                return;
            }
            self.index.prev();
            self.init_data_block();
            if let Some(data) = self.data.as_mut() {
                data.seek_to_last();
            }
        }
    }
}

impl InternalIterator for TwoLevelIterator {
    fn valid(&self) -> bool {
        self.data_valid()
    }

    fn seek_to_first(&mut self) {
        self.index.seek_to_first();
        self.init_data_block();
        if let Some(data) = self.data.as_mut() {
            data.seek_to_first();
        }
        self.skip_empty_forward();
    }

    fn seek_to_last(&mut self) {
        self.index.seek_to_last();
        self.init_data_block();
        if let Some(data) = self.data.as_mut() {
            data.seek_to_last();
        }
        self.skip_empty_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index.seek(target);
        self.init_data_block();
        if let Some(data) = self.data.as_mut() {
            data.seek(target);
        }
        self.skip_empty_forward();
    }

    fn next(&mut self) {
        if let Some(data) = self.data.as_mut() {
            data.next();
        }
        self.skip_empty_forward();
    }

    fn prev(&mut self) {
        if let Some(data) = self.data.as_mut() {
            data.prev();
        }
        self.skip_empty_backward();
    }

    fn key(&self) -> &[u8] {
        match &self.data {
            Some(d) => d.key(),
            None => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match &self.data {
            Some(d) => d.value(),
            None => &[],
        }
    }

    fn status(&self) -> Result<()> {
        self.index.status()?;
        if let Some(data) = &self.data {
            data.status()?;
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
