//! Writing a whole iterator out as one table.

use std::fs::{self, File};
use std::path::Path;

use crate::config::Options;
use crate::error::Result;
use crate::filename::table_file_name;
use crate::iterator::InternalIterator;
use crate::key::InternalKeyComparator;
use crate::storage::{TableBuilder, TableCache};
use crate::version::FileMetaData;

/// Drain `iter` into table `number`. An empty iterator produces no file and
/// a zero `file_size`. The finished table is opened once through the table
/// cache to make sure it is readable.
pub fn build_table(
    dir: &Path,
    options: &Options,
    cmp: &InternalKeyComparator,
    table_cache: &TableCache,
    iter: &mut dyn InternalIterator,
    number: u64,
) -> Result<FileMetaData> {
    let mut meta = FileMetaData {
        number,
        file_size: 0,
        smallest: Vec::new(),
        largest: Vec::new(),
    };

    iter.seek_to_first();
    if !iter.valid() {
        iter.status()?;
        return Ok(meta);
    }

    let path = table_file_name(dir, number);
    let result = write_table(&path, options, cmp, table_cache, iter, &mut meta);
    if let Err(e) = result {
        let _ = fs::remove_file(&path);
        return Err(e);
    }
    Ok(meta)
}

fn write_table(
    path: &Path,
    options: &Options,
    cmp: &InternalKeyComparator,
    table_cache: &TableCache,
    iter: &mut dyn InternalIterator,
    meta: &mut FileMetaData,
) -> Result<()> {
    let file = File::create(path)?;
    let mut builder = TableBuilder::new(options, cmp.clone(), file);

    meta.smallest = iter.key().to_vec();
    while iter.valid() {
        let key = iter.key();
        meta.largest.clear();
        meta.largest.extend_from_slice(key);
        builder.add(key, iter.value())?;
        iter.next();
    }
    iter.status()?;

    meta.file_size = builder.finish()?;
    table_cache.find_table(meta.number, meta.file_size)?;
    Ok(())
}
