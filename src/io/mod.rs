//! File adapters: workbooks in, JSON store, workbooks out.

pub mod excel_read;
pub mod excel_write;
pub mod store_file;
