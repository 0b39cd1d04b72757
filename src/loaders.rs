pub mod columnar;
pub mod container;
pub mod spreadsheet;
