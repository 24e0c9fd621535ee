pub mod formatter;

pub use formatter::{DumpFormat, ExchangeFormatter};
