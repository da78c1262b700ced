#![doc = include_str!("../README.md")]

pub mod cli;
pub mod conversion;
pub mod merge;
pub mod output;
pub mod raw;
pub mod reference;
pub mod upload;

pub use conversion::{convert, ConversionConfig, ConversionSummary};
pub use raw::VendorFormat;
