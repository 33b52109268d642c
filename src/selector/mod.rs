//! Selector strings: classification, element names and native queries

pub mod name;
pub mod query;
pub mod strategy;

pub use name::extract_name;
pub use strategy::{classify, LocatorStrategy};
