pub mod algorithms;
pub mod basis;
pub mod config;
pub mod errors;
pub mod generators;
pub mod grids;
pub mod iterators;
pub mod serialization;
pub mod storage;
pub mod utilities;
