pub mod azure;
pub mod codec;
pub mod config;
pub mod host;
pub mod ingest;
pub mod node;
pub mod paging;
pub mod source;
pub mod store;
pub mod value;

#[cfg(test)]
mod tests;
