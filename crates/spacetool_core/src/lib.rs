pub mod config;
pub mod confluence;
pub mod extract;
pub mod filesystem;
pub mod ingest;
pub mod markup;
pub mod orchestrate;
pub mod replicate;
pub mod runtime;
pub mod space_key;
pub mod store;

#[cfg(test)]
mod testing;
