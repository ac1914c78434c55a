#![deny(unsafe_code)]

pub mod chunk;
pub mod cli;
pub mod config;
pub mod dedup_route;
pub mod header;
pub mod key;
pub mod label_registry;
pub mod merge_stage;
pub mod metadata;
pub mod path_type;
pub mod pipeline;
pub mod sam_writer_spec;
pub mod sort_stage;
pub mod tag;
pub mod thread_pool;
pub mod util;

#[cfg(test)]
pub mod test_utils;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
