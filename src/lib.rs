#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rust_2018_idioms,
    unsafe_code
)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]
//! Synthetic load generation against a single topic.
//!
//! A [`Producer`](producer::Producer) splits a byte budget evenly across the
//! partitions of a topic and produces fixed-size, sequence-numbered records to
//! all of them in parallel under one shared byte-rate limit. Progress is folded
//! into a single [`ProduceStatus`](status::ProduceStatus) that is republished
//! to a [`StatusSink`](reporter::StatusSink) after every change.
pub mod client;
pub mod config;
pub mod error;
pub mod generator;
pub mod limiter;
pub mod producer;
pub mod record;
pub mod reporter;
pub mod status;
pub mod topic;
mod worker;

pub use error::{Error, Result};
