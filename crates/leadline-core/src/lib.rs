//! Core types and trait definitions for the Leadline lead pipeline.
//!
//! This crate is free of HTTP and database dependencies. It holds the
//! domain records, the stage registry, the pipeline projections, the bulk
//! executor and the alert gate; storage backends implement the traits in
//! [`store`].

// Native `async fn` in traits; the store traits spell out their `Send`
// bounds explicitly.
#![allow(async_fn_in_trait)]

pub mod alert;
pub mod b2c;
pub mod bulk;
pub mod error;
pub mod lead;
pub mod log;
pub mod matching;
pub mod pipeline;
pub mod stage;
pub mod store;
pub mod upstream;

pub use error::{Error, ErrorKind, Result};
