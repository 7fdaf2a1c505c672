#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Email delivery through SMTP relays with alternate relays and an HTTP
//! provider as fallbacks

pub mod domain;
pub mod infrastructure;
