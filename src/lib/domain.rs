//! Domain types and services

pub mod delivery;
