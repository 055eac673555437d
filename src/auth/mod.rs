pub mod access;

pub use access::{AccessPolicy, AllowAll};
