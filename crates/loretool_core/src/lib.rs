pub mod config;
pub mod dirty;
pub mod document;
pub mod items;
pub mod manifest;
pub mod runtime;
pub mod session;
pub mod store;
pub mod tree;
pub mod viewer;
