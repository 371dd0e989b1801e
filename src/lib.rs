//! Library entry point for devsweep: discovery, sizing and safe reclamation of
//! development tool caches.

pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod guard;
pub mod manager;
pub mod memo;
pub mod model;
pub mod progress;
pub mod size;
pub mod source;
