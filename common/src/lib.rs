//! Shared configuration and topology types for ecsbeat.

pub mod command;
pub mod config;
pub mod topology;
