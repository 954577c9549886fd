#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod content;
pub mod document;
pub mod formats;
pub mod logging;
pub mod merge;
pub mod metadata;
pub mod openai;
pub mod pipeline;
pub mod scan;
pub mod stats;
pub mod summarize;
pub mod table;
pub mod toc;
