//! # ytd-rs
//!
//! This crate fetches the stream list of a YouTube video and downloads
//! either the best muxed video or the best audio stream, converting the
//! latter to MP3 with ffmpeg.
//!
//! ## Usage
//!
//! The [`worker::Worker`] owns the HTTP clients, the transcoder and the task
//! registry. Metadata is fetched first, then a download is queued and runs
//! in the background while its progress is published through the registry.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ytd_rs::{config::Config, notify::ConsoleNotifier, pipeline::DownloadFormat, worker::Worker};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let worker = Worker::new(&config, Arc::new(ConsoleNotifier::new())).unwrap();
//!
//!     // Accepts watch, short and shorts links, or text containing one
//!     let metadata = worker.fetch("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
//!     println!("{} by {:?}", metadata.title, metadata.uploader);
//!
//!     worker.enqueue(metadata, DownloadFormat::Audio);
//!     let tasks = worker.registry().wait_all_terminal().await;
//!     println!("{:?}", tasks[0].status);
//! }
//! ```
//!
//! Requests made on behalf of the extractor go through
//! [`adapter::ShapingDownloader`], which fills in user agents, browser
//! headers and consent cookies from a [`policy::HeaderPolicy`] table and
//! reports bot verification pages as [`adapter::RequestError::Challenge`].

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod adapter;
pub mod config;
pub mod extractor;
pub mod ffmpeg;
pub mod media;
pub mod notify;
pub mod pipeline;
pub mod player_response;
pub mod policy;
pub mod tasks;
pub mod util;
pub mod worker;
