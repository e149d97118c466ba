// Copyright 2026 Headshot Contributors
// SPDX-License-Identifier: MIT

//! Headshot: locate a profile photo in a rendered page and save its bytes.
//!
//! A [`Pipeline`] drives one [`Document`] through navigation, ranked
//! candidate resolution, retrieval of remote or inline image data, and
//! persistence. When nothing is found it captures a snapshot and an image
//! inventory instead.

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod naming;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod retrieval;
pub mod types;

pub use config::Settings;
pub use diagnostics::{capture_failure, inspect, InspectionReport};
pub use document::{
    ChromiumDocument, ChromiumOptions, Document, ElementHandle, HtmlDocument, NavigateOptions,
    SnapshotFormat, WaitCondition,
};
pub use error::{
    DecodeError, DocumentError, FetchError, PersistError, PipelineError, RegistryError,
    RetrievalError,
};
pub use fetch::{FetchResponse, Fetcher, HttpFetcher};
pub use locator::{resolve, resolve_with, SelectorAttempt};
pub use naming::{artifact_name, validate_address, AddressRules};
pub use pipeline::{CancelHandle, Pipeline};
pub use progress::{ProgressEvent, ProgressEventKind, TargetState};
pub use registry::{CandidateDescriptor, CandidateRegistry, Classifier, HeuristicRules};
pub use retrieval::{decode_inline, retrieve};
pub use types::*;
