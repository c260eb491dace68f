//! tetrasurvey measures the signal quality of a TETRA network from a moving
//! receiver. A radio connected through its peripheral equipment interface
//! (PEI) is polled for its GPS position and the list of base stations it can
//! see. Every scan becomes a [`measurement::Measurement`], and all
//! measurements are aggregated into a coverage picture of 100 m × 100 m
//! UTM grid fields ([`quality::QualityReport`]).
//!
//! The pipeline, from the device up:
//!
//! - [`pei`], [`serial_pei`], [`dummy_pei`]: talking to a radio
//! - [`pei_decoder`], [`scanner`]: turning responses into readings
//! - [`scan_loop`], [`radio`]: periodic scanning and the device lifecycle
//! - [`app`]: the single consumer that aggregates, traces and informs the UI
//!
//! Readings can be written to trace files ([`trace`]) for later evaluation.

#![warn(missing_docs)]
pub mod app;
pub mod args;
pub mod config;
pub mod dummy_pei;
pub mod filter;
pub mod gui;
pub mod measurement;
pub mod pei;
pub mod pei_decoder;
pub mod quality;
pub mod radio;
pub mod reading;
pub mod scan_loop;
pub mod scanner;
pub mod serial_pei;
pub mod signal;
pub mod trace;
pub mod utm;
