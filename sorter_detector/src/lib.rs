//! Sort Detector
//!
//! The code-recognizer boundary: a small async trait any detector backend
//! implements, two implementations that need no camera hardware, and the
//! capture loop that owns a detector and feeds the recognition ingester.
//!
//! # Module Structure
//!
//! - [`detector`] - the [`detector::Detector`] trait, [`detector::NullDetector`],
//!   [`detector::ScriptedDetector`]
//! - [`camera_loop`] - the long-lived task that drives a detector

pub mod camera_loop;
pub mod detector;

pub use detector::{Detector, NullDetector, ScriptedDetector};
