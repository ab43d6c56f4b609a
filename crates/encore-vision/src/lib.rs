//! Challenge-image preprocessing and text recognition.
//!
//! The reservation popup gates seat selection behind an image challenge.
//! This crate turns a captured challenge region into a submittable code:
//!
//! - [`preprocess`]: greyscale + contrast boost + 2x linear upscale, purely
//!   to raise recognition accuracy.
//! - [`ocr`]: the [`TextRecognizer`] seam with a tesseract-CLI backend and a
//!   scripted stub for tests.
//! - [`code`]: filtering raw recognition output down to the 6-letter
//!   candidate the page accepts.

pub mod code;
pub mod error;
pub mod ocr;
pub mod preprocess;

pub use code::{extract_candidate, is_submittable, CHALLENGE_CODE_LEN, UPPERCASE_WHITELIST};
pub use error::VisionError;
pub use ocr::{QueuedRecognizer, TesseractBackend, TextRecognizer};
pub use preprocess::prepare_for_recognition;
