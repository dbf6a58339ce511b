//! Unit tests module
//!
//! Exercises the pure building blocks through the public API.

mod cache;
mod matching;
mod parameter_extraction_tests;
mod params;
mod path_normalization_tests;
