//! Integration test crate for Video Upscaler Pro.
//!
//! Holds cross-crate tests that drive the orchestrator end to end against
//! in-memory sources and sinks and scripted capabilities.

#[cfg(test)]
mod support;

#[cfg(test)]
mod upscale;

#[cfg(test)]
mod interpolate;

#[cfg(test)]
mod media;
