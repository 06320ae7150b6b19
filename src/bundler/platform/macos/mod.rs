//! Apple platform backend.
//!
//! - [`app`] - `.app` bundle assembly and `Info.plist`
//! - [`dylib`] - dependency dylibs and load path rewriting
//! - [`sign`] - `codesign` invocation

pub mod app;
pub mod dylib;
pub mod sign;
