//! # rplay — display streaming host and client
//!
//! The host captures the local display (DXGI Desktop Duplication on
//! Windows, or a synthetic test pattern), encodes it to H.264 with the
//! first usable backend and streams length-prefixed packets to a single
//! client over TCP. The client decodes and presents every surface.
//!
//! ## Modes
//!
//! - **Host**: `rplay host [--port N]`
//! - **Client**: `rplay client <ip> [--port N]`
//! - **Encoders**: `rplay encoders` lists backend availability.

pub mod app;
pub mod capture;
pub mod config;
pub mod present;
