//! Client-side presenter.
//!
//! [`LogPresenter`] checks each decoded surface and reports presentation
//! rate through `tracing` instead of drawing to a window. The close flag
//! plays the role of a window's close button: Ctrl-C sets it and the
//! client loop picks it up on its next poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use rplay_core::{PlanarFrame, Presenter, StreamError, ThroughputMeter};

pub struct LogPresenter {
    close: Arc<AtomicBool>,
    meter: ThroughputMeter,
    report_interval: Duration,
    last_report: Instant,
    presented: u64,
    geometry: Option<(u32, u32)>,
}

impl LogPresenter {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            close: Arc::new(AtomicBool::new(false)),
            meter: ThroughputMeter::new(),
            report_interval,
            last_report: Instant::now(),
            presented: 0,
            geometry: None,
        }
    }

    /// Setting the returned flag asks the client session to stop.
    pub fn close_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.close)
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

fn check_planes(frame: &PlanarFrame) -> Result<(), StreamError> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));

    if w == 0 || h == 0 {
        return Err(StreamError::Present(format!("empty surface {w}x{h}")));
    }
    if frame.y_stride < w || frame.uv_stride < cw {
        return Err(StreamError::Present(format!(
            "strides {}/{} too small for {w}x{h}",
            frame.y_stride, frame.uv_stride
        )));
    }
    let luma = frame.y_stride * (h - 1) + w;
    let chroma = frame.uv_stride * (ch - 1) + cw;
    if frame.y.len() < luma || frame.u.len() < chroma || frame.v.len() < chroma {
        return Err(StreamError::Present(format!(
            "planes truncated for {w}x{h}: y={} u={} v={}",
            frame.y.len(),
            frame.u.len(),
            frame.v.len()
        )));
    }
    Ok(())
}

impl Presenter for LogPresenter {
    fn present_surface(&mut self, frame: &PlanarFrame) -> Result<(), StreamError> {
        check_planes(frame)?;

        let geometry = (frame.width, frame.height);
        if self.geometry != Some(geometry) {
            info!(width = frame.width, height = frame.height, "presenting surfaces");
            self.geometry = Some(geometry);
        }

        self.presented += 1;
        self.meter.record((frame.y.len() + frame.u.len() + frame.v.len()) as u64);

        if self.last_report.elapsed() >= self.report_interval {
            info!(
                fps = format!("{:.1}", self.meter.packets_per_sec()),
                presented = self.presented,
                "client presentation"
            );
            self.last_report = Instant::now();
        }
        debug!(pts = frame.pts, "surface presented");
        Ok(())
    }

    fn poll_shutdown_requested(&mut self) -> bool {
        self.close.load(Ordering::SeqCst)
    }
}

// ── Tests ────────────────────────────────────────────────────────
