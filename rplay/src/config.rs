//! Configuration for the rplay host and client.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rplay_core::{
    ClientConfig, EncoderBackend, EncoderSettings, HostConfig, StreamError, SurfaceInfo,
    TransportOptions,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RplayConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Encoder settings (host).
    pub encoder: EncoderConfig,
    /// Screen capture settings (host).
    pub capture: CaptureConfig,
    /// Presentation settings (client).
    pub client: ClientSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port the host listens on and the client connects to.
    pub port: u16,
    /// Address the host binds to.
    pub bind_address: String,
    /// Deadline for a single send and for connecting, in milliseconds.
    /// 0 disables it.
    pub io_timeout_ms: u64,
    /// Largest accepted payload in bytes.
    pub max_payload_bytes: usize,
    /// Set TCP_NODELAY on the socket.
    pub nodelay: bool,
}

/// Encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Target frames per second; also sets the host pacing interval.
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Keyframe interval in frames.
    pub gop_size: u32,
    /// Maximum consecutive B-frames.
    pub max_b_frames: u32,
    /// Backends the cascade may try: "nvenc", "qsv", "amf", "software".
    pub backends: Vec<String>,
}

/// Screen capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// "dxgi" (Windows desktop duplication) or "test-pattern".
    pub source: String,
    /// Monitor index to capture (0 = primary).
    pub monitor_index: u32,
    /// How long one capture attempt may block, in milliseconds.
    pub timeout_ms: u64,
    /// Test pattern width in pixels.
    pub pattern_width: u32,
    /// Test pattern height in pixels.
    pub pattern_height: u32,
}

/// Client presentation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// How often the presenter is polled for a close request, in milliseconds.
    pub shutdown_poll_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Seconds between throughput reports.
    pub stats_interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for RplayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            encoder: EncoderConfig::default(),
            capture: CaptureConfig::default(),
            client: ClientSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 9000,
            bind_address: "0.0.0.0".into(),
            io_timeout_ms: 5_000,
            max_payload_bytes: rplay_core::DEFAULT_MAX_PAYLOAD,
            nodelay: true,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate: 5_000_000,
            gop_size: 10,
            max_b_frames: 1,
            backends: EncoderBackend::PREFERENCE
                .iter()
                .map(|b| b.to_string())
                .collect(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: if cfg!(target_os = "windows") {
                "dxgi".into()
            } else {
                "test-pattern".into()
            },
            monitor_index: 0,
            timeout_ms: 100,
            pattern_width: 1280,
            pattern_height: 720,
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            shutdown_poll_ms: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            stats_interval_secs: 5,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the file.
    File,
    /// No file at the path; defaults in use.
    Missing,
    /// The file did not parse; defaults in use.
    Invalid(String),
}

impl RplayConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Logging is not up yet when this runs, so the outcome is returned
    /// for the caller to report.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(cfg) => (cfg, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<(), StreamError> {
        let usage = |msg: String| Err(StreamError::Usage(msg));

        if !(1..=240).contains(&self.encoder.fps) {
            return usage(format!("encoder.fps must be 1..=240, got {}", self.encoder.fps));
        }
        if self.encoder.bitrate == 0 {
            return usage("encoder.bitrate must be positive".into());
        }
        if self.network.max_payload_bytes == 0 {
            return usage("network.max_payload_bytes must be positive".into());
        }
        if self.capture.timeout_ms == 0 {
            return usage("capture.timeout_ms must be positive".into());
        }
        if self.capture.pattern_width == 0 || self.capture.pattern_height == 0 {
            return usage("capture.pattern_width/pattern_height must be positive".into());
        }
        if !matches!(self.capture.source.as_str(), "dxgi" | "test-pattern") {
            return usage(format!(
                "capture.source must be \"dxgi\" or \"test-pattern\", got {:?}",
                self.capture.source
            ));
        }
        if self.client.shutdown_poll_ms == 0 {
            return usage("client.shutdown_poll_ms must be positive".into());
        }
        self.backends()?;
        Ok(())
    }

    /// Configured backends, parsed. Order is irrelevant: the cascade
    /// always walks them in preference order.
    pub fn backends(&self) -> Result<Vec<EncoderBackend>, StreamError> {
        if self.encoder.backends.is_empty() {
            return Err(StreamError::Usage("encoder.backends is empty".into()));
        }
        self.encoder
            .backends
            .iter()
            .map(|name| {
                EncoderBackend::from_name(name)
                    .ok_or_else(|| StreamError::Usage(format!("unknown encoder backend {name:?}")))
            })
            .collect()
    }

    /// Encoder settings for surfaces of the given geometry.
    pub fn encoder_settings(&self, surface: SurfaceInfo) -> Result<EncoderSettings, StreamError> {
        Ok(EncoderSettings {
            fps: self.encoder.fps,
            bitrate: self.encoder.bitrate,
            gop_size: self.encoder.gop_size,
            max_b_frames: self.encoder.max_b_frames,
            input_format: surface.format,
            backends: self.backends()?,
            ..EncoderSettings::new(surface.width, surface.height)
        })
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            io_timeout: match self.network.io_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            max_payload: self.network.max_payload_bytes,
            nodelay: self.network.nodelay,
        }
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            capture_timeout: Duration::from_millis(self.capture.timeout_ms),
            stats_interval: Duration::from_secs(self.logging.stats_interval_secs.max(1)),
            ..HostConfig::with_fps(self.encoder.fps)
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            shutdown_poll: Duration::from_millis(self.client.shutdown_poll_ms),
            stats_interval: Duration::from_secs(self.logging.stats_interval_secs.max(1)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rplay_core::PixelFormat;

    #[test]
    fn defaults_match_the_reference_host() {
        let cfg = RplayConfig::default();
        assert_eq!(cfg.network.port, 9000);
        assert_eq!(cfg.encoder.fps, 30);
        assert_eq!(cfg.encoder.bitrate, 5_000_000);
        assert_eq!(cfg.encoder.gop_size, 10);
        assert_eq!(cfg.encoder.max_b_frames, 1);
        assert_eq!(cfg.capture.timeout_ms, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn roundtrip_config() {
        let cfg = RplayConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("max_payload_bytes"));
        let parsed: RplayConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: RplayConfig = toml::from_str("[network]\nport = 9100\n").unwrap();
        assert_eq!(parsed.network.port, 9100);
        assert!(parsed.network.nodelay);
        assert_eq!(parsed.encoder.fps, 30);
    }

    #[test]
    fn missing_and_invalid_files_fall_back() {
        let dir = std::env::temp_dir().join(format!("rplay-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let (cfg, source) = RplayConfig::load(&dir.join("absent.toml"));
        assert_eq!(source, ConfigSource::Missing);
        assert_eq!(cfg, RplayConfig::default());

        let bad = dir.join("bad.toml");
        std::fs::write(&bad, "[network\nport = ").unwrap();
        let (cfg, source) = RplayConfig::load(&bad);
        assert!(matches!(source, ConfigSource::Invalid(_)));
        assert_eq!(cfg, RplayConfig::default());

        let good = dir.join("good.toml");
        std::fs::write(&good, "[encoder]\nfps = 60\n").unwrap();
        let (cfg, source) = RplayConfig::load(&good);
        assert_eq!(source, ConfigSource::File);
        assert_eq!(cfg.encoder.fps, 60);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn validate_rejects_nonsense() {
        let mut cfg = RplayConfig::default();
        cfg.encoder.fps = 0;
        assert!(matches!(cfg.validate(), Err(StreamError::Usage(_))));

        let mut cfg = RplayConfig::default();
        cfg.encoder.backends = vec!["vaapi".into()];
        assert!(matches!(cfg.validate(), Err(StreamError::Usage(_))));

        let mut cfg = RplayConfig::default();
        cfg.encoder.backends.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = RplayConfig::default();
        cfg.capture.source = "x11".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn settings_follow_config_and_surface() {
        let mut cfg = RplayConfig::default();
        cfg.encoder.backends = vec!["software".into()];
        cfg.encoder.bitrate = 2_000_000;

        let settings = cfg
            .encoder_settings(SurfaceInfo {
                width: 1920,
                height: 1080,
                format: PixelFormat::Rgba8,
            })
            .unwrap();
        assert_eq!((settings.width, settings.height), (1920, 1080));
        assert_eq!(settings.bitrate, 2_000_000);
        assert_eq!(settings.input_format, PixelFormat::Rgba8);
        assert_eq!(settings.backends, vec![EncoderBackend::Software]);
    }

    #[test]
    fn zero_timeout_disables_io_deadline() {
        let mut cfg = RplayConfig::default();
        cfg.network.io_timeout_ms = 0;
        assert_eq!(cfg.transport_options().io_timeout, None);
        assert_eq!(
            RplayConfig::default().transport_options().io_timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn pacing_follows_fps() {
        let mut cfg = RplayConfig::default();
        cfg.encoder.fps = 10;
        assert_eq!(cfg.host_config().frame_interval, Duration::from_millis(100));
        assert_eq!(cfg.host_config().capture_timeout, Duration::from_millis(100));
    }
}
