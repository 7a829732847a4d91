//! Capture sources for the host.
//!
//! - [`DxgiCapture`]: DXGI Desktop Duplication (Windows only).
//! - [`TestPattern`]: a moving synthetic pattern, available everywhere.
//!
//! [`Capture`] wraps whichever one the configuration selects so the
//! host session stays statically dispatched.

use std::time::{Duration, Instant};

use rplay_core::{CaptureError, CaptureSource, PixelFormat, RawSurface, StreamError, SurfaceInfo};

use crate::config::CaptureConfig;

// ── Capture ──────────────────────────────────────────────────────

pub enum Capture {
    Dxgi(DxgiCapture),
    TestPattern(TestPattern),
}

impl Capture {
    /// Open the source named in the configuration.
    pub fn open(config: &CaptureConfig) -> Result<Self, StreamError> {
        match config.source.as_str() {
            "dxgi" => Ok(Capture::Dxgi(DxgiCapture::new(config.monitor_index)?)),
            "test-pattern" => Ok(Capture::TestPattern(TestPattern::new(
                config.pattern_width,
                config.pattern_height,
            ))),
            other => Err(StreamError::Usage(format!("unknown capture source {other:?}"))),
        }
    }
}

impl CaptureSource for Capture {
    fn surface_info(&self) -> SurfaceInfo {
        match self {
            Capture::Dxgi(c) => c.surface_info(),
            Capture::TestPattern(c) => c.surface_info(),
        }
    }

    fn acquire_next_surface(&mut self, timeout: Duration) -> Result<RawSurface, CaptureError> {
        match self {
            Capture::Dxgi(c) => c.acquire_next_surface(timeout),
            Capture::TestPattern(c) => c.acquire_next_surface(timeout),
        }
    }
}

// ── TestPattern ──────────────────────────────────────────────────

/// Colour bars with a white bar sweeping left to right, one column step
/// per surface. Never times out.
pub struct TestPattern {
    width: u32,
    height: u32,
    frame: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: 0,
        }
    }

    /// Column the sweeping bar starts at for frame `n`.
    fn bar_x(&self, n: u64) -> u32 {
        ((n * 8) % self.width.max(1) as u64) as u32
    }
}

const BARS: [[u8; 3]; 8] = [
    // B, G, R
    [0xC0, 0xC0, 0xC0],
    [0x00, 0xC0, 0xC0],
    [0xC0, 0xC0, 0x00],
    [0x00, 0xC0, 0x00],
    [0xC0, 0x00, 0xC0],
    [0x00, 0x00, 0xC0],
    [0xC0, 0x00, 0x00],
    [0x10, 0x10, 0x10],
];
const BAR_WIDTH: u32 = 16;

impl CaptureSource for TestPattern {
    fn surface_info(&self) -> SurfaceInfo {
        SurfaceInfo {
            width: self.width,
            height: self.height,
            format: PixelFormat::Bgra8,
        }
    }

    fn acquire_next_surface(&mut self, _timeout: Duration) -> Result<RawSurface, CaptureError> {
        let stride = self.width * 4;
        let mut data = vec![0u8; stride as usize * self.height as usize];
        let bar = self.bar_x(self.frame);

        for row in data.chunks_exact_mut(stride as usize) {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let x = x as u32;
                let [b, g, r] = if x >= bar && x < bar + BAR_WIDTH {
                    [0xFF; 3]
                } else {
                    BARS[(x as usize * BARS.len()) / self.width as usize]
                };
                px.copy_from_slice(&[b, g, r, 0xFF]);
            }
        }

        self.frame += 1;
        Ok(RawSurface {
            width: self.width,
            height: self.height,
            stride,
            format: PixelFormat::Bgra8,
            data,
            timestamp: Instant::now(),
        })
    }
}

// ── DxgiCapture ──────────────────────────────────────────────────

/// Desktop Duplication of one monitor.
///
/// Each acquired desktop image is copied into a CPU-readable staging
/// texture and read back row-padded, exactly as the driver laid it out.
/// The duplication is tied to the display mode it was created under; a
/// mode switch or secure-desktop transition surfaces as a fatal error.
pub struct DxgiCapture {
    width: u32,
    height: u32,

    #[cfg(target_os = "windows")]
    inner: platform::Duplication,
}

impl CaptureSource for DxgiCapture {
    fn surface_info(&self) -> SurfaceInfo {
        SurfaceInfo {
            width: self.width,
            height: self.height,
            format: PixelFormat::Bgra8,
        }
    }

    fn acquire_next_surface(&mut self, timeout: Duration) -> Result<RawSurface, CaptureError> {
        self.capture_frame(timeout)
    }
}

#[cfg(target_os = "windows")]
impl DxgiCapture {
    /// Duplicate monitor `monitor_index` (0 = primary).
    pub fn new(monitor_index: u32) -> Result<Self, StreamError> {
        let inner = platform::Duplication::open(monitor_index)?;
        let (width, height) = inner.size();
        tracing::info!(monitor_index, width, height, "desktop duplication ready");
        Ok(Self {
            width,
            height,
            inner,
        })
    }

    pub fn capture_frame(&mut self, timeout: Duration) -> Result<RawSurface, CaptureError> {
        let (stride, data) = self.inner.next_image(timeout)?;
        Ok(RawSurface {
            width: self.width,
            height: self.height,
            stride,
            format: PixelFormat::Bgra8,
            data,
            timestamp: Instant::now(),
        })
    }
}

#[cfg(not(target_os = "windows"))]
impl DxgiCapture {
    pub fn new(_monitor_index: u32) -> Result<Self, StreamError> {
        Err(CaptureError::Fatal(
            "desktop duplication needs Windows; set capture.source = \"test-pattern\"".into(),
        )
        .into())
    }

    pub fn capture_frame(&mut self, _timeout: Duration) -> Result<RawSurface, CaptureError> {
        Err(CaptureError::Fatal("desktop duplication needs Windows".into()))
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use std::time::Duration;

    use rplay_core::CaptureError;
    use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
    use windows::Win32::Graphics::Direct3D11::{
        D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ,
        D3D11_MAPPED_SUBRESOURCE, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
        D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
    };
    use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
    use windows::Win32::Graphics::Dxgi::{
        DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO, IDXGIDevice, IDXGIOutput1,
        IDXGIOutputDuplication, IDXGIResource,
    };
    use windows::core::Interface;

    fn fatal(what: &str) -> impl FnOnce(windows::core::Error) -> CaptureError + '_ {
        move |e| CaptureError::Fatal(format!("{what}: {e}"))
    }

    pub(super) struct Duplication {
        context: ID3D11DeviceContext,
        duplication: IDXGIOutputDuplication,
        staging: ID3D11Texture2D,
        width: u32,
        height: u32,
    }

    impl Duplication {
        pub(super) fn open(monitor_index: u32) -> Result<Self, CaptureError> {
            let (device, context) = create_device()?;
            let duplication = duplicate_output(&device, monitor_index)?;
            // SAFETY: `duplication` is a live interface.
            let mode = unsafe { duplication.GetDesc() }.ModeDesc;
            let staging = create_staging(&device, mode.Width, mode.Height)?;
            Ok(Self {
                context,
                duplication,
                staging,
                width: mode.Width,
                height: mode.Height,
            })
        }

        pub(super) fn size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        /// Wait for the next desktop image and read it back.
        /// Returns the row pitch and the pixel bytes.
        pub(super) fn next_image(&mut self, timeout: Duration) -> Result<(u32, Vec<u8>), CaptureError> {
            let texture = {
                let lease = FrameLease::acquire(&self.duplication, timeout)?;
                lease.texture()?
            };
            // SAFETY: both textures share the device, format and size.
            unsafe { self.context.CopyResource(&self.staging, &texture) };
            self.read_staging()
        }

        fn read_staging(&self) -> Result<(u32, Vec<u8>), CaptureError> {
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            // SAFETY: the staging texture was created with CPU read access.
            unsafe {
                self.context
                    .Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
            }
            .map_err(fatal("map staging texture"))?;

            let len = mapped.RowPitch as usize * self.height as usize;
            // SAFETY: a mapped subresource spans RowPitch * height bytes
            // until the matching Unmap.
            let data = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) }.to_vec();
            unsafe { self.context.Unmap(&self.staging, 0) };
            Ok((mapped.RowPitch, data))
        }
    }

    /// An acquired duplication frame, released on drop.
    struct FrameLease<'a> {
        duplication: &'a IDXGIOutputDuplication,
        resource: Option<IDXGIResource>,
    }

    impl<'a> FrameLease<'a> {
        fn acquire(duplication: &'a IDXGIOutputDuplication, timeout: Duration) -> Result<Self, CaptureError> {
            let wait_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
            let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
            let mut resource = None;
            // SAFETY: out-pointers are valid for the duration of the call.
            match unsafe { duplication.AcquireNextFrame(wait_ms, &mut info, &mut resource) } {
                Ok(()) => Ok(Self {
                    duplication,
                    resource,
                }),
                Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => Err(CaptureError::Timeout(timeout)),
                Err(e) => Err(CaptureError::Fatal(format!("acquire desktop frame: {e}"))),
            }
        }

        fn texture(&self) -> Result<ID3D11Texture2D, CaptureError> {
            self.resource
                .as_ref()
                .ok_or_else(|| CaptureError::Fatal("acquired frame has no resource".into()))?
                .cast()
                .map_err(fatal("desktop resource is not a texture"))
        }
    }

    impl Drop for FrameLease<'_> {
        fn drop(&mut self) {
            // SAFETY: a frame is held, since `acquire` succeeded.
            let _ = unsafe { self.duplication.ReleaseFrame() };
        }
    }

    fn create_device() -> Result<(ID3D11Device, ID3D11DeviceContext), CaptureError> {
        let mut device = None;
        let mut context = None;
        // SAFETY: out-pointers are valid for the duration of the call.
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(fatal("create D3D11 device"))?;

        match (device, context) {
            (Some(device), Some(context)) => Ok((device, context)),
            _ => Err(CaptureError::Fatal("D3D11 device creation returned nothing".into())),
        }
    }

    fn duplicate_output(device: &ID3D11Device, monitor_index: u32) -> Result<IDXGIOutputDuplication, CaptureError> {
        let adapter = device
            .cast::<IDXGIDevice>()
            .and_then(|d| unsafe { d.GetAdapter() })
            .map_err(fatal("query DXGI adapter"))?;
        // SAFETY: plain COM calls on live interfaces.
        let output = unsafe { adapter.EnumOutputs(monitor_index) }
            .map_err(|e| CaptureError::Fatal(format!("monitor {monitor_index}: {e}")))?;
        let output = output.cast::<IDXGIOutput1>().map_err(fatal("query IDXGIOutput1"))?;
        unsafe { output.DuplicateOutput(device) }.map_err(fatal("duplicate output"))
    }

    fn create_staging(device: &ID3D11Device, width: u32, height: u32) -> Result<ID3D11Texture2D, CaptureError> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };
        let mut texture = None;
        // SAFETY: `desc` outlives the call; no initial data.
        unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .map_err(fatal("create staging texture"))?;
        texture.ok_or_else(|| CaptureError::Fatal("staging texture creation returned nothing".into()))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_has_requested_geometry() {
        let mut pattern = TestPattern::new(64, 32);
        let surface = pattern.acquire_next_surface(Duration::from_millis(1)).unwrap();
        assert_eq!((surface.width, surface.height, surface.stride), (64, 32, 256));
        assert_eq!(surface.data.len(), 64 * 32 * 4);
        assert_eq!(pattern.surface_info().format, PixelFormat::Bgra8);
    }

    #[test]
    fn pattern_moves_between_frames() {
        let mut pattern = TestPattern::new(128, 8);
        let a = pattern.acquire_next_surface(Duration::ZERO).unwrap();
        let b = pattern.acquire_next_surface(Duration::ZERO).unwrap();
        assert_ne!(a.data, b.data);
        // Rows are identical within a frame.
        assert_eq!(a.row(0), a.row(7));
    }

    #[test]
    fn bar_wraps_around() {
        let pattern = TestPattern::new(64, 4);
        assert_eq!(pattern.bar_x(0), 0);
        assert_eq!(pattern.bar_x(8), 0);
        assert_eq!(pattern.bar_x(9), 8);
    }

    #[test]
    fn open_selects_test_pattern() {
        let config = CaptureConfig {
            source: "test-pattern".into(),
            pattern_width: 320,
            pattern_height: 240,
            ..CaptureConfig::default()
        };
        let capture = Capture::open(&config).unwrap();
        assert!(matches!(capture, Capture::TestPattern(_)));
        assert_eq!(capture.surface_info().width, 320);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn dxgi_is_unavailable_off_windows() {
        let err = DxgiCapture::new(0).err().unwrap();
        assert!(matches!(err, StreamError::Capture(CaptureError::Fatal(_))));
    }
}
