//! Script-drawn RGBA overlay and the compositor that blends it onto host frames.

use thiserror::Error;

pub const DEFAULT_OVERLAY_WIDTH: u32 = 240;
pub const DEFAULT_OVERLAY_HEIGHT: u32 = 160;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("unsupported host color depth: {0} bits per pixel")]
    UnsupportedDepth(u32),
    #[error("{depth}-bit channel shifts {shifts:?} do not describe a valid pixel layout")]
    InvalidShifts { depth: u32, shifts: [u32; 3] },
    #[error("frame buffer holds {len} bytes but {width}x{height} at pitch {pitch} needs {needed}")]
    BufferTooSmall { len: usize, needed: usize, width: u32, height: u32, pitch: usize },
}

/// Per-channel alpha blend of `src` over `dst`.
#[inline]
pub fn blend_channel(src: u8, dst: u8, alpha: u8) -> u8 {
    match alpha {
        0 => dst,
        255 => src,
        _ => {
            let (src, dst, alpha) = (i32::from(src), i32::from(dst), i32::from(alpha));
            (((src - dst) * alpha / 255 + dst) & 0xFF) as u8
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Guest integers are `0xRRGGBBAA`.
    pub const fn from_u32(value: u32) -> Self {
        Self::new((value >> 24) as u8, (value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    pub const fn to_u32(self) -> u32 {
        (self.r as u32) << 24 | (self.g as u32) << 16 | (self.b as u32) << 8 | self.a as u32
    }

    /// Accepts a color name or `#rrggbb` / `#rrggbbaa`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            let value = u32::from_str_radix(hex, 16).ok()?;
            return match hex.len() {
                6 => Some(Self::from_u32(value << 8 | 0xFF)),
                8 => Some(Self::from_u32(value)),
                _ => None,
            };
        }
        let value = match text.to_ascii_lowercase().as_str() {
            "white" => 0xFFFFFFFF,
            "black" => 0x000000FF,
            "clear" => 0x00000000,
            "gray" | "grey" => 0x7F7F7FFF,
            "red" => 0xFF0000FF,
            "orange" => 0xFF7F00FF,
            "yellow" => 0xFFFF00FF,
            "chartreuse" => 0x7FFF00FF,
            "green" => 0x00FF00FF,
            "teal" => 0x00FF7FFF,
            "cyan" => 0x00FFFFFF,
            "blue" => 0x0000FFFF,
            "purple" => 0x7F00FFFF,
            "magenta" => 0xFF00FFFF,
            _ => return None,
        };
        Some(Self::from_u32(value))
    }

    fn scale_alpha(self, modifier: u8) -> Self {
        Self { a: (u32::from(self.a) * u32::from(modifier) / 255) as u8, ..self }
    }

    fn over(self, dst: Rgba) -> Rgba {
        if self.a == 255 || dst.a == 0 {
            return self;
        }
        Rgba {
            r: blend_channel(self.r, dst.r, self.a),
            g: blend_channel(self.g, dst.g, self.a),
            b: blend_channel(self.b, dst.b, self.a),
            a: (u32::from(self.a) + u32::from(dst.a) * (255 - u32::from(self.a)) / 255) as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    Bits16,
    Bits24,
    Bits32,
}

impl ColorDepth {
    pub fn from_bits(bits: u32) -> Result<Self, OverlayError> {
        match bits {
            16 => Ok(ColorDepth::Bits16),
            24 => Ok(ColorDepth::Bits24),
            32 => Ok(ColorDepth::Bits32),
            other => Err(OverlayError::UnsupportedDepth(other)),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            ColorDepth::Bits16 => 16,
            ColorDepth::Bits24 => 24,
            ColorDepth::Bits32 => 32,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.bits() as usize / 8
    }

    /// Channel shifts hosts use when they do not override them: 5-5-5 for 16 bits, XRGB otherwise.
    pub fn default_shifts(self) -> [u32; 3] {
        match self {
            ColorDepth::Bits16 => [10, 5, 0],
            ColorDepth::Bits24 | ColorDepth::Bits32 => [16, 8, 0],
        }
    }
}

/// Host pixel encoding: depth plus the bit position of the red, green and blue channels.
///
/// 16-bit pixels carry 5-bit channels; 24- and 32-bit pixels carry byte-aligned 8-bit channels.
/// Pixels are stored little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    depth: ColorDepth,
    shifts: [u32; 3],
}

impl PixelLayout {
    pub fn new(depth_bits: u32, shifts: [u32; 3]) -> Result<Self, OverlayError> {
        let depth = ColorDepth::from_bits(depth_bits)?;
        let valid = match depth {
            ColorDepth::Bits16 => shifts.iter().all(|shift| shift + 5 <= 16),
            ColorDepth::Bits24 => shifts.iter().all(|shift| shift % 8 == 0 && shift + 8 <= 24),
            ColorDepth::Bits32 => shifts.iter().all(|shift| shift % 8 == 0 && shift + 8 <= 32),
        };
        if !valid {
            return Err(OverlayError::InvalidShifts { depth: depth_bits, shifts });
        }
        Ok(Self { depth, shifts })
    }

    pub fn with_default_shifts(depth_bits: u32) -> Result<Self, OverlayError> {
        let depth = ColorDepth::from_bits(depth_bits)?;
        Self::new(depth_bits, depth.default_shifts())
    }

    pub fn depth(&self) -> ColorDepth {
        self.depth
    }

    fn read_raw(&self, pixel: &[u8]) -> u32 {
        match self.depth {
            ColorDepth::Bits16 => u32::from(u16::from_le_bytes([pixel[0], pixel[1]])),
            ColorDepth::Bits24 => u32::from_le_bytes([pixel[0], pixel[1], pixel[2], 0]),
            ColorDepth::Bits32 => u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]),
        }
    }

    fn write_raw(&self, pixel: &mut [u8], raw: u32) {
        let bytes = raw.to_le_bytes();
        let n = self.depth.bytes_per_pixel();
        pixel[..n].copy_from_slice(&bytes[..n]);
    }

    /// Decodes one host pixel into 8-bit channels.
    pub fn decode(&self, pixel: &[u8]) -> [u8; 3] {
        let raw = self.read_raw(pixel);
        self.shifts.map(|shift| match self.depth {
            ColorDepth::Bits16 => (((raw >> shift) & 0x1F) << 3) as u8,
            ColorDepth::Bits24 | ColorDepth::Bits32 => (raw >> shift) as u8,
        })
    }

    /// Encodes 8-bit channels into one host pixel, keeping bits outside the channels untouched.
    pub fn encode(&self, pixel: &mut [u8], rgb: [u8; 3]) {
        let (drop_bits, mask) = match self.depth {
            ColorDepth::Bits16 => (3, 0x1F_u32),
            ColorDepth::Bits24 | ColorDepth::Bits32 => (0, 0xFF_u32),
        };
        let mut raw = self.read_raw(pixel);
        for (channel, shift) in rgb.into_iter().zip(self.shifts) {
            let value = u32::from(channel) >> drop_bits;
            raw = (raw & !(mask << shift)) | ((value & mask) << shift);
        }
        self.write_raw(pixel, raw);
    }
}

/// The canvas guest drawing calls write into between frames.
#[derive(Debug, Clone)]
pub struct OverlayBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
    opacity: u8,
    dirty: bool,
}

impl OverlayBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::TRANSPARENT; width as usize * height as usize],
            opacity: 255,
            dirty: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// `gui.opacity`: 0.0 is invisible, 1.0 is fully opaque.
    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    }

    /// `gui.transparency`: 0 is opaque, 4 is invisible.
    pub fn set_transparency(&mut self, level: f64) {
        self.set_opacity(1.0 - level.clamp(0.0, 4.0) / 4.0);
    }

    pub fn get(&self, x: i64, y: i64) -> Option<Rgba> {
        self.offset(x, y).map(|idx| self.pixels[idx])
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Draws one pixel, blending over what the script already drew there. Off-canvas is ignored.
    pub fn pixel(&mut self, x: i64, y: i64, color: Rgba) {
        let color = color.scale_alpha(self.opacity);
        if color.a == 0 {
            return;
        }
        if let Some(idx) = self.offset(x, y) {
            self.pixels[idx] = color.over(self.pixels[idx]);
            self.dirty = true;
        }
    }

    pub fn line(&mut self, x1: i64, y1: i64, x2: i64, y2: i64, color: Rgba) {
        let (dx, dy) = ((x2 - x1).abs(), -(y2 - y1).abs());
        let (sx, sy) = (if x1 < x2 { 1 } else { -1 }, if y1 < y2 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x1, y1, dx + dy);
        loop {
            self.pixel(x, y, color);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Fills the interior with `fill` and strokes the one-pixel border with `outline`.
    pub fn draw_box(&mut self, x1: i64, y1: i64, x2: i64, y2: i64, fill: Rgba, outline: Rgba) {
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        let (width, height) = (i64::from(self.width), i64::from(self.height));
        let clip_x = |x: i64| x.clamp(-1, width);
        let clip_y = |y: i64| y.clamp(-1, height);
        for y in clip_y(top + 1)..=clip_y(bottom - 1) {
            for x in clip_x(left + 1)..=clip_x(right - 1) {
                self.pixel(x, y, fill);
            }
        }
        for x in clip_x(left)..=clip_x(right) {
            self.pixel(x, top, outline);
            if bottom != top {
                self.pixel(x, bottom, outline);
            }
        }
        for y in clip_y(top + 1)..=clip_y(bottom - 1) {
            self.pixel(left, y, outline);
            if right != left {
                self.pixel(right, y, outline);
            }
        }
    }

    pub fn clear(&mut self) {
        if self.dirty {
            self.pixels.fill(Rgba::TRANSPARENT);
            self.dirty = false;
        }
    }

    /// Blends the canvas onto a host frame, then clears it. Returns whether anything was drawn.
    pub fn composite(
        &mut self,
        frame: &mut [u8],
        pitch: usize,
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> Result<bool, OverlayError> {
        if !self.dirty {
            return Ok(false);
        }
        let bpp = layout.depth().bytes_per_pixel();
        let width = width.min(self.width);
        let height = height.min(self.height);
        if width == 0 || height == 0 {
            self.clear();
            return Ok(false);
        }
        let needed = (height as usize - 1) * pitch + width as usize * bpp;
        if frame.len() < needed || pitch < width as usize * bpp {
            return Err(OverlayError::BufferTooSmall { len: frame.len(), needed, width, height, pitch });
        }
        for y in 0..height as usize {
            let row = &mut frame[y * pitch..y * pitch + width as usize * bpp];
            let src_row = &self.pixels[y * self.width as usize..][..width as usize];
            for (pixel, src) in row.chunks_exact_mut(bpp).zip(src_row) {
                if src.a == 0 {
                    continue;
                }
                let [r, g, b] = layout.decode(pixel);
                layout.encode(
                    pixel,
                    [blend_channel(src.r, r, src.a), blend_channel(src.g, g, src.a), blend_channel(src.b, b, src.a)],
                );
            }
        }
        self.clear();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_identity_exact_and_midpoint() {
        for dst in [0u8, 17, 128, 255] {
            assert_eq!(blend_channel(200, dst, 0), dst);
            assert_eq!(blend_channel(200, dst, 255), 200);
        }
        let mid = blend_channel(200, 100, 128);
        assert!((149..=151).contains(&mid), "midpoint blend was {mid}");
        let mid_down = blend_channel(0, 255, 128);
        assert!((126..=128).contains(&mid_down), "midpoint blend was {mid_down}");
    }

    #[test]
    fn color_parsing() {
        assert_eq!(Rgba::parse("red"), Some(Rgba::new(255, 0, 0, 255)));
        assert_eq!(Rgba::parse("#102030"), Some(Rgba::new(0x10, 0x20, 0x30, 0xFF)));
        assert_eq!(Rgba::parse("#10203040"), Some(Rgba::new(0x10, 0x20, 0x30, 0x40)));
        assert_eq!(Rgba::parse("#1020"), None);
        assert_eq!(Rgba::parse("plaid"), None);
        assert_eq!(Rgba::from_u32(0x11223344).to_u32(), 0x11223344);
    }

    #[test]
    fn unsupported_depth_is_rejected() {
        assert_eq!(PixelLayout::with_default_shifts(8), Err(OverlayError::UnsupportedDepth(8)));
        assert!(matches!(PixelLayout::new(32, [16, 8, 3]), Err(OverlayError::InvalidShifts { .. })));
    }

    #[test]
    fn codecs_match_their_shifts() {
        let layout = PixelLayout::with_default_shifts(16).unwrap();
        let mut pixel = [0u8; 2];
        layout.encode(&mut pixel, [0xF8, 0x08, 0x80]);
        assert_eq!(u16::from_le_bytes(pixel), 0x1F << 10 | 0x01 << 5 | 0x10);
        assert_eq!(layout.decode(&pixel), [0xF8, 0x08, 0x80]);

        let layout = PixelLayout::with_default_shifts(24).unwrap();
        let mut pixel = [0u8; 3];
        layout.encode(&mut pixel, [1, 2, 3]);
        assert_eq!(pixel, [3, 2, 1]);

        let layout = PixelLayout::new(32, [0, 8, 16]).unwrap();
        let mut pixel = [0, 0, 0, 0xAA];
        layout.encode(&mut pixel, [1, 2, 3]);
        assert_eq!(pixel, [1, 2, 3, 0xAA]);
        assert_eq!(layout.decode(&pixel), [1, 2, 3]);
    }

    #[test]
    fn composite_blends_and_clears() {
        let layout = PixelLayout::with_default_shifts(32).unwrap();
        let mut overlay = OverlayBuffer::new(4, 2);
        overlay.pixel(1, 0, Rgba::new(255, 0, 0, 255));
        overlay.pixel(2, 1, Rgba::new(0, 0, 0, 0));
        let pitch = 4 * 4;
        let mut frame = vec![0x40u8; pitch * 2];
        assert_eq!(overlay.composite(&mut frame, pitch, 4, 2, layout), Ok(true));
        assert_eq!(layout.decode(&frame[4..8]), [255, 0, 0]);
        assert_eq!(layout.decode(&frame[0..4]), [0x40, 0x40, 0x40]);
        assert_eq!(layout.decode(&frame[pitch + 8..pitch + 12]), [0x40, 0x40, 0x40]);
        assert!(!overlay.is_dirty());
        assert_eq!(overlay.get(1, 0), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn composite_rejects_short_frames() {
        let layout = PixelLayout::with_default_shifts(16).unwrap();
        let mut overlay = OverlayBuffer::new(4, 4);
        overlay.pixel(0, 0, Rgba::parse("white").unwrap());
        let mut frame = vec![0u8; 10];
        assert!(matches!(overlay.composite(&mut frame, 8, 4, 4, layout), Err(OverlayError::BufferTooSmall { .. })));
    }

    #[test]
    fn opacity_scales_drawn_alpha() {
        let mut overlay = OverlayBuffer::new(2, 2);
        overlay.set_transparency(2.0);
        overlay.pixel(0, 0, Rgba::new(10, 20, 30, 255));
        assert_eq!(overlay.get(0, 0).map(|c| c.a), Some(128));
        overlay.set_transparency(4.0);
        overlay.pixel(1, 1, Rgba::new(10, 20, 30, 255));
        assert_eq!(overlay.get(1, 1), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn box_and_line_stay_on_canvas() {
        let mut overlay = OverlayBuffer::new(8, 8);
        let white = Rgba::parse("white").unwrap();
        let red = Rgba::parse("red").unwrap();
        overlay.draw_box(-3, -3, 20, 20, red, white);
        assert_eq!(overlay.get(0, 0), Some(red));
        overlay.clear();
        overlay.draw_box(1, 1, 4, 4, red, white);
        assert_eq!(overlay.get(1, 1), Some(white));
        assert_eq!(overlay.get(2, 2), Some(red));
        assert_eq!(overlay.get(5, 5), Some(Rgba::TRANSPARENT));
        overlay.clear();
        overlay.line(0, 0, 7, 7, white);
        assert!((0..8).all(|i| overlay.get(i, i) == Some(white)));
        assert_eq!(overlay.get(1, 0), Some(Rgba::TRANSPARENT));
    }
}
