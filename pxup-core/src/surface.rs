//! Raster surface abstraction.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

/// A 16-bit RGB565 color as carried on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb565(pub u16);

impl Rgb565 {
    pub const BLACK: Rgb565 = Rgb565(0x0000);
    pub const WHITE: Rgb565 = Rgb565(0xFFFF);
    pub const RED: Rgb565 = Rgb565(0xF800);
    pub const GREEN: Rgb565 = Rgb565(0x07E0);
    pub const BLUE: Rgb565 = Rgb565(0x001F);

    /// Expands to 8-bit channels, replicating high bits into the low ones.
    pub fn to_rgb888(self) -> [u8; 3] {
        let r = ((self.0 >> 11) & 0x1F) as u8;
        let g = ((self.0 >> 5) & 0x3F) as u8;
        let b = (self.0 & 0x1F) as u8;
        [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
    }
}

impl fmt::Debug for Rgb565 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rgb565({:#06x})", self.0)
    }
}

impl From<u16> for Rgb565 {
    fn from(raw: u16) -> Self {
        Rgb565(raw)
    }
}

/// The raster target frames are applied to.
///
/// Callers guarantee every coordinate passed in lies inside
/// `[0, width) x [0, height)` and that runs do not cross the right edge.
pub trait Surface {
    fn width(&self) -> u16;

    fn height(&self) -> u16;

    fn set_pixel(&mut self, x: u16, y: u16, color: Rgb565);

    /// Writes `length` pixels of `color` starting at `(x0, y)`.
    fn fill_run(&mut self, x0: u16, y: u16, length: u16, color: Rgb565);

    /// Number of addressable pixels.
    fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Fills the whole surface one row at a time.
    fn clear(&mut self, color: Rgb565) {
        let width = self.width();
        if width == 0 {
            return;
        }
        for y in 0..self.height() {
            self.fill_run(0, y, width, color);
        }
    }
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn width(&self) -> u16 {
        (**self).width()
    }

    fn height(&self) -> u16 {
        (**self).height()
    }

    fn set_pixel(&mut self, x: u16, y: u16, color: Rgb565) {
        (**self).set_pixel(x, y, color)
    }

    fn fill_run(&mut self, x0: u16, y: u16, length: u16, color: Rgb565) {
        (**self).fill_run(x0, y, length, color)
    }
}

/// In-memory RGB565 framebuffer.
#[derive(Clone)]
pub struct MemorySurface {
    width: u16,
    height: u16,
    pixels: Vec<Rgb565>,
    pixels_written: u64,
}

impl MemorySurface {
    /// Creates a black surface of the given size.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgb565::BLACK; width as usize * height as usize],
            pixels_written: 0,
        }
    }

    /// Returns the color at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u16, y: u16) -> Option<Rgb565> {
        if x < self.width && y < self.height {
            Some(self.pixels[self.index(x, y)])
        } else {
            None
        }
    }

    /// Returns all pixels in row-major order.
    pub fn pixels(&self) -> &[Rgb565] {
        &self.pixels
    }

    /// Returns the total number of pixel writes since creation.
    pub fn pixels_written(&self) -> u64 {
        self.pixels_written
    }

    /// Sets every pixel to `color` without counting the writes.
    pub fn fill(&mut self, color: Rgb565) {
        self.pixels.fill(color);
    }

    /// Writes the surface as a binary PPM (P6) image.
    pub fn write_ppm<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "P6\n{} {}\n255\n", self.width, self.height)?;
        let mut row = Vec::with_capacity(self.width as usize * 3);
        for line in self.pixels.chunks(self.width.max(1) as usize) {
            row.clear();
            for px in line {
                row.extend_from_slice(&px.to_rgb888());
            }
            out.write_all(&row)?;
        }
        out.flush()
    }

    /// Saves the surface as a PPM file.
    pub fn save_ppm(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_ppm(io::BufWriter::new(file))
    }

    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl fmt::Debug for MemorySurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels_written", &self.pixels_written)
            .finish()
    }
}

impl Surface for MemorySurface {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn set_pixel(&mut self, x: u16, y: u16, color: Rgb565) {
        let idx = self.index(x, y);
        self.pixels[idx] = color;
        self.pixels_written += 1;
    }

    fn fill_run(&mut self, x0: u16, y: u16, length: u16, color: Rgb565) {
        let start = self.index(x0, y);
        self.pixels[start..start + length as usize].fill(color);
        self.pixels_written += length as u64;
    }
}
