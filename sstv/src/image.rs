//! Frame-buffer abstractions shared by both pipelines.

use image::RgbImage;

use crate::color;

/// A color plane as it appears on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
    /// ITU-601 luminance.
    Luma,
    /// R-Y color difference.
    ChromaRed,
    /// B-Y color difference.
    ChromaBlue,
    /// FAX monochrome luminance.
    Mono,
}

impl Channel {
    /// Plane value of one pixel in 0.0..=255.0.
    pub fn value<F>(&self, frame: &F, x: u32, y: u32) -> f64
    where
        F: FrameBuffer,
    {
        let rgb = frame.rgb(x, y);
        match self {
            Channel::Red => rgb[0] as f64,
            Channel::Green => rgb[1] as f64,
            Channel::Blue => rgb[2] as f64,
            Channel::Luma => color::rgb_to_y(rgb),
            Channel::ChromaRed => color::rgb_to_ry(rgb),
            Channel::ChromaBlue => color::rgb_to_by(rgb),
            Channel::Mono => color::rgb_to_mono(rgb),
        }
    }

    #[inline]
    pub fn is_chroma(&self) -> bool {
        matches!(self, Channel::ChromaRed | Channel::ChromaBlue)
    }
}

/// Read access to an RGB frame for the encoder.
pub trait FrameBuffer {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn rgb(&self, x: u32, y: u32) -> [u8; 3];
}

impl<F> FrameBuffer for &F
where
    F: FrameBuffer,
{
    #[inline]
    fn width(&self) -> u32 {
        (**self).width()
    }

    #[inline]
    fn height(&self) -> u32 {
        (**self).height()
    }

    #[inline]
    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        (**self).rgb(x, y)
    }
}

impl FrameBuffer for RgbImage {
    #[inline]
    fn width(&self) -> u32 {
        RgbImage::width(self)
    }

    #[inline]
    fn height(&self) -> u32 {
        RgbImage::height(self)
    }

    #[inline]
    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.get_pixel(x, y).0
    }
}

/// Row-major RGB pixel store produced by the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Writes one pixel. Out-of-bounds writes are dropped: the tail of a
    /// reception may run slightly past the nominal geometry.
    pub fn put(&mut self, row: u32, col: u32, rgb: [u8; 3]) {
        if row >= self.height || col >= self.width {
            return;
        }
        let offset = (row as usize * self.width as usize + col as usize) * 3;
        self.data[offset..offset + 3].copy_from_slice(&rgb);
    }

    pub fn get(&self, row: u32, col: u32) -> Option<[u8; 3]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let offset = (row as usize * self.width as usize + col as usize) * 3;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    #[inline]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_rgb_image(self) -> RgbImage {
        RgbImage::from_raw(self.width, self.height, self.data)
            .expect("buffer length matches dimensions")
    }
}

impl FrameBuffer for ImageBuffer {
    #[inline]
    fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.get(y, x).unwrap_or([0, 0, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Channel,
        FrameBuffer,
        ImageBuffer,
    };

    #[test]
    fn out_of_bounds_writes_are_dropped() {
        let mut buffer = ImageBuffer::new(4, 2);
        buffer.put(0, 0, [1, 2, 3]);
        buffer.put(5, 0, [9, 9, 9]);
        buffer.put(0, 4, [9, 9, 9]);
        assert_eq!(buffer.get(0, 0), Some([1, 2, 3]));
        assert!(buffer.as_raw().iter().all(|b| *b != 9));
    }

    #[test]
    fn channel_values() {
        let mut buffer = ImageBuffer::new(1, 1);
        buffer.put(0, 0, [10, 20, 30]);
        assert_eq!(Channel::Red.value(&buffer, 0, 0), 10.0);
        assert_eq!(Channel::Green.value(&buffer, 0, 0), 20.0);
        assert_eq!(Channel::Blue.value(&buffer, 0, 0), 30.0);
        // luma of a dark pixel stays near the studio floor
        assert!(Channel::Luma.value(&buffer, 0, 0) > 16.0);
        assert!(Channel::Luma.value(&buffer, 0, 0) < 40.0);
    }

    #[test]
    fn into_rgb_image_preserves_layout() {
        let mut buffer = ImageBuffer::new(2, 2);
        buffer.put(1, 0, [7, 8, 9]);
        let image = buffer.into_rgb_image();
        assert_eq!(image.get_pixel(0, 1).0, [7, 8, 9]);
        assert_eq!(image.rgb(0, 1), [7, 8, 9]);
    }
}
