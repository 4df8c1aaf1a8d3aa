//! Linear window (center/width) mapping from raw samples to 8-bit grey.

use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("Invalid window (center {center}, width {width}): width must span a positive range")]
    InvalidWindow { center: f64, width: f64 },
}

/// A validated window. `width` is always finite and positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    center: f64,
    width: f64,
}

impl Window {
    pub fn new(center: f64, width: f64) -> Result<Self, WindowError> {
        if !center.is_finite() || !width.is_finite() || width <= 0.0 {
            return Err(WindowError::InvalidWindow { center, width });
        }
        let window = Self { center, width };
        // Widths below the precision of `center` collapse the bounds
        let (min, max) = window.bounds();
        if max - min <= 0.0 {
            return Err(WindowError::InvalidWindow { center, width });
        }
        Ok(window)
    }

    /// Window spanning `[min, max]` inclusive. A flat range gets a width of 1.
    pub fn from_range(min: u16, max: u16) -> Self {
        let (min, max) = (min.min(max) as f64, min.max(max) as f64);
        let width = (max - min).max(1.0);
        Self {
            center: min + width / 2.0,
            width,
        }
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Lower and upper bound of the window.
    pub fn bounds(&self) -> (f64, f64) {
        let half = self.width / 2.0;
        (self.center - half, self.center + half)
    }

    #[inline]
    fn map(value: u16, min: f64, scale: f64) -> u8 {
        ((value as f64 - min) * scale).clamp(0.0, 255.0).round() as u8
    }

    pub fn apply(&self, samples: &[u16]) -> Vec<u8> {
        let (min, max) = self.bounds();
        let scale = 255.0 / (max - min);
        samples
            .par_iter()
            .map(|&v| Self::map(v, min, scale))
            .collect()
    }
}

/// Map `samples` through the window given by `center` and `width`.
pub fn apply(samples: &[u16], center: f64, width: f64) -> Result<Vec<u8>, WindowError> {
    Ok(Window::new(center, width)?.apply(samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapsed_window_is_rejected() {
        assert_eq!(
            Window::new(30000.0, 1e-12),
            Err(WindowError::InvalidWindow {
                center: 30000.0,
                width: 1e-12
            })
        );
        assert!(Window::new(30000.0, 1e-3).is_ok());
    }

    #[test]
    fn center_maps_to_midpoint() {
        let out = apply(&[40], 40.0, 400.0).unwrap();
        assert!(out[0] == 127 || out[0] == 128, "got {}", out[0]);
    }

    #[test]
    fn saturates_outside_window() {
        let out = apply(&[0, 99, 100, 300, 301, 65535], 200.0, 200.0).unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 0);
        assert_eq!(out[2], 0);
        assert_eq!(out[3], 255);
        assert_eq!(out[4], 255);
        assert_eq!(out[5], 255);
    }

    #[test]
    fn monotonic_in_sample() {
        let samples: Vec<u16> = (0..2048).collect();
        let out = apply(&samples, 1000.0, 700.0).unwrap();
        assert!(out.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn rejects_non_positive_width() {
        assert_eq!(
            apply(&[1, 2, 3], 10.0, 0.0),
            Err(WindowError::InvalidWindow {
                center: 10.0,
                width: 0.0
            })
        );
        assert!(Window::new(10.0, -5.0).is_err());
        assert!(Window::new(f64::NAN, 5.0).is_err());
    }

    #[test]
    fn range_window_covers_full_output() {
        let window = Window::from_range(100, 300);
        assert_eq!(window.bounds(), (100.0, 300.0));
        assert_eq!(window.apply(&[100, 300]), vec![0, 255]);

        let flat = Window::from_range(7, 7);
        assert_eq!(flat.width(), 1.0);
    }
}
