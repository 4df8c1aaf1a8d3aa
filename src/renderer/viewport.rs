/// Pixel rectangle a plane is drawn into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn full(target_width: u32, target_height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: target_width as f32,
            height: target_height as f32,
        }
    }
}

/// Largest centred rectangle of the given `aspect` (width / height) inside
/// the target. Non-positive or non-finite aspects fill the target.
pub fn fit_viewport(target_width: u32, target_height: u32, aspect: f32) -> Viewport {
    let full = Viewport::full(target_width, target_height);
    if !aspect.is_finite() || aspect <= 0.0 || full.width <= 0.0 || full.height <= 0.0 {
        return full;
    }

    let target_aspect = full.width / full.height;
    if aspect > target_aspect {
        // Bars above and below
        let height = full.width / aspect;
        Viewport {
            x: 0.0,
            y: (full.height - height) / 2.0,
            width: full.width,
            height,
        }
    } else {
        // Bars left and right
        let width = full.height * aspect;
        Viewport {
            x: (full.width - width) / 2.0,
            y: 0.0,
            width,
            height: full.height,
        }
    }
}
