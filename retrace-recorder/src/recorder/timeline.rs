use image::{Rgba, RgbaImage};
use retrace::{Rect, ScreenshotResult};

const BORDER: i32 = 3;

/// Copies `shot` and outlines `bounds` (screen coordinates) on it.
pub fn highlight(shot: &ScreenshotResult, bounds: Rect, color: [u8; 4]) -> RgbaImage {
    let mut image = shot.image.clone();
    let local = bounds.translate(-shot.x, -shot.y);
    let (w, h) = (image.width() as i32, image.height() as i32);
    let pixel = Rgba(color);

    for y in local.y..local.y + local.height {
        for x in local.x..local.x + local.width {
            let on_border = x < local.x + BORDER
                || x >= local.x + local.width - BORDER
                || y < local.y + BORDER
                || y >= local.y + local.height - BORDER;
            if on_border && (0..w).contains(&x) && (0..h).contains(&y) {
                image.put_pixel(x as u32, y as u32, pixel);
            }
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_draws_border_only() {
        let shot = ScreenshotResult::new(RgbaImage::new(40, 30), -10, 0);
        let out = highlight(&shot, Rect::new(0, 5, 20, 10), [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(10, 5), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(29, 14), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(20, 10), &Rgba([0, 0, 0, 0]));
        assert_eq!(shot.image.get_pixel(10, 5), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_highlight_clips_off_screen() {
        let shot = ScreenshotResult::new(RgbaImage::new(10, 10), 0, 0);
        let out = highlight(&shot, Rect::new(-5, -5, 30, 30), [0, 255, 0, 255]);
        assert_eq!(out.dimensions(), (10, 10));
    }
}
