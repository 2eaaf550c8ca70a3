//! Brute-force template matching on luminance images
//!
//! The metric is the sum of absolute differences normalised by
//! `width * height * 255`, so a perfect match scores 0.0 and the worst
//! possible match 1.0. Each candidate offset stops accumulating as soon as it
//! can no longer beat the best offset seen so far; this pruning never changes
//! the result.

use image::imageops::FilterType;
use image::{GrayImage, RgbaImage};
use tracing::{debug, instrument};

/// Default maximum dissimilarity accepted as a match.
pub const DEFAULT_MAX_DISSIMILARITY: f64 = 0.08;

/// Scale factors tried by [`find_on_screen_multiscale`].
pub const DEFAULT_SCALES: [f64; 7] = [1.0, 0.95, 1.05, 0.9, 1.1, 0.85, 1.15];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Top-left corner of the match in screen-image pixels.
    pub x: u32,
    pub y: u32,
    /// Size of the (possibly rescaled) template.
    pub width: u32,
    pub height: u32,
    pub dissimilarity: f64,
    pub scale: f64,
}

impl TemplateMatch {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Single-channel luminance with fixed-point BT.601 weights (77, 150, 29) / 256.
pub fn to_luminance(image: &RgbaImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let [r, g, b, _] = src.0;
        let y = (77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8;
        dst.0[0] = y.min(255) as u8;
    }
    gray
}

/// Best location of `template` in `screen`, or `None` if nothing scores at or
/// below `max_dissimilarity`.
#[instrument(level = "debug", skip(screen, template), fields(
    screen = %format!("{}x{}", screen.width(), screen.height()),
    template = %format!("{}x{}", template.width(), template.height()),
))]
pub fn find_on_screen(
    screen: &GrayImage,
    template: &GrayImage,
    max_dissimilarity: f64,
) -> Option<TemplateMatch> {
    let (sw, sh) = screen.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh || max_dissimilarity < 0.0 {
        return None;
    }

    let norm = tw as f64 * th as f64 * 255.0;
    // Anything above this bound is rejected anyway, so it seeds the pruning.
    let budget = (max_dissimilarity.min(1.0) * norm).floor() as u64;

    let screen_raw = screen.as_raw();
    let tpl_raw = template.as_raw();
    let (sw, tw, th) = (sw as usize, tw as usize, th as usize);

    let mut best: Option<(usize, usize, u64)> = None;
    let mut bound = budget;

    for oy in 0..=(sh as usize - th) {
        for ox in 0..=(sw - tw) {
            let mut sad: u64 = 0;
            let mut pruned = false;
            for ty in 0..th {
                let srow = &screen_raw[(oy + ty) * sw + ox..(oy + ty) * sw + ox + tw];
                let trow = &tpl_raw[ty * tw..ty * tw + tw];
                sad += srow
                    .iter()
                    .zip(trow)
                    .map(|(a, b)| a.abs_diff(*b) as u64)
                    .sum::<u64>();
                if sad > bound {
                    pruned = true;
                    break;
                }
            }
            if pruned {
                continue;
            }
            let improves = match best {
                Some((_, _, best_sad)) => sad < best_sad,
                None => true,
            };
            if improves {
                best = Some((ox, oy, sad));
                bound = sad;
                if sad == 0 {
                    return Some(TemplateMatch {
                        x: ox as u32,
                        y: oy as u32,
                        width: tw as u32,
                        height: th as u32,
                        dissimilarity: 0.0,
                        scale: 1.0,
                    });
                }
            }
        }
    }

    best.map(|(x, y, sad)| TemplateMatch {
        x: x as u32,
        y: y as u32,
        width: tw as u32,
        height: th as u32,
        dissimilarity: sad as f64 / norm,
        scale: 1.0,
    })
}

/// Runs [`find_on_screen`] for each scale factor (nearest-neighbour resampled
/// template) and keeps the lowest dissimilarity. Ties go to the earlier scale.
pub fn find_on_screen_multiscale(
    screen: &GrayImage,
    template: &GrayImage,
    max_dissimilarity: f64,
    scales: &[f64],
) -> Option<TemplateMatch> {
    let mut best: Option<TemplateMatch> = None;
    for &scale in scales {
        if !(scale.is_finite() && scale > 0.0) {
            continue;
        }
        let w = (template.width() as f64 * scale).round() as u32;
        let h = (template.height() as f64 * scale).round() as u32;
        if w == 0 || h == 0 || w > screen.width() || h > screen.height() {
            continue;
        }
        let candidate = if w == template.width() && h == template.height() {
            find_on_screen(screen, template, max_dissimilarity)
        } else {
            let resized = image::imageops::resize(template, w, h, FilterType::Nearest);
            find_on_screen(screen, &resized, max_dissimilarity)
        };
        if let Some(mut m) = candidate {
            m.scale = scale;
            debug!("Template candidate at scale {scale:.2}: {:.4}", m.dissimilarity);
            if best.is_none_or(|b| m.dissimilarity < b.dissimilarity) {
                best = Some(m);
            }
            if m.dissimilarity == 0.0 {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::noise_gray as noise;
    use image::Rgba;

    #[test]
    fn test_luminance_weights() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(2, 0, Rgba([0, 0, 0, 255]));
        let gray = to_luminance(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(gray.get_pixel(1, 0).0[0], 76);
        assert_eq!(gray.get_pixel(2, 0).0[0], 0);
    }

    #[test]
    fn test_exact_crop_is_found_at_its_offset() {
        let screen = noise(64, 48);
        let tpl = image::imageops::crop_imm(&screen, 17, 9, 12, 8).to_image();
        let m = find_on_screen(&screen, &tpl, DEFAULT_MAX_DISSIMILARITY).unwrap();
        assert_eq!((m.x, m.y), (17, 9));
        assert_eq!(m.dissimilarity, 0.0);
        assert_eq!(m.center(), (23, 13));
    }

    #[test]
    fn test_template_larger_than_screen() {
        let screen = noise(10, 10);
        let tpl = noise(11, 4);
        assert!(find_on_screen(&screen, &tpl, 1.0).is_none());
    }

    #[test]
    fn test_near_match_is_scored_not_rejected() {
        let screen = noise(40, 40);
        let mut tpl = image::imageops::crop_imm(&screen, 5, 6, 10, 10).to_image();
        // One pixel off by at most 128 levels: <= 128 / (100 * 255)
        let p = tpl.get_pixel_mut(0, 0);
        p.0[0] = if p.0[0] > 127 { p.0[0] - 127 } else { p.0[0] + 128 };
        let m = find_on_screen(&screen, &tpl, DEFAULT_MAX_DISSIMILARITY).unwrap();
        assert_eq!((m.x, m.y), (5, 6));
        assert!(m.dissimilarity > 0.0 && m.dissimilarity <= 0.01);
        assert!(find_on_screen(&screen, &tpl, 0.0).is_none());
    }

    #[test]
    fn test_multiscale_prefers_exact_scale() {
        let screen = noise(50, 50);
        let tpl = image::imageops::crop_imm(&screen, 20, 20, 10, 10).to_image();
        let m = find_on_screen_multiscale(&screen, &tpl, 0.08, &DEFAULT_SCALES).unwrap();
        assert_eq!((m.x, m.y, m.scale), (20, 20, 1.0));
    }
}
