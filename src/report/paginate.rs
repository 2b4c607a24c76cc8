//! Fit a captured raster onto report pages.
//!
//! The raster is scaled to the page's content width. Its scaled height is
//! `height * content_width / width`; if that fits the printable height it
//! becomes one page. Otherwise the [`OverflowPolicy`] decides.

use crate::config::{OverflowPolicy, PageGeometry};
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

/// One band of the raster, with the size it occupies on the page in points.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Slice `raster` into page images.
pub fn paginate(
    raster: &DynamicImage,
    geometry: &PageGeometry,
    policy: OverflowPolicy,
) -> Vec<PageImage> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        warn!("Captured view is empty ({}x{} px)", width, height);
        return Vec::new();
    }

    let content_width = geometry.content_width();
    let pt_per_px = content_width / width as f32;
    let scaled_height = height as f32 * pt_per_px;

    if scaled_height <= geometry.printable_height() {
        debug!("View fits one page ({:.0}pt tall)", scaled_height);
        return vec![PageImage {
            image: raster.clone(),
            width_pt: content_width,
            height_pt: scaled_height,
        }];
    }

    let rows_per_page = ((geometry.printable_height() / pt_per_px).floor() as u32).max(1);
    let band = |top: u32| {
        let rows = rows_per_page.min(height - top);
        PageImage {
            image: raster.crop_imm(0, top, width, rows),
            width_pt: content_width,
            height_pt: rows as f32 * pt_per_px,
        }
    };

    match policy {
        OverflowPolicy::Split => {
            let pages: Vec<PageImage> = (0..height).step_by(rows_per_page as usize).map(band).collect();
            debug!(
                "View is {:.0}pt tall; split into {} pages",
                scaled_height,
                pages.len()
            );
            pages
        }
        OverflowPolicy::Clamp => {
            warn!(
                "View is {:.0}pt tall but a page holds {:.0}pt; {} rows truncated",
                scaled_height,
                geometry.printable_height(),
                height - rows_per_page
            );
            vec![band(0)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn raster(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |_, y| {
            image::Rgb([(y % 256) as u8, 0, 0])
        }))
    }

    fn geometry() -> PageGeometry {
        PageGeometry {
            width_pt: 120.0,
            height_pt: 220.0,
            margin_pt: 10.0,
        }
    }

    #[test]
    fn short_view_is_one_page() {
        // 200 px wide → 0.5 pt/px; 300 px → 150pt ≤ 200pt
        let pages = paginate(&raster(200, 300), &geometry(), OverflowPolicy::Split);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].width_pt, 100.0);
        assert_eq!(pages[0].height_pt, 150.0);
    }

    #[test]
    fn split_keeps_every_row() {
        // 1000 px → 500pt; 400 rows per page → 3 pages (400, 400, 200)
        let pages = paginate(&raster(200, 1000), &geometry(), OverflowPolicy::Split);
        assert_eq!(pages.len(), 3);
        let rows: u32 = pages.iter().map(|p| p.image.height()).sum();
        assert_eq!(rows, 1000);
        assert_eq!(pages[2].image.height(), 200);
        assert!(pages.iter().all(|p| p.height_pt <= 200.0));
    }

    #[test]
    fn split_bands_are_consecutive() {
        let pages = paginate(&raster(200, 1000), &geometry(), OverflowPolicy::Split);
        let second = pages[1].image.to_rgb8();
        assert_eq!(second.get_pixel(0, 0)[0], (400 % 256) as u8);
    }

    #[test]
    fn clamp_keeps_one_page() {
        let pages = paginate(&raster(200, 1000), &geometry(), OverflowPolicy::Clamp);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].image.height(), 400);
        assert_eq!(pages[0].height_pt, 200.0);
    }

    #[test]
    fn empty_raster_has_no_pages() {
        assert!(paginate(&raster(0, 0), &geometry(), OverflowPolicy::Split).is_empty());
    }
}
