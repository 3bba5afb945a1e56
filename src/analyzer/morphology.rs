use image::{GrayImage, Luma};

/// Binary structuring element stored as offsets from its anchor (the centre)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    /// Every cell of a `width` x `height` box
    pub fn rectangle(width: u32, height: u32) -> Self {
        let (cx, cy) = ((width / 2) as i32, (height / 2) as i32);
        let offsets = (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| (x - cx, y - cy)))
            .collect();
        Self {
            width,
            height,
            offsets,
        }
    }

    /// Ellipse inscribed in a `width` x `height` box, rasterised row by row
    /// so that a 5x5 element has single-pixel tips at top and bottom
    pub fn ellipse(width: u32, height: u32) -> Self {
        let r = (height / 2) as i32;
        let c = (width / 2) as i32;
        if r == 0 || c == 0 {
            return Self::rectangle(width, height);
        }

        let inv_r2 = 1.0 / f64::from(r * r);
        let mut offsets = Vec::new();
        for y in 0..height as i32 {
            let dy = y - r;
            let span = if dy.abs() <= r {
                let dx = (f64::from(c) * (f64::from(r * r - dy * dy) * inv_r2).sqrt()).round()
                    as i32;
                (c - dx).max(0)..(c + dx + 1).min(width as i32)
            } else {
                0..0
            };
            offsets.extend(span.map(|x| (x - c, dy)));
        }

        Self {
            width,
            height,
            offsets,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the cell at `(x, y)` (relative to the top-left corner) is set
    pub fn contains(&self, x: u32, y: u32) -> bool {
        let (cx, cy) = ((self.width / 2) as i32, (self.height / 2) as i32);
        self.offsets.contains(&(x as i32 - cx, y as i32 - cy))
    }
}

fn is_set(mask: &GrayImage, x: i64, y: i64) -> Option<bool> {
    if x < 0 || y < 0 || x >= i64::from(mask.width()) || y >= i64::from(mask.height()) {
        return None;
    }
    Some(mask.get_pixel(x as u32, y as u32)[0] != 0)
}

/// Binary dilation: a pixel is set when any in-bounds neighbour under the
/// element is non-zero
pub fn dilate(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let hit = element.offsets.iter().any(|&(dx, dy)| {
            is_set(mask, i64::from(x) + i64::from(dx), i64::from(y) + i64::from(dy))
                .unwrap_or(false)
        });
        Luma([if hit { 255 } else { 0 }])
    })
}

/// Binary erosion: a pixel survives when every in-bounds neighbour under the
/// element is non-zero
pub fn erode(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let keep = element.offsets.iter().all(|&(dx, dy)| {
            is_set(mask, i64::from(x) + i64::from(dx), i64::from(y) + i64::from(dy))
                .unwrap_or(true)
        });
        Luma([if keep { 255 } else { 0 }])
    })
}

/// Morphological closing applied `iterations` times in sequence, each pass
/// one dilation followed by one erosion
pub fn close(mask: &GrayImage, element: &StructuringElement, iterations: u32) -> GrayImage {
    let mut result = mask.clone();
    for _ in 0..iterations {
        result = erode(&dilate(&result, element), element);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(element: &StructuringElement) -> Vec<String> {
        let (w, h) = element.dimensions();
        (0..h)
            .map(|y| {
                (0..w)
                    .map(|x| if element.contains(x, y) { '1' } else { '0' })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_ellipse_5x5_shape() {
        let element = StructuringElement::ellipse(5, 5);
        assert_eq!(
            render(&element),
            vec!["00100", "11111", "11111", "11111", "00100"]
        );
    }

    #[test]
    fn test_rectangle_is_full() {
        let element = StructuringElement::rectangle(3, 3);
        assert!(render(&element).iter().all(|row| row == "111"));
    }

    #[test]
    fn test_dilate_grows_single_pixel_into_element() {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(4, 4, Luma([255]));

        let grown = dilate(&mask, &StructuringElement::ellipse(5, 5));
        assert_eq!(grown.get_pixel(4, 2)[0], 255);
        assert_eq!(grown.get_pixel(2, 4)[0], 255);
        assert_eq!(grown.get_pixel(3, 3)[0], 255);
        assert_eq!(grown.get_pixel(2, 2)[0], 0);
        assert_eq!(grown.pixels().filter(|p| p[0] == 255).count(), 17);
    }

    #[test]
    fn test_erode_keeps_border_touching_regions() {
        let mask = GrayImage::from_pixel(6, 6, Luma([255]));
        let eroded = erode(&mask, &StructuringElement::rectangle(3, 3));
        assert!(eroded.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_close_fills_small_holes() {
        let mut mask = GrayImage::new(20, 20);
        for y in 5..15 {
            for x in 5..15 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask.put_pixel(9, 9, Luma([0]));
        mask.put_pixel(10, 9, Luma([0]));

        let closed = close(&mask, &StructuringElement::ellipse(5, 5), 2);
        assert_eq!(closed.get_pixel(9, 9)[0], 255);
        assert_eq!(closed.get_pixel(10, 9)[0], 255);
        assert_eq!(closed.get_pixel(2, 2)[0], 0);
        assert_eq!(closed.get_pixel(5, 5)[0], 255);
    }

    fn two_blocks_with_gap(gap: u32) -> GrayImage {
        let mut mask = GrayImage::new(80, 40);
        for y in 10..30 {
            for x in (10..30).chain(30 + gap..50 + gap) {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn test_close_twice_matches_two_single_closings() {
        let element = StructuringElement::ellipse(5, 5);
        let mask = two_blocks_with_gap(6);

        let once = erode(&dilate(&mask, &element), &element);
        let expected = erode(&dilate(&once, &element), &element);

        assert_eq!(close(&mask, &element, 2), expected);
    }

    #[test]
    fn test_close_keeps_six_pixel_gap_open() {
        let closed = close(&two_blocks_with_gap(6), &StructuringElement::ellipse(5, 5), 2);
        for x in 30..36 {
            assert_eq!(closed.get_pixel(x, 20)[0], 0, "gap column {} was filled", x);
        }
        assert_eq!(closed.get_pixel(20, 20)[0], 255);
        assert_eq!(closed.get_pixel(40, 20)[0], 255);
    }
}
