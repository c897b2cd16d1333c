use image::GrayImage;
use ndarray::{s, Array2};

/// Inclusive pixel bounds of the ink in a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl BoundingBox {
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }
}

/// Binary ink/background raster, indexed `[[y, x]]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InkMask {
    ink: Array2<bool>,
}

impl InkMask {
    /// Marks every pixel darker than `threshold` as ink
    pub fn from_gray(image: &GrayImage, threshold: u8) -> Self {
        let (width, height) = image.dimensions();
        let ink = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            image.get_pixel(x as u32, y as u32).0[0] < threshold
        });
        InkMask { ink }
    }

    pub fn from_array(ink: Array2<bool>) -> Self {
        InkMask { ink }
    }

    pub fn width(&self) -> usize {
        self.ink.ncols()
    }

    pub fn height(&self) -> usize {
        self.ink.nrows()
    }

    pub fn is_ink(&self, x: usize, y: usize) -> bool {
        self.ink[[y, x]]
    }

    pub fn ink_count(&self) -> usize {
        self.ink.iter().filter(|&&v| v).count()
    }

    /// Tight box around the ink, `None` for an empty mask
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut bounds: Option<BoundingBox> = None;
        for ((y, x), _) in self.ink.indexed_iter().filter(|(_, v)| **v) {
            let b = bounds.get_or_insert(BoundingBox {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            });
            b.min_x = b.min_x.min(x);
            b.max_x = b.max_x.max(x);
            b.min_y = b.min_y.min(y);
            b.max_y = b.max_y.max(y);
        }
        bounds
    }

    /// Stretches the contents of `bounds` over the whole mask with
    /// nearest-neighbour inverse mapping.
    pub fn stretch(&self, bounds: &BoundingBox) -> InkMask {
        let (height, width) = self.ink.dim();
        let ink = Array2::from_shape_fn((height, width), |(y, x)| {
            let src_x = bounds.min_x + x * bounds.width() / width;
            let src_y = bounds.min_y + y * bounds.height() / height;
            src_x < width && src_y < height && self.ink[[src_y, src_x]]
        });
        InkMask { ink }
    }

    /// Ink region stretched to fill the mask, `None` when there is no ink
    pub fn normalized(&self) -> Option<InkMask> {
        self.bounding_box().map(|bounds| self.stretch(&bounds))
    }

    /// Share of ink pixels in the half-open window `[x0, x1) × [y0, y1)`
    pub fn density(&self, x0: usize, x1: usize, y0: usize, y1: usize) -> f32 {
        let area = (x1 - x0) * (y1 - y0);
        if area == 0 {
            return 0.0;
        }
        let count = self.ink.slice(s![y0..y1, x0..x1]).iter().filter(|&&v| v).count();
        count as f32 / area as f32
    }

    pub fn row_density(&self, y: usize) -> f32 {
        self.density(0, self.width(), y, y + 1)
    }

    pub fn column_density(&self, x: usize) -> f32 {
        self.density(x, x + 1, 0, self.height())
    }

    /// Ink pixels in each column, then in each row
    pub fn projections(&self) -> (Vec<usize>, Vec<usize>) {
        let columns = self.ink.columns().into_iter().map(|c| c.iter().filter(|&&v| v).count()).collect();
        let rows = self.ink.rows().into_iter().map(|r| r.iter().filter(|&&v| v).count()).collect();
        (columns, rows)
    }

    /// Share of pixel pairs mirrored across the vertical midline that agree
    pub fn vertical_symmetry(&self) -> f32 {
        let (height, width) = self.ink.dim();
        let half = width / 2;
        let mut mismatches = 0usize;
        for y in 0..height {
            for x in 0..half {
                if self.ink[[y, x]] != self.ink[[y, width - 1 - x]] {
                    mismatches += 1;
                }
            }
        }
        1.0 - mismatches as f32 / (half * height).max(1) as f32
    }
}
