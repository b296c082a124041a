use serde::{Deserialize, Serialize};

use crate::issues::AggregationIssue;

/// Identifier of the first cell of every grid.
pub const FIRST_CELL_ID: u32 = 1;

/// Relative slack when counting steps along an axis.
const STEP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Default for GridBounds {
    fn default() -> Self {
        Self {
            min_lat: 59.00,
            max_lat: 59.95,
            min_lon: 10.00,
            max_lon: 11.00,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellSize {
    pub lat: f64,
    pub lon: f64,
}

impl Default for CellSize {
    fn default() -> Self {
        Self {
            lat: 0.05,
            lon: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpatialCell {
    pub id: u32,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl SpatialCell {
    /// Inclusive on every edge, so abutting cells share their boundary.
    #[inline]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

/// Regular lat/lon partition of a bounding box.
///
/// Cells are stored in ID order: longitude is the outer axis and latitude the
/// inner one, so `id = FIRST_CELL_ID + lon_index * lat_spans + lat_index`.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    bounds: GridBounds,
    cell_size: CellSize,
    lat_spans: Vec<(f64, f64)>,
    lon_spans: Vec<(f64, f64)>,
    cells: Vec<SpatialCell>,
    issues: Vec<AggregationIssue>,
}

impl SpatialGrid {
    pub fn build(bounds: GridBounds, cell_size: CellSize) -> Self {
        let mut issues = Vec::new();
        let lat_spans = axis_spans("lat", bounds.min_lat, bounds.max_lat, cell_size.lat, &mut issues);
        let lon_spans = axis_spans("lon", bounds.min_lon, bounds.max_lon, cell_size.lon, &mut issues);

        let mut cells = Vec::with_capacity(lat_spans.len() * lon_spans.len());
        let mut id = FIRST_CELL_ID;
        for &(min_lon, max_lon) in &lon_spans {
            for &(min_lat, max_lat) in &lat_spans {
                cells.push(SpatialCell {
                    id,
                    min_lat,
                    max_lat,
                    min_lon,
                    max_lon,
                });
                id += 1;
            }
        }

        for issue in &issues {
            tracing::warn!(target: "drift::grid", issue = %issue, "grid.degenerate");
        }
        tracing::debug!(
            target: "drift::grid",
            lat_spans = lat_spans.len(),
            lon_spans = lon_spans.len(),
            cells = cells.len(),
            "grid.built"
        );

        Self {
            bounds,
            cell_size,
            lat_spans,
            lon_spans,
            cells,
            issues,
        }
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn cell_size(&self) -> CellSize {
        self.cell_size
    }

    pub fn cells(&self) -> &[SpatialCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Shape as `(lat_spans, lon_spans)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.lat_spans.len(), self.lon_spans.len())
    }

    pub fn issues(&self) -> &[AggregationIssue] {
        &self.issues
    }

    pub fn cell(&self, id: u32) -> Option<&SpatialCell> {
        let index = id.checked_sub(FIRST_CELL_ID)? as usize;
        self.cells.get(index)
    }

    /// Position of the cell containing the point in [`Self::cells`]. On a
    /// shared edge or corner the lowest ID wins.
    pub fn locate_index(&self, lat: f64, lon: f64) -> Option<usize> {
        let lat_index = span_index(&self.lat_spans, lat)?;
        let lon_index = span_index(&self.lon_spans, lon)?;
        Some(lon_index * self.lat_spans.len() + lat_index)
    }

    pub fn locate(&self, lat: f64, lon: f64) -> Option<&SpatialCell> {
        self.locate_index(lat, lon).map(|index| &self.cells[index])
    }

    /// Every cell whose inclusive bounds contain the point, in ID order.
    pub fn locate_all(&self, lat: f64, lon: f64) -> Vec<&SpatialCell> {
        self.cells.iter().filter(|cell| cell.contains(lat, lon)).collect()
    }
}

/// Boundaries are `min + k * size` for `k = 0..=n`, where `n` is the first
/// step reaching or passing `max`. Each consecutive pair is a span, except
/// the last one, which is dropped.
///
/// `n` is taken from the extent/size ratio with a small tolerance, so an
/// extent that is a whole multiple of the size does not gain a step from
/// rounding.
fn axis_spans(
    axis: &'static str,
    min: f64,
    max: f64,
    size: f64,
    issues: &mut Vec<AggregationIssue>,
) -> Vec<(f64, f64)> {
    let extent = max - min;
    let degenerate = |spans: usize| AggregationIssue::DegenerateGrid {
        axis,
        cell_size: size,
        extent,
        spans,
    };

    if !(size > 0.0 && size.is_finite() && extent.is_finite()) || extent <= 0.0 {
        issues.push(degenerate(0));
        return Vec::new();
    }
    if size >= extent {
        issues.push(degenerate(1));
        return vec![(min, max)];
    }

    let steps = (extent / size - STEP_TOLERANCE).ceil() as u32;
    let edges: Vec<f64> = (0..=steps).map(|k| min + k as f64 * size).collect();
    edges
        .windows(2)
        .take(edges.len().saturating_sub(2))
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

fn span_index(spans: &[(f64, f64)], value: f64) -> Option<usize> {
    let index = spans.partition_point(|&(_, hi)| hi < value);
    let &(lo, hi) = spans.get(index)?;
    (lo <= value && value <= hi).then_some(index)
}
