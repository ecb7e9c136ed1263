//! Query filters and bounding-box predicates.
//!
//! A [`QueryFilter`] restricts a store query by layer, by an optional
//! bounding-box [`SpatialPredicate`], and by a result limit. Predicates are
//! bounding-box comparisons: a feature's axis-aligned extent is compared
//! against the filter rectangle, boundary points included.

use std::collections::BTreeSet;

use geo::{Coord, Rect};
use thiserror::Error;

use crate::SpatialFeature;

/// Default result limit applied when the caller does not set one.
pub const DEFAULT_LIMIT: usize = 100;

/// Errors returned by [`QueryFilter`] construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryFilterError {
    /// The result limit must be a positive integer.
    #[error("result limit must be positive")]
    ZeroLimit,
}

/// A bounding-box comparison evaluated against individual features.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`. A feature
/// without geometry has no extent: it fails `Within` and `Contains` and
/// passes `NotWithin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpatialPredicate {
    /// The feature's extent lies entirely inside the rectangle.
    Within(Rect<f64>),
    /// The feature's extent does not lie entirely inside the rectangle.
    NotWithin(Rect<f64>),
    /// The feature's extent entirely covers the rectangle.
    Contains(Rect<f64>),
}

fn rect_within(inner: &Rect<f64>, outer: &Rect<f64>) -> bool {
    inner.min().x >= outer.min().x
        && inner.min().y >= outer.min().y
        && inner.max().x <= outer.max().x
        && inner.max().y <= outer.max().y
}

impl SpatialPredicate {
    /// Convenience constructor taking `[min_x, min_y, max_x, max_y]`.
    pub fn within(bbox: [f64; 4]) -> Self {
        Self::Within(rect_from(bbox))
    }

    /// Convenience constructor taking `[min_x, min_y, max_x, max_y]`.
    pub fn not_within(bbox: [f64; 4]) -> Self {
        Self::NotWithin(rect_from(bbox))
    }

    /// Convenience constructor taking `[min_x, min_y, max_x, max_y]`.
    pub fn contains(bbox: [f64; 4]) -> Self {
        Self::Contains(rect_from(bbox))
    }

    /// The rectangle this predicate compares against.
    pub fn rect(&self) -> Rect<f64> {
        match self {
            Self::Within(rect) | Self::NotWithin(rect) | Self::Contains(rect) => *rect,
        }
    }

    /// Evaluate the predicate against one feature.
    pub fn matches(&self, feature: &SpatialFeature) -> bool {
        let extent = feature.bounding_rect();
        match (self, extent) {
            (Self::Within(rect), Some(extent)) => rect_within(&extent, rect),
            (Self::NotWithin(rect), Some(extent)) => !rect_within(&extent, rect),
            (Self::Contains(rect), Some(extent)) => rect_within(rect, &extent),
            (Self::NotWithin(_), None) => true,
            (Self::Within(_) | Self::Contains(_), None) => false,
        }
    }
}

fn rect_from(bbox: [f64; 4]) -> Rect<f64> {
    Rect::new(
        Coord {
            x: bbox[0],
            y: bbox[1],
        },
        Coord {
            x: bbox[2],
            y: bbox[3],
        },
    )
}

/// Restrictions applied to a store query.
///
/// An empty layer set means "no restriction", not "match nothing".
///
/// # Examples
/// ```
/// use geofed_core::{QueryFilter, SpatialPredicate};
///
/// let filter = QueryFilter::new()
///     .with_predicate(SpatialPredicate::within([-10.0, -10.0, 10.0, 10.0]))
///     .with_layer("roads");
/// assert_eq!(filter.limit(), 100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    predicate: Option<SpatialPredicate>,
    layer_ids: BTreeSet<String>,
    limit: usize,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            predicate: None,
            layer_ids: BTreeSet::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl QueryFilter {
    /// An unrestricted filter with the default limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict results to features matching the predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: SpatialPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Restrict results to one additional layer.
    #[must_use]
    pub fn with_layer(mut self, layer_id: impl Into<String>) -> Self {
        self.layer_ids.insert(layer_id.into());
        self
    }

    /// Replace the result limit.
    ///
    /// # Errors
    /// Returns [`QueryFilterError::ZeroLimit`] when `limit` is zero.
    pub fn with_limit(mut self, limit: usize) -> Result<Self, QueryFilterError> {
        if limit == 0 {
            return Err(QueryFilterError::ZeroLimit);
        }
        self.limit = limit;
        Ok(self)
    }

    /// The spatial predicate, if any.
    pub fn predicate(&self) -> Option<&SpatialPredicate> {
        self.predicate.as_ref()
    }

    /// The restricted layer set; empty means all layers.
    pub fn layer_ids(&self) -> &BTreeSet<String> {
        &self.layer_ids
    }

    /// Maximum number of features one store may emit for this filter.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether the feature passes the layer restriction and the predicate.
    pub fn matches(&self, feature: &SpatialFeature) -> bool {
        if !self.layer_ids.is_empty() && !self.layer_ids.contains(&feature.layer_id) {
            return false;
        }
        self.predicate
            .as_ref()
            .is_none_or(|predicate| predicate.matches(feature))
    }
}
