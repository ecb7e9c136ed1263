//! GeoJSON-flavoured (de)serialization for geometries and features.
//!
//! Stores exchange features over process and transport boundaries as
//! `{type: "Feature", id, created, modified, bbox, geometry, properties}`
//! objects. Only the geometry kinds named by the GeoJSON spec are accepted
//! on input; the non-GeoJSON `geo` kinds (`Line`, `Rect`, `Triangle`) are
//! widened to their GeoJSON equivalents on output.

use std::collections::BTreeMap;

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::{Value, json};
use thiserror::Error;

use crate::{PropertyValue, SpatialFeature};

/// Errors raised while reading GeoJSON-flavoured input.
#[derive(Debug, Error)]
pub enum GeoJsonError {
    /// The `type` member is missing or not a string.
    #[error("geometry object has no string `type` member")]
    MissingType,
    /// The `type` member names a kind this reader does not accept.
    #[error("unsupported geometry type {0:?}")]
    UnsupportedType(String),
    /// The `coordinates` member is missing or malformed for the given type.
    #[error("malformed coordinates for geometry type {0:?}")]
    MalformedCoordinates(String),
    /// A feature object is missing a required member.
    #[error("feature object has no {0:?} member")]
    MissingMember(&'static str),
}

fn coord_from(value: &Value) -> Option<Coord<f64>> {
    let position = value.as_array()?;
    if position.len() < 2 {
        return None;
    }
    Some(Coord {
        x: position.first()?.as_f64()?,
        y: position.get(1)?.as_f64()?,
    })
}

fn coords_from(value: &Value) -> Option<Vec<Coord<f64>>> {
    value.as_array()?.iter().map(coord_from).collect()
}

fn rings_from(value: &Value) -> Option<Polygon<f64>> {
    let rings: Vec<Vec<Coord<f64>>> = value
        .as_array()?
        .iter()
        .map(coords_from)
        .collect::<Option<_>>()?;
    let mut rings = rings.into_iter().map(LineString::from);
    let exterior = rings.next()?;
    Some(Polygon::new(exterior, rings.collect()))
}

/// Parse a GeoJSON geometry object into a [`Geometry`].
///
/// # Errors
/// Returns [`GeoJsonError`] when the `type` member is absent or unsupported,
/// or when `coordinates` do not match the declared type.
pub fn geometry_from_json(value: &Value) -> Result<Geometry<f64>, GeoJsonError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(GeoJsonError::MissingType)?;
    let coordinates = value
        .get("coordinates")
        .ok_or_else(|| GeoJsonError::MalformedCoordinates(kind.to_owned()))?;
    let malformed = || GeoJsonError::MalformedCoordinates(kind.to_owned());
    match kind {
        "Point" => Ok(Geometry::Point(Point::from(
            coord_from(coordinates).ok_or_else(malformed)?,
        ))),
        "MultiPoint" => Ok(Geometry::MultiPoint(MultiPoint::new(
            coords_from(coordinates)
                .ok_or_else(malformed)?
                .into_iter()
                .map(Point::from)
                .collect(),
        ))),
        "LineString" => Ok(Geometry::LineString(LineString::from(
            coords_from(coordinates).ok_or_else(malformed)?,
        ))),
        "MultiLineString" => {
            let lines: Vec<Vec<Coord<f64>>> = coordinates
                .as_array()
                .and_then(|outer| outer.iter().map(coords_from).collect())
                .ok_or_else(malformed)?;
            Ok(Geometry::MultiLineString(MultiLineString::new(
                lines.into_iter().map(LineString::from).collect(),
            )))
        }
        "Polygon" => Ok(Geometry::Polygon(
            rings_from(coordinates).ok_or_else(malformed)?,
        )),
        "MultiPolygon" => {
            let polygons: Vec<Polygon<f64>> = coordinates
                .as_array()
                .and_then(|outer| outer.iter().map(rings_from).collect())
                .ok_or_else(malformed)?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        other => Err(GeoJsonError::UnsupportedType(other.to_owned())),
    }
}

fn position(coord: Coord<f64>) -> Value {
    json!([coord.x, coord.y])
}

fn line_positions(line: &LineString<f64>) -> Value {
    Value::Array(line.coords().copied().map(position).collect())
}

fn polygon_positions(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![line_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(line_positions));
    Value::Array(rings)
}

/// Serialize a [`Geometry`] as a GeoJSON geometry object.
pub fn geometry_to_json(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(point) => json!({"type": "Point", "coordinates": position(point.0)}),
        Geometry::MultiPoint(points) => json!({
            "type": "MultiPoint",
            "coordinates": Value::Array(points.0.iter().map(|p| position(p.0)).collect()),
        }),
        Geometry::Line(line) => json!({
            "type": "LineString",
            "coordinates": [position(line.start), position(line.end)],
        }),
        Geometry::LineString(line) => json!({
            "type": "LineString",
            "coordinates": line_positions(line),
        }),
        Geometry::MultiLineString(lines) => json!({
            "type": "MultiLineString",
            "coordinates": Value::Array(lines.0.iter().map(line_positions).collect()),
        }),
        Geometry::Polygon(polygon) => json!({
            "type": "Polygon",
            "coordinates": polygon_positions(polygon),
        }),
        Geometry::MultiPolygon(polygons) => json!({
            "type": "MultiPolygon",
            "coordinates": Value::Array(polygons.0.iter().map(polygon_positions).collect()),
        }),
        Geometry::GeometryCollection(collection) => json!({
            "type": "GeometryCollection",
            "geometries": Value::Array(collection.0.iter().map(geometry_to_json).collect()),
        }),
        Geometry::Rect(rect) => json!({
            "type": "Polygon",
            "coordinates": polygon_positions(&rect.to_polygon()),
        }),
        Geometry::Triangle(triangle) => json!({
            "type": "Polygon",
            "coordinates": polygon_positions(&triangle.to_polygon()),
        }),
    }
}

/// Serialize a feature as a GeoJSON-like `Feature` object.
///
/// The `bbox` member is present only for spatial features.
pub fn feature_to_json(feature: &SpatialFeature) -> Value {
    let mut object = json!({
        "type": "Feature",
        "id": feature.id,
        "created": feature.created.to_rfc3339(),
        "modified": feature.modified.to_rfc3339(),
        "geometry": feature.geometry.as_ref().map(geometry_to_json).unwrap_or(Value::Null),
        "properties": serde_json::to_value(&feature.properties).unwrap_or(Value::Null),
    });
    if let (Some(rect), Some(map)) = (feature.bounding_rect(), object.as_object_mut()) {
        map.insert(
            "bbox".to_owned(),
            json!([rect.min().x, rect.min().y, rect.max().x, rect.max().y]),
        );
    }
    object
}

/// Parse a GeoJSON-like `Feature` object into a [`SpatialFeature`].
///
/// The feature is assigned to the given store and layer; a missing `id`
/// member yields a freshly generated identifier.
///
/// # Errors
/// Returns [`GeoJsonError`] when the value is not an object or carries a
/// malformed geometry.
pub fn feature_from_json(
    value: &Value,
    store_id: &str,
    layer_id: &str,
) -> Result<SpatialFeature, GeoJsonError> {
    if !value.is_object() {
        return Err(GeoJsonError::MissingMember("type"));
    }
    let id = value.get("id").and_then(Value::as_str);
    let mut feature = match id {
        Some(id) => SpatialFeature::with_id(store_id, layer_id, id),
        None => SpatialFeature::new(store_id, layer_id),
    };
    match value.get("geometry") {
        None | Some(Value::Null) => {}
        Some(geometry) => feature.geometry = Some(geometry_from_json(geometry)?),
    }
    if let Some(properties) = value.get("properties").filter(|p| !p.is_null()) {
        feature.properties = serde_json::from_value::<BTreeMap<String, PropertyValue>>(
            properties.clone(),
        )
        .map_err(|_| GeoJsonError::MissingMember("properties"))?;
    }
    Ok(feature)
}
