//! GeoJSON to well-known-text conversion for catalog queries.
use crate::error::GeometryError;
use serde::Deserialize;

/// Rounding used when no precision is given, roughly ten metres.
pub const DEFAULT_PRECISION: usize = 4;

/// Any of the three shapes an area-of-interest file may take.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum GeoJson {
    FeatureCollection { features: Vec<Feature> },
    Feature(Feature),
    Geometry(Geometry),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    pub coordinates: Coordinates,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    fn wkt_tag(self) -> &'static str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::MultiPoint => "MULTIPOINT",
            GeometryKind::LineString => "LINESTRING",
            GeometryKind::MultiLineString => "MULTILINESTRING",
            GeometryKind::Polygon => "POLYGON",
            GeometryKind::MultiPolygon => "MULTIPOLYGON",
        }
    }
}

/// Arbitrarily nested coordinate arrays, as found in the `coordinates` member.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Coordinates {
    Position(Vec<f64>),
    Nested(Vec<Coordinates>),
}

type Vertex = (f64, f64);

impl GeoJson {
    pub fn feature_count(&self) -> usize {
        match self {
            GeoJson::FeatureCollection { features } => features.len(),
            _ => 1,
        }
    }

    /// Geometry of the requested feature. Bare geometries and single features ignore the index.
    pub fn geometry(&self, feature_index: usize) -> Result<&Geometry, GeometryError> {
        match self {
            GeoJson::Geometry(geometry) => Ok(geometry),
            GeoJson::Feature(feature) => Ok(&feature.geometry),
            GeoJson::FeatureCollection { features } => features
                .get(feature_index)
                .map(|f| &f.geometry)
                .ok_or(GeometryError::FeatureIndex {
                    index: feature_index,
                    count: features.len(),
                }),
        }
    }
}

/// Converts `geojson` to WKT without insignificant whitespace, e.g. `POLYGON((0 0,0 1,1 1,0 0))`.
///
/// Elevation is discarded before validation and every vertex is checked against the WGS84
/// bounds. Nothing is returned unless the whole geometry is valid.
pub fn convert(
    geojson: &GeoJson,
    feature_index: usize,
    precision: usize,
) -> Result<String, GeometryError> {
    let geometry = geojson.geometry(feature_index)?;
    let kind = geometry.kind;
    let c = &geometry.coordinates;
    let fmt = |v: &Vertex| format_vertex(v, precision);

    let body = match kind {
        GeometryKind::Point => fmt(&vertex(c)?),
        GeometryKind::LineString => join(&line(c, kind)?, &fmt),
        GeometryKind::MultiPoint => line(c, kind)?
            .iter()
            .map(|v| format!("({})", fmt(v)))
            .collect::<Vec<_>>()
            .join(","),
        GeometryKind::MultiLineString => rings(c, kind, 0)?
            .iter()
            .map(|l| format!("({})", join(l, &fmt)))
            .collect::<Vec<_>>()
            .join(","),
        GeometryKind::Polygon => polygon_body(&rings(c, kind, 3)?, &fmt),
        GeometryKind::MultiPolygon => nested(c, kind)?
            .iter()
            .map(|p| rings(p, kind, 3).map(|r| format!("({})", polygon_body(&r, &fmt))))
            .collect::<Result<Vec<_>, _>>()?
            .join(","),
    };
    Ok(format!("{}({})", kind.wkt_tag(), body))
}

/// Spatial literal understood by OData `Intersects` predicates.
pub fn geography_literal(wkt: &str) -> String {
    format!("geography'SRID=4326;{wkt}'")
}

fn nested(c: &Coordinates, kind: GeometryKind) -> Result<&[Coordinates], GeometryError> {
    match c {
        Coordinates::Nested(children) if !children.is_empty() => Ok(children),
        _ => Err(GeometryError::Shape(kind.wkt_tag())),
    }
}

fn vertex(c: &Coordinates) -> Result<Vertex, GeometryError> {
    let position = match c {
        Coordinates::Position(p) => p,
        Coordinates::Nested(_) => return Err(GeometryError::Shape("POINT")),
    };
    if position.len() < 2 {
        return Err(GeometryError::Dimension(position.len()));
    }
    // Only the first two dimensions are kept
    let (lon, lat) = (position[0], position[1]);
    let in_range = |v: f64, limit: f64| v.is_finite() && (-limit..=limit).contains(&v);
    if !in_range(lon, 180.0) || !in_range(lat, 90.0) {
        return Err(GeometryError::Bounds { lon, lat });
    }
    Ok((lon, lat))
}

fn line(c: &Coordinates, kind: GeometryKind) -> Result<Vec<Vertex>, GeometryError> {
    nested(c, kind)?.iter().map(vertex).collect()
}

fn rings(
    c: &Coordinates,
    kind: GeometryKind,
    min_vertices: usize,
) -> Result<Vec<Vec<Vertex>>, GeometryError> {
    nested(c, kind)?
        .iter()
        .map(|r| {
            let ring = line(r, kind)?;
            if ring.len() < min_vertices {
                return Err(GeometryError::Ring(ring.len()));
            }
            Ok(ring)
        })
        .collect()
}

fn polygon_body(rings: &[Vec<Vertex>], fmt: &impl Fn(&Vertex) -> String) -> String {
    rings
        .iter()
        .map(|r| format!("({})", join(r, fmt)))
        .collect::<Vec<_>>()
        .join(",")
}

fn join(vertices: &[Vertex], fmt: &impl Fn(&Vertex) -> String) -> String {
    vertices.iter().map(fmt).collect::<Vec<_>>().join(",")
}

fn format_vertex(&(lon, lat): &Vertex, precision: usize) -> String {
    format!("{} {}", format_number(lon, precision), format_number(lat, precision))
}

fn format_number(value: f64, precision: usize) -> String {
    let rounded = format!("{:.*}", precision, value);
    let trimmed = if rounded.contains('.') {
        rounded.trim_end_matches('0').trim_end_matches('.')
    } else {
        rounded.as_str()
    };
    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}
