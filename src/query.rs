//! Backend specific search filters built from a [`RunConfig`].
use crate::config::{Backend, Mission, RunConfig};
use crate::geometry::geography_literal;
use chrono::{DateTime, Utc};
use std::fmt;

/// Results requested per search call. Larger result sets would need paging.
pub const PAGE_SIZE: usize = 100;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// EODMS field titles and the query identifiers they stand for.
const EODMS_FIELDS: &[(&str, &str)] = &[
    ("Beam Mnemonic", "RCMImageProducts.BEAM_MNEMONIC"),
    ("Product Type", "RCMImageProducts.PRODUCT_TYPE"),
    ("Polarization", "RCMImageProducts.POLARIZATION"),
    ("Footprint", "CATALOG_IMAGE.THE_GEOM_4326"),
    ("Acquisition Start Date", "CATALOG_IMAGE.START_DATETIME"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Like,
    Intersects,
    Range,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Operator::Equals => "=",
            Operator::Like => "like",
            Operator::Intersects => "intersects",
            Operator::Range => "range",
        };
        f.write_str(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    /// WKT, without whitespace between tokens.
    Geometry(String),
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(text) | FilterValue::Geometry(text) => f.write_str(text),
            FilterValue::Range { start, end } => write!(
                f,
                "[{}, {})",
                start.format(TIME_FORMAT),
                end.format(TIME_FORMAT)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl Clause {
    fn new(field: &str, operator: Operator, value: FilterValue) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    fn text(field: &str, operator: Operator, value: &str) -> Self {
        Self::new(field, operator, FilterValue::Text(value.to_string()))
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// Clauses combined with logical AND, in the order they were added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub backend: Backend,
    pub collection: String,
    pub clauses: Vec<Clause>,
    pub page_size: usize,
}

impl QueryFilter {
    pub fn get(&self, field: &str) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.field == field)
    }

    /// EODMS RAPI `query` parameter.
    pub fn to_eodms_query(&self) -> String {
        self.clauses
            .iter()
            .map(|clause| {
                let field = EODMS_FIELDS
                    .iter()
                    .find(|(title, _)| *title == clause.field)
                    .map_or(clause.field.as_str(), |&(_, id)| id);
                match (&clause.operator, &clause.value) {
                    (Operator::Range, FilterValue::Range { start, end }) => format!(
                        "{field}>='{}' AND {field}<'{}'",
                        start.format(TIME_FORMAT),
                        end.format(TIME_FORMAT)
                    ),
                    (Operator::Intersects, value) => format!("{field} INTERSECTS {value}"),
                    (Operator::Like, value) => format!("{field} LIKE {}", quote(value)),
                    (_, value) => format!("{field}={}", quote(value)),
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// OData `$filter` expression.
    ///
    /// Capitalised fields are product properties; lower case fields are string attributes
    /// such as `productType`.
    pub fn to_odata(&self) -> String {
        self.clauses
            .iter()
            .map(|clause| match (&clause.operator, &clause.value) {
                (Operator::Range, FilterValue::Range { start, end }) => format!(
                    "{0} gt {1} and {0} lt {2}",
                    clause.field,
                    start.format(TIME_FORMAT),
                    end.format(TIME_FORMAT)
                ),
                (Operator::Intersects, value) => format!(
                    "OData.CSC.Intersects(area={})",
                    geography_literal(&value.to_string())
                ),
                (Operator::Like, value) => format!(
                    "contains({},{})",
                    clause.field,
                    quote(value.to_string().trim_matches('%'))
                ),
                (_, value) if starts_lowercase(&clause.field) => format!(
                    "Attributes/OData.CSC.StringAttribute/any(att:att/Name eq '{}' \
                     and att/OData.CSC.StringAttribute/Value eq {})",
                    clause.field,
                    quote(value)
                ),
                (_, value) => format!("{} eq {}", clause.field, quote(value)),
            })
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

fn quote(value: impl fmt::Display) -> String {
    format!("'{}'", value.to_string().replace('\'', "''"))
}

fn starts_lowercase(field: &str) -> bool {
    field.chars().next().is_some_and(|c| c.is_ascii_lowercase())
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Filter for the backend serving `config.mission`. `wkt` is the converted area of interest.
    pub fn build(config: &RunConfig, wkt: &str) -> QueryFilter {
        let clauses = match config.mission.backend() {
            Backend::Eodms => Self::attribute_clauses(config, wkt),
            Backend::Copernicus => Self::odata_clauses(config, wkt),
        };
        QueryFilter {
            backend: config.mission.backend(),
            collection: config.mission.collection().to_string(),
            clauses,
            page_size: PAGE_SIZE,
        }
    }

    fn attribute_clauses(config: &RunConfig, wkt: &str) -> Vec<Clause> {
        let filters = &config.filters;
        let mut clauses = vec![];
        // "Any" places no restriction on the field
        let like = |v: &str| format!("%{v}%");
        if let Some(resolution) = filters.resolution.as_deref().filter(|r| *r != "Any") {
            clauses.push(Clause::text("Beam Mnemonic", Operator::Like, &like(resolution)));
        }
        clauses.push(Clause::text(
            "Product Type",
            Operator::Equals,
            &filters.product_type,
        ));
        if let Some(polarization) = filters.polarization.as_deref().filter(|p| *p != "Any") {
            clauses.push(Clause::text("Polarization", Operator::Like, &like(polarization)));
        }
        clauses.push(Clause::new(
            "Footprint",
            Operator::Intersects,
            FilterValue::Geometry(wkt.to_string()),
        ));
        clauses.push(Clause::new(
            "Acquisition Start Date",
            Operator::Range,
            FilterValue::Range {
                start: config.window.start,
                end: config.window.end,
            },
        ));
        clauses
    }

    fn odata_clauses(config: &RunConfig, wkt: &str) -> Vec<Clause> {
        let filters = &config.filters;
        let mut clauses = vec![Clause::text(
            "Collection/Name",
            Operator::Equals,
            config.mission.collection(),
        )];
        if config.mission == Mission::Sentinel1 {
            if let Some(mode) = &filters.mode {
                clauses.push(Clause::text("Name", Operator::Like, &format!("%_{mode}_%")));
            }
            if let Some(polarization) = &filters.polarization {
                clauses.push(Clause::text("Name", Operator::Like, &format!("%{polarization}%")));
            }
        }
        clauses.push(Clause::new(
            "Footprint",
            Operator::Intersects,
            FilterValue::Geometry(wkt.to_string()),
        ));
        clauses.push(Clause::new(
            config.download_type.odata_field(),
            Operator::Range,
            FilterValue::Range {
                start: config.window.start,
                end: config.window.end,
            },
        ));
        clauses.push(Clause::text(
            "productType",
            Operator::Equals,
            &filters.product_type,
        ));
        clauses
    }
}
