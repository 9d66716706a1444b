use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Reading INFO file {path:?} failed: {source}")]
    RunInfoRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("An error occurred while parsing the INFO file: {0}")]
    RunInfoParse(#[from] roxmltree::Error),
    #[error("No '{0}' element found in INFO file")]
    MissingElement(&'static str),
    #[error("Error parsing {field}: '{value}' is not a valid date and time")]
    InvalidDateTime { field: &'static str, value: String },
    #[error("Invalid timeZone '{0}', expected an hour offset such as 0.0 or 1.0")]
    InvalidTimeZone(String),
    #[error("Start time {start} is not before end time {end}")]
    InvalidTimeWindow { start: String, end: String },
    #[error("Property [ {0} ] is not configured. Add property [ {0} ] to the xml input file.")]
    MissingProperty(String),
    #[error("Wrong input to property [ {key} ], has to be one of: {allowed:?}")]
    InvalidValue {
        key: String,
        value: String,
        allowed: &'static [&'static str],
    },
    #[error("Wrong input to property [ {key} ], '{value}' is not a non-negative number")]
    InvalidNumber { key: String, value: String },
    #[error("No polygon available, please place a geojson object in {0:?}")]
    NoAoi(PathBuf),
    #[error("Can not read geojson {path:?}: {source}")]
    AoiRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Can not decode geojson {path:?}, make sure it contains a polygon: {source}")]
    AoiDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Geojson does not contain a feature")]
    EmptyAoi,
}

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("Coordinate ({lon}, {lat}) is out of bounds, longitude must lie in [-180, 180] and latitude in [-90, 90]")]
    Bounds { lon: f64, lat: f64 },
    #[error("Feature {index} requested but the collection holds {count} feature(s)")]
    FeatureIndex { index: usize, count: usize },
    #[error("Coordinate has {0} dimension(s), at least 2 are required")]
    Dimension(usize),
    #[error("Coordinates do not match a {0} geometry")]
    Shape(&'static str),
    #[error("Polygon ring has {0} vertices, at least 3 are required")]
    Ring(usize),
}

/// Errors that end the run. Per-product problems are [`DownloadError`] and [`ExtractionError`].
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("Token creation failed, check your login credentials. Error: {0}")]
    Authentication(String),
    #[error("Product search failed. Error: {0}")]
    Search(#[source] reqwest::Error),
    #[error("Order submission failed. Error: {0}")]
    Order(#[source] reqwest::Error),
    #[error("Unable to prepare {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AcquisitionError {
    /// Process exit code reported to the scheduler.
    ///
    /// | code | cause                                   |
    /// |------|-----------------------------------------|
    /// | 2    | run description or property invalid     |
    /// | 3    | area of interest geometry invalid       |
    /// | 4    | token exchange failed                   |
    /// | 5    | catalog search failed                   |
    /// | 6    | order submission failed                 |
    /// | 7    | destination or log file not writable    |
    pub fn exit_code(&self) -> u8 {
        match self {
            AcquisitionError::Config(_) => 2,
            AcquisitionError::Geometry(_) => 3,
            AcquisitionError::Authentication(_) => 4,
            AcquisitionError::Search(_) => 5,
            AcquisitionError::Order(_) => 6,
            AcquisitionError::Io { .. } => 7,
        }
    }
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Download from {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Redirect from {0} carries no usable Location header")]
    Location(String),
    #[error("Gave up after {0} redirects")]
    TooManyRedirects(usize),
    #[error("Product name '{0}' is not a plain file name")]
    UnsafeName(String),
    #[error("Product {0} has no download location")]
    NoLocation(String),
    #[error("No access token, authenticate before downloading")]
    Unauthenticated,
    #[error("Writing {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unable to open archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Unable to read member {index} of {path:?}: {source}")]
    Member {
        path: PathBuf,
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Member '{name}' of {path:?} escapes the extraction directory")]
    UnsafePath { path: PathBuf, name: String },
    #[error("Writing {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
