use crate::error::ConfigError;
use std::collections::HashMap;

const MISSIONS: &[&str] = &["RCMImageProducts", "SENTINEL-1", "SENTINEL-2"];
const DOWNLOAD_TYPES: &[&str] = &["acquisition", "ingestion"];
const BOOLEANS: &[&str] = &["True", "False"];
const RCM_RESOLUTIONS: &[&str] = &[
    "Any", "100M", "50M", "30M", "16M", "5M", "3M", "FSL", "H", "LNS",
];
const RCM_POLARIZATIONS: &[&str] = &[
    "Any",
    "CH CV",
    "HH",
    "HH HV",
    "HH HV VH VV",
    "HH VV",
    "HV",
    "VH",
    "VH VV",
    "VV",
];
const RCM_PRODUCT_TYPES: &[&str] = &["GRD", "GCC", "GCD", "SLC"];
const S1_PRODUCT_TYPES: &[&str] = &["GRD", "SLC", "RAW", "OCN"];
const S1_MODES: &[&str] = &["IW", "EW", "SM", "WV"];
const S1_POLARIZATIONS: &[&str] = &["1SDV", "1SDH", "1SSV", "1SSH"];
const S2_PRODUCT_TYPES: &[&str] = &["S2MSI1C", "S2MSI2A"];

const RCM_REQUIRED: &[&str] = &[
    "destinationDir",
    "user",
    "secret",
    "mission",
    "unzip",
    "download_type",
    "timeout",
    "resolution",
    "polarization",
];
const SENTINEL_REQUIRED: &[&str] = &[
    "mission",
    "user",
    "secret",
    "download_type",
    "product_type",
    "product_mode",
    "destinationDir",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mission {
    Rcm,
    Sentinel1,
    Sentinel2,
}

/// Catalog API family serving a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Eodms,
    Copernicus,
}

impl Mission {
    /// Collection name as the catalog knows it.
    pub fn collection(self) -> &'static str {
        match self {
            Mission::Rcm => "RCMImageProducts",
            Mission::Sentinel1 => "SENTINEL-1",
            Mission::Sentinel2 => "SENTINEL-2",
        }
    }

    pub fn backend(self) -> Backend {
        match self {
            Mission::Rcm => Backend::Eodms,
            Mission::Sentinel1 | Mission::Sentinel2 => Backend::Copernicus,
        }
    }

    fn required(self) -> &'static [&'static str] {
        match self {
            Mission::Rcm => RCM_REQUIRED,
            Mission::Sentinel1 | Mission::Sentinel2 => SENTINEL_REQUIRED,
        }
    }

    /// Keys whose values must come from a fixed set, in checking order.
    fn enumerations(self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            Mission::Rcm => &[
                ("download_type", DOWNLOAD_TYPES),
                ("unzip", BOOLEANS),
                ("resolution", RCM_RESOLUTIONS),
                ("polarization", RCM_POLARIZATIONS),
                ("product_type", RCM_PRODUCT_TYPES),
            ],
            Mission::Sentinel1 => &[
                ("download_type", DOWNLOAD_TYPES),
                ("unzip", BOOLEANS),
                ("product_type", S1_PRODUCT_TYPES),
                ("product_mode", S1_MODES),
                ("polarization", S1_POLARIZATIONS),
            ],
            Mission::Sentinel2 => &[
                ("download_type", DOWNLOAD_TYPES),
                ("unzip", BOOLEANS),
                ("product_type", S2_PRODUCT_TYPES),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadType {
    Acquisition,
    Ingestion,
}

impl DownloadType {
    /// OData timestamp the time window applies to.
    pub fn odata_field(self) -> &'static str {
        match self {
            DownloadType::Acquisition => "ContentDate/Start",
            DownloadType::Ingestion => "PublicationDate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilters {
    pub product_type: String,
    pub mode: Option<String>,
    pub resolution: Option<String>,
    pub polarization: Option<String>,
}

/// Run properties after the validation gate, every value known to be allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Properties {
    pub mission: Mission,
    pub user: String,
    pub secret: String,
    pub destination: String,
    pub download_type: DownloadType,
    pub filters: ProductFilters,
    pub unzip: bool,
    pub max_attempts: u32,
}

/// Checks `properties` for the selected mission and stops at the first violation.
pub fn validate(properties: &HashMap<String, String>) -> Result<Properties, ConfigError> {
    let value = |key: &str| properties.get(key).map(|v| v.trim().to_string());

    let mission = match value("mission").as_deref() {
        None => return Err(ConfigError::MissingProperty("mission".to_string())),
        Some("RCMImageProducts") => Mission::Rcm,
        Some("SENTINEL-1") => Mission::Sentinel1,
        Some("SENTINEL-2") => Mission::Sentinel2,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "mission".to_string(),
                value: other.to_string(),
                allowed: MISSIONS,
            })
        }
    };

    if let Some(key) = mission.required().iter().find(|k| !properties.contains_key(**k)) {
        return Err(ConfigError::MissingProperty(key.to_string()));
    }

    for &(key, allowed) in mission.enumerations() {
        if let Some(v) = value(key) {
            if !allowed.contains(&v.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: v,
                    allowed,
                });
            }
        }
    }

    let required = |key: &str| value(key).unwrap_or_default();
    let download_type = match required("download_type").as_str() {
        "ingestion" => DownloadType::Ingestion,
        _ => DownloadType::Acquisition,
    };
    let unzip = value("unzip").as_deref() == Some("True");
    let max_attempts = match value("timeout") {
        Some(timeout) => parse_attempts(&timeout)?,
        None => 1,
    };

    let filters = match mission {
        Mission::Rcm => ProductFilters {
            product_type: value("product_type").unwrap_or_else(|| "GRD".to_string()),
            mode: None,
            resolution: value("resolution"),
            polarization: value("polarization"),
        },
        Mission::Sentinel1 => ProductFilters {
            product_type: required("product_type"),
            mode: value("product_mode"),
            resolution: None,
            polarization: Some(value("polarization").unwrap_or_else(|| "1SDV".to_string())),
        },
        Mission::Sentinel2 => ProductFilters {
            product_type: required("product_type"),
            mode: None,
            resolution: None,
            polarization: None,
        },
    };

    Ok(Properties {
        mission,
        user: required("user"),
        secret: required("secret"),
        destination: required("destinationDir"),
        download_type,
        filters,
        unzip,
        max_attempts,
    })
}

/// `timeout` is given in minutes, possibly fractional; each whole minute is one poll.
fn parse_attempts(timeout: &str) -> Result<u32, ConfigError> {
    match timeout.parse::<f64>() {
        Ok(minutes) if minutes.is_finite() && minutes >= 0.0 => Ok(minutes.trunc() as u32),
        _ => Err(ConfigError::InvalidNumber {
            key: "timeout".to_string(),
            value: timeout.to_string(),
        }),
    }
}
