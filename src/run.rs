//! One invocation end to end: run description in, log and diag file out.
use crate::aoi;
use crate::config::{validate, Backend, RunConfig, RunInfo};
use crate::diagnostics::{self, DIAG_FILE_NAME};
use crate::error::AcquisitionError;
use crate::geometry::{self, DEFAULT_PRECISION};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::provider::copernicus::CopernicusClient;
use crate::provider::eodms::EodmsClient;
use crate::query::{QueryBuilder, QueryFilter};
use crate::run_log::{RunLog, Severity};
use std::path::Path;

/// Exit code when the run log cannot be created in the working directory.
const LOG_UNWRITABLE: u8 = 7;

/// Runs the acquisition described by `run_info_file` and returns the process exit code.
///
/// Once the working directory is known, `diag.xml` is written whatever the outcome.
pub async fn run(run_info_file: &Path) -> u8 {
    let (info, mut log) = match start(run_info_file) {
        Ok(started) => started,
        Err(code) => return code,
    };

    let result = match prepare(&info, &mut log) {
        Ok((config, filter)) => {
            let credentials = config.credentials.clone();
            match config.mission.backend() {
                Backend::Eodms => {
                    let client = EodmsClient::new(credentials);
                    Orchestrator::new(client, &config, &mut log).run(&filter).await
                }
                Backend::Copernicus => {
                    let client = CopernicusClient::new(credentials);
                    Orchestrator::new(client, &config, &mut log).run(&filter).await
                }
            }
        }
        Err(e) => Err(e),
    };
    finish(&info, log, result)
}

/// Reads the run description and opens the run log. The error is the exit code.
fn start(run_info_file: &Path) -> Result<(RunInfo, RunLog), u8> {
    let info = RunInfo::read(run_info_file).map_err(|e| {
        tracing::error!("ERROR: {e}");
        AcquisitionError::from(e).exit_code()
    })?;

    let threshold = info.log_threshold();
    let mut log = RunLog::create(&info.work_dir, threshold.unwrap_or(Severity::Info)).map_err(
        |e| {
            tracing::error!("Unable to create run log in {:?}: {e}", info.work_dir);
            LOG_UNWRITABLE
        },
    )?;
    log.info("start logging");
    if threshold.is_none() {
        log.warning(format!(
            "Unknown logLevel '{}', logging at INFO",
            info.log_level
        ));
    }
    Ok((info, log))
}

/// Everything before the first network call: validation, area of interest and query.
fn prepare(
    info: &RunInfo,
    log: &mut RunLog,
) -> Result<(RunConfig, QueryFilter), AcquisitionError> {
    let properties = validate(&info.properties)?;
    let aoi = aoi::load(&info.work_dir, log)?;
    let config = RunConfig::new(info, properties, aoi)?;
    log.debug(format!(
        "Time window {} to {}",
        config.window.start, config.window.end
    ));

    let wkt = geometry::convert(&config.aoi, 0, DEFAULT_PRECISION)?;
    log.debug(format!("Area of interest: {wkt}"));
    let filter = QueryBuilder::build(&config, &wkt);
    for clause in &filter.clauses {
        log.debug(format!("Filter: {clause}"));
    }
    Ok((config, filter))
}

/// Logs the outcome, closes the log and writes `diag.xml`.
fn finish(
    info: &RunInfo,
    mut log: RunLog,
    result: Result<RunOutcome, AcquisitionError>,
) -> u8 {
    let code = match result {
        Ok(RunOutcome::NoResults) => 0,
        Ok(RunOutcome::Completed(summary)) => {
            log.debug(format!(
                "{} found, {} ready, {} downloaded, {} download failure(s), {} not ready, \
                 {} extraction failure(s)",
                summary.found,
                summary.ready,
                summary.downloaded.len(),
                summary.download_failures,
                summary.not_ready,
                summary.extraction_failures
            ));
            0
        }
        Err(e) => {
            log.error(e.to_string());
            e.exit_code()
        }
    };

    if let Err(e) = log.close() {
        tracing::warn!("Unable to flush {:?}: {e}", log.path());
    }
    let diag = info.work_dir.join(DIAG_FILE_NAME);
    if let Err(e) = diagnostics::write(log.path(), &diag) {
        tracing::error!("Writing {diag:?} failed: {e}");
    }
    code
}
