//! Drives one acquisition: search, order, poll, download and optionally extract.
use crate::config::RunConfig;
use crate::error::AcquisitionError;
use crate::extract;
use crate::provider::{PollOutcome, Product, SearchClient};
use crate::query::QueryFilter;
use crate::run_log::RunLog;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Searching,
    NoResults,
    Ordering,
    Polling,
    Downloading,
    Extracting,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub found: usize,
    pub ready: usize,
    pub downloaded: Vec<PathBuf>,
    pub download_failures: usize,
    pub extracted: usize,
    pub extraction_failures: usize,
    /// The order was not ready within the poll budget.
    pub timed_out: bool,
    /// Ordered products still pending when polling ended.
    pub not_ready: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The search matched nothing and no order was placed.
    NoResults,
    Completed(RunSummary),
}

pub struct Orchestrator<'a, C: SearchClient> {
    client: C,
    config: &'a RunConfig,
    log: &'a mut RunLog,
    stage: Stage,
    authenticated: bool,
}

impl<'a, C: SearchClient> Orchestrator<'a, C> {
    pub fn new(client: C, config: &'a RunConfig, log: &'a mut RunLog) -> Self {
        Self {
            client,
            config,
            log,
            stage: Stage::Idle,
            authenticated: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Runs the pipeline for `filter`. Errors are fatal for the run; per-product problems are
    /// only logged and counted in the summary.
    pub async fn run(&mut self, filter: &QueryFilter) -> Result<RunOutcome, AcquisitionError> {
        let started = Instant::now();
        let result = self.drive(filter).await;
        if let Ok(RunOutcome::Completed(_)) = result {
            self.log.info(format!(
                "Download finished in : {:.2}s",
                started.elapsed().as_secs_f64()
            ));
        }
        self.enter(Stage::Done);
        result
    }

    async fn drive(&mut self, filter: &QueryFilter) -> Result<RunOutcome, AcquisitionError> {
        self.enter(Stage::Searching);
        self.log.debug(format!(
            "Searching {} in {}",
            filter.collection,
            self.client.name()
        ));
        let products = self.client.search(filter).await?;
        let ids: Vec<&str> = products.iter().map(|p| p.id.as_str()).collect();
        self.log.info(format!("Returned product IDS: {ids:?}"));

        if products.is_empty() {
            self.enter(Stage::NoResults);
            self.log.info("No images found, exiting download script...");
            return Ok(RunOutcome::NoResults);
        }

        let mut summary = RunSummary {
            found: products.len(),
            ..Default::default()
        };

        self.enter(Stage::Ordering);
        let mut ticket = self.client.order(&products).await?;
        if !ticket.order_ids.is_empty() {
            self.log.info(format!("Order submitted: {:?}", ticket.order_ids));
        }

        // Each round downloads what became ready, then waits for the rest of the order
        loop {
            self.enter(Stage::Polling);
            match self.client.poll(&mut ticket, self.config.poll).await {
                PollOutcome::Ready(ready) => {
                    summary.ready += ready.len();
                    self.enter(Stage::Downloading);
                    self.download(&ready, &mut summary).await?;
                    if ticket.pending() == 0 {
                        break;
                    }
                }
                PollOutcome::NotReady { attempts } => {
                    summary.timed_out = true;
                    self.log.warning(format!(
                        "Ordering {} images took longer than {attempts} minutes. Continue...",
                        self.config.mission.collection()
                    ));
                    break;
                }
                PollOutcome::Failed => {
                    if summary.ready == 0 {
                        self.log
                            .warning("No ordered product became available. Continue...");
                    }
                    break;
                }
            }
        }

        for error in &ticket.check_errors {
            self.log.warning(format!("Order status check failed, {error}"));
        }
        for (product, reason) in ticket.failures() {
            self.log
                .warning(format!("Order of {} failed: {reason}", product.name));
        }
        for product in ticket.pending_products() {
            summary.not_ready += 1;
            self.log.warning(format!(
                "Product {} was not ready within the poll budget, not downloaded",
                product.name
            ));
        }

        if self.config.unzip {
            self.enter(Stage::Extracting);
            self.extract(&mut summary);
        } else {
            self.log
                .debug("Attribute unzip set to false, not unzipping files.");
        }
        Ok(RunOutcome::Completed(summary))
    }

    async fn download(
        &mut self,
        ready: &[Product],
        summary: &mut RunSummary,
    ) -> Result<(), AcquisitionError> {
        if ready.is_empty() {
            return Ok(());
        }
        if !self.authenticated {
            self.client.authenticate().await?;
            self.authenticated = true;
            self.log.debug("Token generated");
        }

        let config = self.config;
        let destination = &config.destination;
        fs::create_dir_all(destination).map_err(|source| AcquisitionError::Io {
            path: destination.clone(),
            source,
        })?;

        for product in ready {
            if let Some(url) = &product.download_url {
                self.log.info(format!("Download file from: {url}"));
            }
            match self.client.fetch(product, destination).await {
                Ok(path) => {
                    self.log
                        .info(format!("Written product file to: {}", path.display()));
                    summary.downloaded.push(path);
                }
                Err(e) => {
                    summary.download_failures += 1;
                    self.log.error(format!(
                        "Product download failed. Error: {} ({e})",
                        product.name
                    ));
                }
            }
        }
        Ok(())
    }

    fn extract(&mut self, summary: &mut RunSummary) {
        self.log.debug("Extracting products : ...");
        for archive in &summary.downloaded {
            match extract::extract(archive) {
                Ok(report) => {
                    summary.extracted += report.extracted;
                    summary.extraction_failures += report.failures.len();
                    for failure in &report.failures {
                        self.log.error(format!("Extraction failed. Error: {failure}"));
                    }
                }
                Err(e) => {
                    summary.extraction_failures += 1;
                    self.log.error(format!("Extraction failed. Error: {e}"));
                }
            }
        }
        self.log.debug("Extracting finished.");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DownloadError;
    use crate::provider::{ItemState, ItemUpdate, OrderItem, OrderTicket};
    use crate::query::tests::rcm_config;
    use crate::query::QueryBuilder;
    use crate::run_log::Severity;
    use std::cell::Cell;
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Product `i` turns ready at check `ready_at[i]`, or never when `None`.
    pub(crate) struct Fake {
        products: Vec<Product>,
        ready_at: Vec<Option<u32>>,
        broken: Option<String>,
        pub(crate) orders: Cell<usize>,
        checks: Cell<u32>,
        authentications: u32,
    }

    impl Fake {
        pub(crate) fn with(count: usize) -> Self {
            let products = (0..count)
                .map(|i| Product {
                    id: i.to_string(),
                    name: format!("RCM1_{i}"),
                    collection: "RCMImageProducts".to_string(),
                    ..Default::default()
                })
                .collect();
            Self {
                products,
                ready_at: vec![Some(1); count],
                broken: None,
                orders: Cell::new(0),
                checks: Cell::new(0),
                authentications: 0,
            }
        }
    }

    impl SearchClient for Fake {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, _: &QueryFilter) -> Result<Vec<Product>, AcquisitionError> {
            Ok(self.products.clone())
        }

        async fn order(&self, products: &[Product]) -> Result<OrderTicket, AcquisitionError> {
            self.orders.set(self.orders.get() + 1);
            let items = products
                .iter()
                .map(|product| OrderItem {
                    item_id: None,
                    product: product.clone(),
                    state: ItemState::Pending,
                })
                .collect();
            Ok(OrderTicket::new(vec!["1".to_string()], items))
        }

        async fn check(&self, ticket: &OrderTicket) -> Result<Vec<ItemUpdate>, AcquisitionError> {
            self.checks.set(self.checks.get() + 1);
            Ok(ticket
                .items
                .iter()
                .map(|item| {
                    let due = item
                        .product
                        .id
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| self.ready_at.get(i).copied().flatten());
                    ItemUpdate {
                        product_id: item.product.id.clone(),
                        state: if due.is_some_and(|n| self.checks.get() >= n) {
                            ItemState::Ready {
                                location: format!("https://example.org/{}", item.product.id),
                            }
                        } else {
                            ItemState::Pending
                        },
                    }
                })
                .collect())
        }

        async fn authenticate(&mut self) -> Result<(), AcquisitionError> {
            self.authentications += 1;
            Ok(())
        }

        async fn fetch(
            &self,
            product: &Product,
            destination: &Path,
        ) -> Result<PathBuf, DownloadError> {
            if self.broken.as_deref() == Some(product.id.as_str()) {
                return Err(DownloadError::NoLocation(product.id.clone()));
            }
            let output = destination.join(product.archive_name());
            let mut writer = ZipWriter::new(fs::File::create(&output).unwrap());
            writer
                .start_file("manifest.xml", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"<manifest/>").unwrap();
            writer.finish().unwrap();
            Ok(output)
        }
    }

    fn setup() -> (tempfile::TempDir, RunConfig, RunLog) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = rcm_config();
        config.work_dir = dir.path().to_path_buf();
        config.destination = dir.path().join("out");
        let log = RunLog::create(dir.path(), Severity::Debug).unwrap();
        (dir, config, log)
    }

    fn filter(config: &RunConfig) -> QueryFilter {
        QueryBuilder::build(config, "POLYGON((0 0,0 1,1 1,1 0,0 0))")
    }

    fn count(log: &RunLog, needle: &str) -> usize {
        log.lines().iter().filter(|l| l.contains(needle)).count()
    }

    #[tokio::test]
    async fn test_no_results_skips_order() {
        let (_dir, config, mut log) = setup();
        let filter = filter(&config);
        let mut orchestrator = Orchestrator::new(Fake::with(0), &config, &mut log);

        let outcome = orchestrator.run(&filter).await.unwrap();

        assert_eq!(outcome, RunOutcome::NoResults);
        assert_eq!(orchestrator.client().orders.get(), 0);
        assert_eq!(orchestrator.stage(), Stage::Done);
        drop(orchestrator);
        assert_eq!(count(&log, "INFO - No images found"), 1);
        assert!(!config.destination.exists());
    }

    #[tokio::test]
    async fn test_one_failed_download_among_many() {
        let (_dir, config, mut log) = setup();
        let filter = filter(&config);
        let mut client = Fake::with(3);
        client.broken = Some("1".to_string());
        let mut orchestrator = Orchestrator::new(client, &config, &mut log);

        let outcome = orchestrator.run(&filter).await.unwrap();

        assert_eq!(orchestrator.client().authentications, 1);
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.found, 3);
        assert_eq!(summary.downloaded.len(), 2);
        assert_eq!(summary.download_failures, 1);
        drop(orchestrator);

        let written = fs::read_dir(&config.destination).unwrap().count();
        assert_eq!(written, 2);
        assert_eq!(count(&log, "ERROR - Product download failed"), 1);
        assert_eq!(count(&log, "Download finished in : "), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_continues_without_products() {
        let (_dir, config, mut log) = setup();
        let filter = filter(&config);
        let mut client = Fake::with(2);
        client.ready_at = vec![None; 2];
        let mut orchestrator = Orchestrator::new(client, &config, &mut log);

        let outcome = orchestrator.run(&filter).await.unwrap();

        assert_eq!(orchestrator.client().checks.get(), 3);
        assert_eq!(orchestrator.client().authentications, 0);
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert!(summary.timed_out);
        assert_eq!(summary.ready, 0);
        assert_eq!(summary.not_ready, 2);
        assert!(summary.downloaded.is_empty());
        drop(orchestrator);
        assert_eq!(
            count(
                &log,
                "WARNING - Ordering RCMImageProducts images took longer than 3 minutes. Continue..."
            ),
            1
        );
        assert_eq!(count(&log, "was not ready within the poll budget"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_products_ready_later_are_still_downloaded() {
        let (_dir, config, mut log) = setup();
        let filter = filter(&config);
        let mut client = Fake::with(2);
        client.ready_at = vec![Some(1), Some(2)];
        let mut orchestrator = Orchestrator::new(client, &config, &mut log);

        let RunOutcome::Completed(summary) = orchestrator.run(&filter).await.unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(orchestrator.client().checks.get(), 2);
        assert_eq!(orchestrator.client().authentications, 1);
        assert_eq!(summary.ready, 2);
        assert_eq!(summary.downloaded.len(), 2);
        assert_eq!(summary.not_ready, 0);
        assert!(!summary.timed_out);
        drop(orchestrator);
        assert!(config.destination.join("RCM1_1.zip").exists());
        assert_eq!(count(&log, "WARNING"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_product_never_ready_is_reported() {
        let (_dir, config, mut log) = setup();
        let filter = filter(&config);
        let mut client = Fake::with(2);
        client.ready_at = vec![Some(1), None];
        let mut orchestrator = Orchestrator::new(client, &config, &mut log);

        let RunOutcome::Completed(summary) = orchestrator.run(&filter).await.unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(orchestrator.client().checks.get(), 3);
        assert_eq!(summary.downloaded.len(), 1);
        assert_eq!(summary.not_ready, 1);
        assert!(summary.timed_out);
        drop(orchestrator);
        assert_eq!(
            count(
                &log,
                "WARNING - Product RCM1_1 was not ready within the poll budget, not downloaded"
            ),
            1
        );
    }

    #[tokio::test]
    async fn test_unzip_extracts_downloaded_archives() {
        let (_dir, mut config, mut log) = setup();
        config.unzip = true;
        let filter = filter(&config);
        let mut orchestrator = Orchestrator::new(Fake::with(2), &config, &mut log);

        let RunOutcome::Completed(summary) = orchestrator.run(&filter).await.unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.extraction_failures, 0);
        assert!(config.destination.join("RCM1_0/manifest.xml").exists());
        assert!(config.destination.join("RCM1_1/manifest.xml").exists());
    }
}
