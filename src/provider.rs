use crate::config::PollBudget;
use crate::error::{AcquisitionError, DownloadError};
use crate::query::QueryFilter;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

pub mod copernicus;
pub mod eodms;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: String,
    pub value: String,
}

/// A catalog entry matching the search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub collection: String,
    pub content_length: Option<u64>,
    pub acquisition_start: Option<String>,
    pub acquisition_end: Option<String>,
    pub publication_date: Option<String>,
    pub modification_date: Option<String>,
    pub online: bool,
    pub checksums: Vec<Checksum>,
    pub footprint: Option<String>,
    pub download_url: Option<String>,
}

impl Product {
    /// File name of the downloaded archive.
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.name)
    }

    /// Where the archive goes inside `destination`. Names that would leave it are refused.
    pub fn archive_path(&self, destination: &Path) -> Result<PathBuf, DownloadError> {
        let mut components = Path::new(&self.name).components();
        let single_file = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_file || self.name.contains(['/', '\\']) {
            return Err(DownloadError::UnsafeName(self.name.clone()));
        }
        Ok(destination.join(self.archive_name()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Ready { location: String },
    /// Handed out for download. Later checks leave it alone.
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub item_id: Option<String>,
    pub product: Product,
    pub state: ItemState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Submitted,
    Polling { attempt: u32 },
    Ready,
    TimedOut,
    Failed,
}

/// Handle on a submitted order. Only the poll loop mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTicket {
    pub order_ids: Vec<String>,
    pub items: Vec<OrderItem>,
    pub state: TicketState,
    /// Problems seen while checking readiness; none of them stop polling.
    pub check_errors: Vec<String>,
    /// Checks made so far, over every call to [`SearchClient::poll`].
    pub attempts: u32,
    polling_since: Option<Instant>,
}

impl OrderTicket {
    pub fn new(order_ids: Vec<String>, items: Vec<OrderItem>) -> Self {
        Self {
            order_ids,
            items,
            state: TicketState::Submitted,
            check_errors: vec![],
            attempts: 0,
            polling_since: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![], vec![])
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ready products, each carrying the location it can be fetched from.
    pub fn ready_products(&self) -> Vec<Product> {
        self.items
            .iter()
            .filter_map(|item| match &item.state {
                ItemState::Ready { location } => Some(Product {
                    download_url: Some(location.clone()),
                    ..item.product.clone()
                }),
                _ => None,
            })
            .collect()
    }

    /// Like [`Self::ready_products`], but marks the returned items delivered so they are
    /// handed out only once.
    pub fn take_ready(&mut self) -> Vec<Product> {
        let ready = self.ready_products();
        for item in &mut self.items {
            if matches!(item.state, ItemState::Ready { .. }) {
                item.state = ItemState::Delivered;
            }
        }
        ready
    }

    /// Products still waiting to become ready.
    pub fn pending_products(&self) -> impl Iterator<Item = &Product> {
        self.items
            .iter()
            .filter(|i| i.state == ItemState::Pending)
            .map(|i| &i.product)
    }

    pub fn pending(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.state == ItemState::Pending)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Product, &str)> {
        self.items.iter().filter_map(|item| match &item.state {
            ItemState::Failed(reason) => Some((&item.product, reason.as_str())),
            _ => None,
        })
    }

    fn apply(&mut self, updates: Vec<ItemUpdate>) {
        for update in updates {
            if let Some(item) = self
                .items
                .iter_mut()
                .filter(|i| i.state != ItemState::Delivered)
                .find(|i| i.product.id == update.product_id)
            {
                item.state = update.state;
            }
        }
    }
}

/// Readiness of one ordered product as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
    pub product_id: String,
    pub state: ItemState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Products that became ready since the previous call.
    Ready(Vec<Product>),
    NotReady { attempts: u32 },
    /// Nothing is ready and nothing is pending any more.
    Failed,
}

/// A satellite catalog able to search, order and deliver products.
pub trait SearchClient {
    fn name(&self) -> &'static str;

    /// An empty result is not an error.
    async fn search(&self, filter: &QueryFilter) -> Result<Vec<Product>, AcquisitionError>;

    /// Submits `products` as one order. An empty slice yields an empty ticket without a request.
    async fn order(&self, products: &[Product]) -> Result<OrderTicket, AcquisitionError>;

    /// One readiness check of every item on the ticket.
    async fn check(&self, ticket: &OrderTicket) -> Result<Vec<ItemUpdate>, AcquisitionError>;

    /// Obtains whatever credentials downloads need. Called once, before the first fetch.
    async fn authenticate(&mut self) -> Result<(), AcquisitionError> {
        Ok(())
    }

    /// Streams a ready product into `destination` and returns the written file.
    async fn fetch(&self, product: &Product, destination: &Path)
        -> Result<PathBuf, DownloadError>;

    /// Checks readiness until some product is ready, spending at most `budget` over all calls
    /// on the same ticket. The budget is measured from the first check, so calling again after
    /// downloading the returned products waits for the rest of the order.
    async fn poll(&self, ticket: &mut OrderTicket, budget: PollBudget) -> PollOutcome {
        if ticket.is_empty() {
            ticket.state = TicketState::Ready;
            return PollOutcome::Ready(vec![]);
        }

        let started = *ticket.polling_since.get_or_insert_with(Instant::now);
        while ticket.attempts < budget.max_attempts {
            if ticket.attempts > 0 {
                if started.elapsed() + budget.interval > budget.total() {
                    break;
                }
                tokio::time::sleep(budget.interval).await;
            }
            ticket.attempts += 1;
            let attempt = ticket.attempts;
            ticket.state = TicketState::Polling { attempt };

            match self.check(ticket).await {
                Ok(updates) => ticket.apply(updates),
                Err(e) => {
                    tracing::warn!("Readiness check {attempt} failed: {e}");
                    ticket.check_errors.push(format!("attempt {attempt}: {e}"));
                }
            }

            let ready = ticket.take_ready();
            if !ready.is_empty() {
                ticket.state = TicketState::Ready;
                return PollOutcome::Ready(ready);
            }
            if ticket.pending() == 0 {
                ticket.state = TicketState::Failed;
                return PollOutcome::Failed;
            }
        }

        ticket.state = TicketState::TimedOut;
        PollOutcome::NotReady {
            attempts: ticket.attempts,
        }
    }
}

/// Shared HTTP client. Redirects are followed by hand so credentials survive every hop.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}
