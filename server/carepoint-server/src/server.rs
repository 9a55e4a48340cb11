use anyhow::Result;
use database_layer::DatabasePool;

use billing_ledger::{BillManager, BillingReports, InvoiceGenerator, PaymentLedger};

/// Main CarePoint server state
#[derive(Clone)]
pub struct CarePointServer {
    /// Server configuration
    pub config: ServerConfig,
    /// Database pool
    pub database: DatabasePool,
    /// Bill manager
    pub bills: BillManager,
    /// Invoice generator
    pub invoices: InvoiceGenerator,
    /// Payment ledger
    pub payments: PaymentLedger,
    /// Read-only reporting
    pub reports: BillingReports,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name
    pub name: String,
    /// Request timeout in seconds
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "CarePoint Platform".to_string(),
            request_timeout: 30,
        }
    }
}

impl CarePointServer {
    /// Create a new server instance with its service graph.
    pub async fn new(database_url: &str) -> Result<Self> {
        let database = DatabasePool::new(database_url).await?;
        let pool = database.pool().clone();

        Ok(Self {
            config: ServerConfig::default(),
            database,
            bills: BillManager::new(pool.clone()),
            invoices: InvoiceGenerator::new(pool.clone()),
            payments: PaymentLedger::new(pool.clone()),
            reports: BillingReports::new(pool),
        })
    }
}
