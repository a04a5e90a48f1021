//! Shared setup for storage integration tests

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sdms_core::{AzureConfiguration, CloudConfiguration, ExecutionContext, StorageAccountNames};
use sdms_storage::{ConnectionPool, FixedClock, InMemoryConnector, StorageService};

pub struct TestStorage {
    pub clock: Arc<FixedClock>,
    pub connector: Arc<InMemoryConnector>,
    pub service: StorageService,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

pub fn setup_test_storage() -> TestStorage {
    let clock = Arc::new(FixedClock::new(start_time()));
    let connector = Arc::new(InMemoryConnector::new());
    let pool = Arc::new(ConnectionPool::with_clock(connector.clone(), clock.clone()));
    TestStorage {
        clock,
        connector,
        service: StorageService::new(pool),
    }
}

pub fn context_with_accounts(partition: &str, transfer: &str, permanent: &str) -> ExecutionContext {
    ExecutionContext::new(
        "tenant-1",
        partition,
        CloudConfiguration::Azure(AzureConfiguration {
            storage_account_name: StorageAccountNames {
                transfer: transfer.to_string(),
                permanent: permanent.to_string(),
            },
            cosmos_account_name: String::new(),
            cosmos_database_name: String::new(),
        }),
    )
    .with_correlation_id("corr-1")
}

pub fn test_context() -> ExecutionContext {
    context_with_accounts("test", "xferacct", "permacct")
}

/// Value of a query parameter in a URL or bare query string.
pub fn query_param<'a>(url_or_query: &'a str, name: &str) -> Option<&'a str> {
    let query = url_or_query.split_once('?').map_or(url_or_query, |(_, q)| q);
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then_some(value)
    })
}
