use std::{collections::HashMap, sync::Arc};

use checkout_engine::{
    events::EventProducers,
    helpers::MockClock,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    traits::ExpiryResult,
    CheckoutError,
    CheckoutFlowApi,
    CheckoutResult,
    SqliteDatabase,
};
use chrono::{TimeZone, Utc};
use cucumber::World;
use log::*;

#[derive(Default, Debug, World)]
pub struct CheckoutWorld {
    pub system: Option<CheckoutSystem>,
}

#[derive(Debug)]
pub struct CheckoutSystem {
    pub db_path: String,
    pub api: CheckoutFlowApi<SqliteDatabase>,
    pub clock: MockClock,
    /// The outcome of each buyer's most recent checkout, keyed by buyer name.
    pub checkouts: HashMap<String, Result<CheckoutResult, CheckoutError>>,
    pub last_expiry: Option<ExpiryResult>,
}

impl CheckoutWorld {
    pub fn system(&mut self) -> &mut CheckoutSystem {
        self.system.as_mut().expect("Checkout system not initialised")
    }

    pub fn api(&self) -> &CheckoutFlowApi<SqliteDatabase> {
        &self.system.as_ref().expect("Checkout system not initialised").api
    }

    pub fn checkout(&self, buyer: &str) -> &CheckoutResult {
        let system = self.system.as_ref().expect("Checkout system not initialised");
        match system.checkouts.get(buyer) {
            Some(Ok(result)) => result,
            Some(Err(e)) => panic!("{buyer}'s checkout failed: {e}"),
            None => panic!("{buyer} has not checked out"),
        }
    }
}

impl CheckoutSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let api = CheckoutFlowApi::new(db, EventProducers::default()).with_clock(Arc::new(clock.clone()));
        Self { db_path: url, api, clock, checkouts: HashMap::new(), last_expiry: None }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
