//! Connector entry point: wires credentials and service implementations
//! into a stage context, runs the full operation list and reports what
//! was persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::edelia::EdeliaApi;
use crate::errors::ConnectorError;
use crate::filestore::FileStore;
use crate::models::Entries;
use crate::pipeline::{run_pipeline, Credentials, Scratch, Stage, StageContext};
use crate::stages::auth::Authenticate;
use crate::stages::bills::FetchBills;
use crate::stages::consumption::ConsumptionHistory;
use crate::stages::contracts::ListContracts;
use crate::stages::edelia::EdeliaData;
use crate::stages::partner::PartnerProfile;
use crate::stages::payment::{CommercialTerms, FetchPaymentSchedule};
use crate::store::Store;
use crate::transport::Transport;
use crate::upsert::{FilterExistingBills, PersistRecords, SaveBills};

/// Per-doctype persistence counts for one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub created: BTreeMap<String, u64>,
    pub updated: BTreeMap<String, u64>,
}

pub struct Connector {
    ctx: StageContext,
}

impl Connector {
    /// Builds a connector after validating the credentials. Fails before
    /// any network activity when either credential is empty.
    pub fn new(
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        edelia: Arc<dyn EdeliaApi>,
        store: Arc<dyn Store>,
        files: Arc<dyn FileStore>,
    ) -> Result<Self, ConnectorError> {
        if credentials.email.trim().is_empty() {
            return Err(ConnectorError::MissingCredentials("email".to_string()));
        }
        if credentials.password.trim().is_empty() {
            return Err(ConnectorError::MissingCredentials("password".to_string()));
        }

        Ok(Self {
            ctx: StageContext {
                credentials,
                transport,
                edelia,
                store,
                files,
            },
        })
    }

    /// The full operation list, in pipeline order.
    fn operations() -> Vec<Box<dyn Stage>> {
        vec![
            Box::new(Authenticate),
            Box::new(ListContracts),
            Box::new(PartnerProfile),
            Box::new(CommercialTerms),
            Box::new(FetchPaymentSchedule),
            Box::new(FetchBills),
            Box::new(ConsumptionHistory),
            Box::new(EdeliaData::new()),
            Box::new(PersistRecords),
            Box::new(FilterExistingBills),
            Box::new(SaveBills),
        ]
    }

    pub async fn run(&self) -> Result<RunSummary, ConnectorError> {
        let stages = Self::operations();
        let mut entries = Entries::default();
        let mut scratch = Scratch::default();

        run_pipeline(&stages, &self.ctx, &mut entries, &mut scratch).await?;

        let summary = RunSummary {
            created: scratch.created,
            updated: scratch.updated,
        };
        for (doctype, count) in &summary.created {
            tracing::info!("Created {} {} records", count, doctype);
        }
        for (doctype, count) in &summary.updated {
            tracing::info!("Updated {} {} records", count, doctype);
        }
        Ok(summary)
    }
}
