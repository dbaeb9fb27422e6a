//! Stage abstraction and the sequential pipeline runners.
//!
//! Stages run strictly in order, one at a time: every stage depends on
//! mutations made by the stages before it (tokens, client id, contract
//! list), so concurrency is deliberately never introduced.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::edelia::EdeliaApi;
use crate::errors::ConnectorError;
use crate::filestore::FileStore;
use crate::models::{Contract, Entries};
use crate::store::Store;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Everything a stage may call out to, passed explicitly into every stage
/// invocation — no ambient global.
pub struct StageContext {
    pub credentials: Credentials,
    pub transport: Arc<dyn Transport>,
    pub edelia: Arc<dyn EdeliaApi>,
    pub store: Arc<dyn Store>,
    pub files: Arc<dyn FileStore>,
}

/// Ephemeral cross-stage working memory. Not part of the final output.
#[derive(Default)]
pub struct Scratch {
    /// Session token for the primary gateway.
    pub edf_token: Option<String>,
    /// Per-contract token for the secondary provider.
    pub edelia_token: Option<String>,
    /// Contract currently being processed by the secondary sub-pipeline.
    pub contract: Option<Contract>,
    /// Not-available signal: the secondary provider has no data for this
    /// account/contract. Checked by every subsequent sub-pipeline stage.
    pub no_edelia: bool,
    pub no_elec: bool,
    pub no_gas: bool,
    /// Indexes into `entries.consumption_statements`, keyed by period,
    /// used transiently to attach enrichment data. Discarded after use.
    pub statement_by_month: HashMap<String, usize>,
    pub statement_by_year: HashMap<String, usize>,
    /// Persistence counters per doctype, for the run summary.
    pub created: BTreeMap<String, u64>,
    pub updated: BTreeMap<String, u64>,
}

impl Scratch {
    /// Resets the per-contract secondary-provider state before a sub-run.
    pub fn begin_contract(&mut self, contract: Contract) {
        self.contract = Some(contract);
        self.edelia_token = None;
        self.no_edelia = false;
        self.no_elec = false;
        self.no_gas = false;
        self.statement_by_month.clear();
        self.statement_by_year.clear();
    }
}

/// One discrete unit of pipeline work: one logical API call plus
/// response shaping.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declared failure policy: a fatal stage's error aborts the primary
    /// pipeline; a non-fatal stage's error degrades to partial data.
    /// Transport errors abort regardless.
    fn fatal(&self) -> bool {
        false
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError>;
}

/// Executes stages strictly in order. Stops on the first error from a
/// fatal stage or on any transport error; other failures are logged and
/// the pipeline continues with partial data.
pub async fn run_pipeline(
    stages: &[Box<dyn Stage>],
    ctx: &StageContext,
    entries: &mut Entries,
    scratch: &mut Scratch,
) -> Result<(), ConnectorError> {
    for stage in stages {
        tracing::info!("{}", stage.name());
        match stage.run(ctx, entries, scratch).await {
            Ok(()) => {}
            Err(err) if stage.fatal() || err.is_transport() => {
                tracing::error!("Stage {} failed: {}", stage.name(), err);
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    "Stage {} failed, continuing with partial data: {}",
                    stage.name(),
                    err
                );
            }
        }
    }
    Ok(())
}

/// Executes a secondary-provider stage list for the current contract.
/// Any error aborts this sub-run only; the caller logs it and moves on to
/// the next contract.
pub async fn run_sub_pipeline(
    stages: &[Box<dyn Stage>],
    ctx: &StageContext,
    entries: &mut Entries,
    scratch: &mut Scratch,
) -> Result<(), ConnectorError> {
    for stage in stages {
        tracing::info!("{}", stage.name());
        stage.run(ctx, entries, scratch).await?;
    }
    Ok(())
}
