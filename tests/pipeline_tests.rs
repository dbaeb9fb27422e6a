/// Pipeline runner behavior: stage ordering, the declared-fatality abort
/// rule, transport escalation and per-contract sub-pipeline isolation.
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use edf_connector::doc::Node;
use edf_connector::edelia::{EdeliaApi, EdeliaPayload};
use edf_connector::errors::ConnectorError;
use edf_connector::filestore::LocalFileStore;
use edf_connector::models::{Client, Contract, Entries, VENDOR};
use edf_connector::pipeline::{
    run_pipeline, Credentials, Scratch, Stage, StageContext,
};
use edf_connector::stages::edelia::EdeliaData;
use edf_connector::store::MemoryStore;
use edf_connector::transport::Transport;
use edf_connector::xml::Element;

/// Transport that refuses every call; stages under test never reach it.
struct NoTransport;

#[async_trait]
impl Transport for NoTransport {
    async fn post(&self, _path: &str, _body: &Element) -> Result<Node, ConnectorError> {
        Err(ConnectorError::Transport("no transport in this test".into()))
    }

    async fn post_raw(&self, _path: &str, _body: &Element) -> Result<String, ConnectorError> {
        Err(ConnectorError::Transport("no transport in this test".into()))
    }
}

struct NoEdelia;

#[async_trait]
impl EdeliaApi for NoEdelia {
    async fn token(&self, _sso: &str, _bp: &str, _pdl: &str) -> Result<String, ConnectorError> {
        Err(ConnectorError::business("EDELIA_TOKEN", "no edelia in this test"))
    }

    async fn get(&self, _token: &str, _path: &str) -> Result<EdeliaPayload, ConnectorError> {
        Err(ConnectorError::Transport("no edelia in this test".into()))
    }
}

fn test_context() -> StageContext {
    StageContext {
        credentials: Credentials {
            email: "jean@example.com".to_string(),
            password: "secret".to_string(),
        },
        transport: Arc::new(NoTransport),
        edelia: Arc::new(NoEdelia),
        store: Arc::new(MemoryStore::new()),
        files: Arc::new(LocalFileStore::new(std::env::temp_dir())),
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    FailBusiness,
    FailTransport,
}

struct ScriptedStage {
    name: &'static str,
    fatal: bool,
    behavior: Behavior,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fatal(&self) -> bool {
        self.fatal
    }

    async fn run(
        &self,
        _ctx: &StageContext,
        entries: &mut Entries,
        _scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        self.log.lock().unwrap().push(self.name);
        entries.clients.push(Client {
            vendor: VENDOR.to_string(),
            client_id: self.name.to_string(),
            ..Default::default()
        });
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::FailBusiness => Err(ConnectorError::business("ERR", "scripted failure")),
            Behavior::FailTransport => Err(ConnectorError::Transport("scripted outage".into())),
        }
    }
}

fn scripted(
    name: &'static str,
    fatal: bool,
    behavior: Behavior,
    log: &Arc<Mutex<Vec<&'static str>>>,
) -> Box<dyn Stage> {
    Box::new(ScriptedStage {
        name,
        fatal,
        behavior,
        log: Arc::clone(log),
    })
}

#[tokio::test]
async fn stages_run_strictly_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let stages = vec![
        scripted("first", true, Behavior::Succeed, &log),
        scripted("second", false, Behavior::Succeed, &log),
        scripted("third", false, Behavior::Succeed, &log),
    ];

    let ctx = test_context();
    let mut entries = Entries::default();
    let result = run_pipeline(&stages, &ctx, &mut entries, &mut Scratch::default()).await;

    assert!(result.is_ok());
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);

    // The accumulator is the sequential composition of each stage's
    // mutation, in stage order.
    let ids: Vec<&str> = entries.clients.iter().map(|c| c.client_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn fatal_stage_error_aborts_remaining_stages() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let stages = vec![
        scripted("first", true, Behavior::Succeed, &log),
        scripted("second", true, Behavior::FailBusiness, &log),
        scripted("third", false, Behavior::Succeed, &log),
    ];

    let ctx = test_context();
    let result = run_pipeline(&stages, &ctx, &mut Entries::default(), &mut Scratch::default()).await;

    assert!(matches!(result, Err(ConnectorError::Business { .. })));
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn non_fatal_stage_error_degrades_to_partial_data() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let stages = vec![
        scripted("first", true, Behavior::Succeed, &log),
        scripted("second", false, Behavior::FailBusiness, &log),
        scripted("third", false, Behavior::Succeed, &log),
    ];

    let ctx = test_context();
    let result = run_pipeline(&stages, &ctx, &mut Entries::default(), &mut Scratch::default()).await;

    assert!(result.is_ok());
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn transport_error_aborts_even_from_non_fatal_stage() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let stages = vec![
        scripted("first", true, Behavior::Succeed, &log),
        scripted("second", false, Behavior::FailTransport, &log),
        scripted("third", false, Behavior::Succeed, &log),
    ];

    let ctx = test_context();
    let result = run_pipeline(&stages, &ctx, &mut Entries::default(), &mut Scratch::default()).await;

    assert!(matches!(result, Err(ConnectorError::Transport(_))));
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

/// Edelia API where the first delivery point's data calls hit a network
/// outage mid-run, while the second delivery point works normally.
struct OneGoodPdl;

#[async_trait]
impl EdeliaApi for OneGoodPdl {
    async fn token(&self, _sso: &str, _bp: &str, pdl: &str) -> Result<String, ConnectorError> {
        Ok(format!("edelia-token-{pdl}"))
    }

    async fn get(&self, token: &str, path: &str) -> Result<EdeliaPayload, ConnectorError> {
        if token == "edelia-token-PDL1" {
            return Err(ConnectorError::Transport("connection reset".into()));
        }
        if path.starts_with("/sites/-/profiles/simple") {
            Ok(EdeliaPayload {
                status: 200,
                body: serde_json::json!({
                    "housingType": "APARTMENT",
                    "surfaceInSqMeter": 62.0,
                    "noOfOccupants": 3
                }),
            })
        } else {
            // Every consumption endpoint reports no data.
            Ok(EdeliaPayload {
                status: 404,
                body: serde_json::Value::Null,
            })
        }
    }
}

fn contract(number: &str, pdl: &str) -> Contract {
    Contract {
        vendor: VENDOR.to_string(),
        client_id: "BP123".to_string(),
        number: number.to_string(),
        pdl: Some(pdl.to_string()),
        energy_type: Some("Électricité".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn edelia_failure_for_one_contract_does_not_block_the_next() {
    let ctx = StageContext {
        credentials: Credentials {
            email: "jean@example.com".to_string(),
            password: "secret".to_string(),
        },
        transport: Arc::new(NoTransport),
        edelia: Arc::new(OneGoodPdl),
        store: Arc::new(MemoryStore::new()),
        files: Arc::new(LocalFileStore::new(std::env::temp_dir())),
    };

    let mut entries = Entries::default();
    entries.contracts = vec![contract("K1", "PDL1"), contract("K2", "PDL2")];
    let mut scratch = Scratch::default();
    scratch.edf_token = Some("sso-token".to_string());

    let stage = EdeliaData::new();
    let result = stage.run(&ctx, &mut entries, &mut scratch).await;

    // The first contract's mid-run transport failure is absorbed; the
    // second contract still produces its household profile and the stage
    // reports overall success.
    assert!(result.is_ok());
    assert_eq!(entries.homes.len(), 1);
    assert_eq!(entries.homes[0].pdl, "PDL2");
    assert_eq!(entries.homes[0].occupants_count, Some(3));
}
