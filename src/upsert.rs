//! End-of-run persistence: natural-key upserts for every accumulated
//! entity, the existing-bill filter and the bill document download.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::collections::HashSet;

use crate::doc::extract_text;
use crate::errors::ConnectorError;
use crate::filestore::bill_file_name;
use crate::models::{Entries, VENDOR};
use crate::pipeline::{Scratch, Stage, StageContext};
use crate::stages::bills::DOCUMENT_PATH;
use crate::store::UpsertOutcome;
use crate::xml::{self, Element};

/// Upserts one entity list; per-record failures are logged and skipped so
/// one malformed record never blocks the rest of the run.
async fn persist_all<T: Serialize>(
    ctx: &StageContext,
    scratch: &mut Scratch,
    doctype: &str,
    records: &[T],
    key_fields: &[&str],
) {
    for record in records {
        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("Could not serialize {} record: {}", doctype, err);
                continue;
            }
        };
        match ctx.store.upsert(doctype, &value, key_fields).await {
            Ok(UpsertOutcome::Created) => {
                *scratch.created.entry(doctype.to_string()).or_default() += 1;
            }
            Ok(UpsertOutcome::Updated) => {
                *scratch.updated.entry(doctype.to_string()).or_default() += 1;
            }
            Err(err) => {
                tracing::error!("Could not upsert {} record: {}", doctype, err);
            }
        }
    }
}

pub struct PersistRecords;

#[async_trait]
impl Stage for PersistRecords {
    fn name(&self) -> &'static str {
        "PersistRecords"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        persist_all(ctx, scratch, "client", &entries.clients, &["clientId", "vendor"]).await;
        persist_all(ctx, scratch, "contract", &entries.contracts, &["number", "vendor"]).await;
        persist_all(
            ctx,
            scratch,
            "paymentterms",
            &entries.payment_terms,
            &["vendor", "clientId"],
        )
        .await;
        persist_all(ctx, scratch, "home", &entries.homes, &["pdl"]).await;
        persist_all(
            ctx,
            scratch,
            "consumptionstatement",
            &entries.consumption_statements,
            &[
                "contractNumber",
                "statementType",
                "statementReason",
                "statementCategory",
                "start",
            ],
        )
        .await;
        persist_all(
            ctx,
            scratch,
            "energybreakdown",
            &entries.energy_breakdowns,
            &["contractNumber", "vendor", "energyType"],
        )
        .await;
        Ok(())
    }
}

pub struct FilterExistingBills;

#[async_trait]
impl Stage for FilterExistingBills {
    fn name(&self) -> &'static str {
        "FilterExistingBills"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        _scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let existing = ctx.store.find_existing("bill", VENDOR).await?;
        let known: HashSet<String> = existing
            .iter()
            .filter_map(|doc| doc.get("number").and_then(|n| n.as_str()))
            .map(str::to_string)
            .collect();

        let fetched = std::mem::take(&mut entries.fetched);
        let total = fetched.len();
        entries.filtered = fetched
            .into_iter()
            .filter(|bill| !known.contains(&bill.number))
            .collect();

        tracing::info!(
            "{} of {} fetched bills are new",
            entries.filtered.len(),
            total
        );
        Ok(())
    }
}

pub struct SaveBills;

#[async_trait]
impl Stage for SaveBills {
    fn name(&self) -> &'static str {
        "SaveBills"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let token = scratch.edf_token.clone().ok_or_else(|| {
            ConnectorError::Parse("No session token in pipeline state".to_string())
        })?;

        let mut bills = std::mem::take(&mut entries.filtered);
        for bill in &mut bills {
            let file_name = bill_file_name(bill);

            let stored = if ctx.files.exists(&file_name).await {
                tracing::info!("Document {} already stored", file_name);
                file_name.clone()
            } else {
                match download_document(ctx, &token, &bill.client_id, &bill.number, &file_name)
                    .await
                {
                    Ok(path) => path,
                    // Network failure here will hit every remaining bill
                    // too; give up on the stage.
                    Err(err) if err.is_transport() => return Err(err),
                    Err(err) => {
                        tracing::error!("Could not save document for bill {}: {}", bill.number, err);
                        continue;
                    }
                }
            };

            bill.pdfurl = Some(stored);

            let value = match serde_json::to_value(&*bill) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!("Could not serialize bill {}: {}", bill.number, err);
                    continue;
                }
            };
            match ctx.store.upsert("bill", &value, &["vendor", "number"]).await {
                Ok(UpsertOutcome::Created) => {
                    *scratch.created.entry("bill".to_string()).or_default() += 1;
                }
                Ok(UpsertOutcome::Updated) => {
                    *scratch.updated.entry("bill".to_string()).or_default() += 1;
                }
                Err(err) => {
                    tracing::error!("Could not upsert bill {}: {}", bill.number, err);
                }
            }
        }
        entries.filtered = bills;
        Ok(())
    }
}

/// Fetches one bill PDF through the gateway document endpoint and stores
/// it; returns the stored path.
async fn download_document(
    ctx: &StageContext,
    token: &str,
    client_id: &str,
    bill_number: &str,
    file_name: &str,
) -> Result<String, ConnectorError> {
    let option = |cle: &str, valeur: &str| {
        Element::new("options")
            .child(Element::text("cle", cle))
            .child(Element::text("valeur", valeur))
    };

    let body = Element::new("dico:getRequest")
        .attr(
            "xmlns:dico",
            "http://www.edf.fr/psc/pscma100/recupererDocumentContractuel/service/v1",
        )
        .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
        .attr(
            "xsi:schemaLocation",
            "http://www.edf.fr/psc/pscma100/recupererDocumentContractuel/service/v1 recupererDocumentContractuel.xsd",
        )
        .child(
            Element::new("getRequest")
                .child(option("id", "pscedfmoi"))
                .child(option("2", client_id))
                .child(option("4", bill_number))
                .child(option("6", "Facture")),
        )
        .child(Element::text("numeroBp", client_id))
        .child(Element::text("jeton", token));

    let raw = ctx.transport.post_raw(DOCUMENT_PATH, &body).await?;
    let tree = xml::decode(&raw)?;

    let encoded = extract_text(
        &tree,
        &["rdc:getResponse", "getResponse", "docubase", "documentPDF", "pdf"],
    )
    .ok_or_else(|| {
        ConnectorError::Parse(format!("No PDF payload for bill {}", bill_number))
    })?;

    let bytes = STANDARD
        .decode(encoded.trim().as_bytes())
        .map_err(|e| ConnectorError::Parse(format!("PDF payload is not base64: {}", e)))?;

    ctx.files.save(file_name, &bytes).await
}
