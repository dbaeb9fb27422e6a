//! Invoice listing. The gateway returns every bill since the search date;
//! reconciliation against already-stored bills happens later.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{current_client, session_token, text};
use crate::doc::extract;
use crate::errors::ConnectorError;
use crate::models::{Bill, Entries, VENDOR};
use crate::pipeline::{Scratch, Stage, StageContext};
use crate::xml::Element;

const PATH: &str = "/ws/visualiserFacture_rest_V3-0/invoke";

/// Document endpoint the saved PDF is fetched from; replaced by the
/// stored file path once downloaded.
pub const DOCUMENT_PATH: &str = "/ws/recupererDocumentContractuelGet_rest_V1-0/invoke";

pub struct FetchBills;

#[async_trait]
impl Stage for FetchBills {
    fn name(&self) -> &'static str {
        "FetchBills"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let token = session_token(scratch)?;
        let client = current_client(entries)?;
        let client_id = client.client_id.clone();
        let numero_acc = client.numero_acc.clone();

        let body = Element::new("tns:msgRequete")
            .attr(
                "xmlns:tns",
                "http://www.edf.fr/commerce/passerelle/pas023/visualiserFacture/service/v2",
            )
            .child(
                Element::new("visualiserFactureRequest")
                    .child(Element::text("numeroBp", &client_id))
                    .child(Element::text("jeton", &token))
                    .child(Element::text("numeroAcc", &numero_acc))
                    .child(Element::text("dateRecherche", "1900-01-01")),
            );

        let tree = ctx.transport.post(PATH, &body).await?;

        let response = [
            "tns:msgReponse",
            "visualiserFactureResponse",
            "responseWebService",
        ];
        let code = text(&tree, &[response[0], response[1], response[2], "codeErreur"]);
        if let Some(code) = code {
            if code != "0" {
                let label = text(
                    &tree,
                    &[response[0], response[1], response[2], "libelleErreur"],
                )
                .unwrap_or_default();
                return Err(ConnectorError::business(code, label));
            }
        }

        let listing = extract(
            &tree,
            &[response[0], response[1], response[2], "listeFactures"],
        )
        .ok_or_else(|| ConnectorError::Parse("No bill listing in response".to_string()))?;

        let mut bills = Vec::new();
        for elem in listing.children("item") {
            let Some(number) = text(elem, &["numeroFacture"]) else {
                tracing::warn!("Bill without number in listing, skipped");
                continue;
            };
            let Some(date) = text(elem, &["resume", "dateEmission"])
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
            else {
                tracing::warn!("Bill {} has no parsable emission date, skipped", number);
                continue;
            };

            bills.push(Bill {
                vendor: VENDOR.to_string(),
                client_id: client_id.clone(),
                number,
                date,
                title: text(elem, &["resume", "type"]),
                payment_due_date: text(elem, &["resume", "dateEcheance"]),
                scheduled_payment_date: text(elem, &["resume", "datePrelevement"]),
                total_payment_due: text(elem, &["resume", "montantFactureFraiche"]),
                value: text(elem, &["resume", "montantReclame"]),
                balance_before_invoice: text(elem, &["resume", "soldeAvantFacture"]),
                pdfurl: Some(DOCUMENT_PATH.to_string()),
            });
        }

        tracing::info!("Fetched {} bills", bills.len());
        entries.fetched = bills;
        Ok(())
    }
}
