//! Per-contract consumption history from the gateway. One sequential
//! request per contract; a contract that fails only costs its own
//! statements.

use async_trait::async_trait;

use super::{current_client, session_token, text};
use crate::doc::extract;
use crate::errors::ConnectorError;
use crate::models::{ConsumptionStatement, Entries};
use crate::pipeline::{Scratch, Stage, StageContext};
use crate::xml::Element;

const PATH: &str = "/ws/visualiserHistoConso_rest_V3-0/invoke";

pub struct ConsumptionHistory;

#[async_trait]
impl Stage for ConsumptionHistory {
    fn name(&self) -> &'static str {
        "ConsumptionHistory"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let token = session_token(scratch)?;
        let client_id = current_client(entries)?.client_id.clone();
        let contract_numbers: Vec<String> =
            entries.contracts.iter().map(|c| c.number.clone()).collect();

        for number in contract_numbers {
            let body = Element::new("message:msgRequete")
                .attr(
                    "xmlns:message",
                    "http://www.edf.fr/commerce/passerelle/css/visualiserHistoConso/service/v2",
                )
                .attr(
                    "xmlns:ent",
                    "http://www.edf.fr/commerce/passerelle/commun/v2/entete",
                )
                .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
                .child(
                    Element::new("message:enteteEntree")
                        .child(Element::text("ent:jeton", &token)),
                )
                .child(
                    Element::new("message:corpsEntree")
                        .child(Element::text("message:numeroBp", &client_id))
                        .child(Element::text("message:numeroContrat", &number)),
                );

            let tree = ctx.transport.post(PATH, &body).await?;

            let code = text(&tree, &["ns:msgReponse", "ns:enteteSortie", "ent:codeRetour"]);
            if let Some(code) = code {
                if code != "0" {
                    let label = text(
                        &tree,
                        &["ns:msgReponse", "ns:enteteSortie", "ent:libelleRetour"],
                    )
                    .unwrap_or_default();
                    tracing::warn!(
                        "Consumption history for contract {} returned {}: {}",
                        number,
                        code,
                        label
                    );
                    continue;
                }
            }

            let Some(corps) = extract(&tree, &["ns:msgReponse", "ns:corpsSortie"]) else {
                tracing::info!("No consumption history for contract {}", number);
                continue;
            };

            let mut count = 0usize;
            for conso in corps.children("ns:listeHistoDeConso") {
                entries.consumption_statements.push(ConsumptionStatement {
                    contract_number: number.clone(),
                    bill_number: text(conso, &["ns:numeroFacture"]),
                    start: text(conso, &["ns:dateDebut"]),
                    end: text(conso, &["ns:dateFin"]),
                    value: text(conso, &["ns:listeConsommation", "ns:valeur"])
                        .and_then(|v| v.parse::<f64>().ok()),
                    statement_type: text(conso, &["ns:typeReleve"]),
                    statement_category: text(conso, &["ns:categorieReleve"]),
                    statement_reason: text(conso, &["ns:motifReleve"]),
                    ..Default::default()
                });
                count += 1;
            }
            tracing::info!("Fetched {} statements for contract {}", count, number);
        }

        Ok(())
    }
}
