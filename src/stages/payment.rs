//! Billing configuration: the commercial agreement (bank details, payment
//! means, last payment) and the payment schedule calendar. Both non-fatal,
//! and either may create the single PaymentTerms record.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{current_client, session_token, text};
use crate::doc::extract;
use crate::errors::ConnectorError;
use crate::models::{Entries, LastPayment, PaymentSchedule, PaymentTerms, VENDOR};
use crate::pipeline::{Scratch, Stage, StageContext};
use crate::xml::Element;

const TERMS_PATH: &str = "/ws/visualiserAccordCommercial_rest_sso_V3-0/invoke";
const SCHEDULE_PATH: &str = "/ws/visualiserCalendrierPaiement_rest_V2-0/invoke";

pub struct CommercialTerms;

#[async_trait]
impl Stage for CommercialTerms {
    fn name(&self) -> &'static str {
        "CommercialTerms"
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

        let body = Element::new("visualiserAccordCommercialRequest")
            .attr("xmlns", "http://www.edf.fr/psc/0122/v3/visualiserAccordCommercial")
            .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .attr(
                "xsi:schemaLocation",
                "http://www.edf.fr/psc/0122/v3/visualiserAccordCommercial visualiserAccordCommercial.xsd",
            )
            .child(Element::text("jeton", &token))
            .child(Element::text("numeroBp", &client_id))
            .child(Element::text("numeroAcc", &numero_acc))
            .child(Element::text("applicationAppelante", "EDFETMOI"));

        let tree = ctx.transport.post(TERMS_PATH, &body).await?;

        let response_path = [
            "tns:visualiserAccordCommercialResponse",
            "tns:responseWebService",
        ];
        let code = text(
            &tree,
            &[response_path[0], response_path[1], "tns:CodeEtatService"],
        );
        if let Some(code) = code {
            if code != "PSC0000" {
                let label = text(
                    &tree,
                    &[response_path[0], response_path[1], "tns:LibelleEtatService"],
                )
                .unwrap_or_default();
                return Err(ConnectorError::business(code, label));
            }
        }

        let aco = extract(
            &tree,
            &[
                response_path[0],
                response_path[1],
                "tns:listeAccordsCommerciaux",
                "tns:item",
            ],
        )
        .ok_or_else(|| {
            ConnectorError::Parse("No commercial agreement item in response".to_string())
        })?;

        let bank_address_street = text(aco, &["tns:banque", "tns:numNomRue"]);
        let bank_address_city = text(aco, &["tns:banque", "tns:codePostalVille"]);
        let bank_address_country = text(aco, &["tns:banque", "tns:pays"]);
        let bank_address_formated = format!(
            "{}\n{} {}",
            bank_address_street.as_deref().unwrap_or_default(),
            bank_address_city.as_deref().unwrap_or_default(),
            bank_address_country.as_deref().unwrap_or_default()
        );
        let bank_details = json!({
            "iban": text(aco, &["tns:banque", "tns:iban"]),
            "holder": text(aco, &["tns:compte", "tns:titulaire"]),
            "bank": text(aco, &["tns:banque", "tns:nom"]),
            "bankAddress": {
                "street": bank_address_street,
                "city": bank_address_city,
                "country": bank_address_country,
                "formated": bank_address_formated,
            },
        });
        let encrypted_bank_details = serde_json::to_string(&bank_details)
            .map_err(|e| ConnectorError::Parse(format!("Bank details not serializable: {}", e)))?;

        let terms = PaymentTerms {
            vendor: VENDOR.to_string(),
            client_id,
            encrypted_bank_details: Some(encrypted_bank_details),
            balance: text(aco, &["tns:detail", "tns:solde"]),
            payment_means: text(aco, &["tns:detail", "tns:modeEncaissement"]),
            modif_bank_details_allowed: text(aco, &["tns:detail", "tns:modifIBANAutorisee"]),
            dernier_reglement: Some(LastPayment {
                date: text(aco, &["tns:dernierReglement", "tns:date"]),
                amount: text(aco, &["tns:dernierReglement", "tns:montant"]),
                payment_type: text(aco, &["tns:dernierReglement", "tns:type"]),
            }),
            bill_frequency: text(aco, &["tns:facturation", "tns:periodicite"]),
            next_bill_date: None,
            id_payer: text(aco, &["tns:numeroPayeur"]),
            payer_divergent: text(aco, &["tns:payeurDivergent"]),
            payment_schedules: Vec::new(),
        };

        let services: Vec<Value> = extract(aco, &["tns:services"])
            .map(|services_elem| {
                services_elem
                    .children("tns:item")
                    .iter()
                    .map(|service| {
                        let values_available: Vec<Value> = service
                            .children("tns:valeursPossibles")
                            .iter()
                            .filter_map(|v| v.text())
                            .map(|v| Value::String(v.to_string()))
                            .collect();
                        json!({
                            "name": text(service, &["tns:nomService"]),
                            "status": text(service, &["tns:etat"]),
                            "valueSubscribed": text(service, &["tns:valeurSouscrite"]),
                            "valuesAvailable": values_available,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        entries.payment_terms.push(terms);
        for contract in &mut entries.contracts {
            contract.services.extend(services.iter().cloned());
        }

        tracing::info!("Fetched commercial terms");
        Ok(())
    }
}

pub struct FetchPaymentSchedule;

#[async_trait]
impl Stage for FetchPaymentSchedule {
    fn name(&self) -> &'static str {
        "FetchPaymentSchedule"
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

        let body = Element::new("message:msgRequete")
            .attr(
                "xmlns:message",
                "http://www.edf.fr/commerce/passerelle/css/visualiserCalendrierPaiement/service/v2",
            )
            .attr(
                "xmlns:ent",
                "http://www.edf.fr/commerce/passerelle/commun/v2/entete",
            )
            .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .child(Element::new("message:enteteEntree").child(Element::text("ent:jeton", &token)))
            .child(
                Element::new("message:corpsEntree")
                    .child(Element::text("message:numeroBp", &client_id))
                    .child(Element::text("message:numeroAcc", &numero_acc)),
            );

        let tree = ctx.transport.post(SCHEDULE_PATH, &body).await?;

        let code = text(&tree, &["ns:msgReponse", "ns:enteteSortie", "ent:codeRetour"]);
        if let Some(code) = code {
            if code != "0" {
                let label = text(
                    &tree,
                    &["ns:msgReponse", "ns:enteteSortie", "ent:libelleRetour"],
                )
                .unwrap_or_default();
                return Err(ConnectorError::business(code, label));
            }
        }

        let calendar = extract(
            &tree,
            &["ns:msgReponse", "ns:corpsSortie", "ns:calendrierDePaiement"],
        );
        let echeances = match calendar {
            Some(calendar) if !calendar.children("ns:listeEcheances").is_empty() => {
                calendar.children("ns:listeEcheances")
            }
            _ => {
                tracing::warn!("No payment schedules");
                return Ok(());
            }
        };

        let schedules: Vec<PaymentSchedule> = echeances
            .iter()
            .map(|echeance| {
                // Single-energy accounts carry only one of the two amounts.
                let amount_gas = text(echeance, &["ns:montantGaz"])
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0);
                let amount_electricity = text(echeance, &["ns:montantElec"])
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0);

                PaymentSchedule {
                    number: text(echeance, &["ns:numeroEcheance"])
                        .and_then(|v| v.parse::<i64>().ok()),
                    receipt_date: text(echeance, &["ns:dateEncaissement"]),
                    schedule_date: text(echeance, &["ns:DateEcheance"]),
                    paid: text(echeance, &["ns:paiement"]).as_deref() == Some("EFFECTUE"),
                    amount: amount_gas + amount_electricity,
                    amount_gas,
                    amount_electricity,
                }
            })
            .collect();

        if entries.payment_terms.is_empty() {
            entries.payment_terms.push(PaymentTerms {
                vendor: VENDOR.to_string(),
                client_id,
                ..Default::default()
            });
        }

        tracing::info!("Fetched {} payment schedules", schedules.len());
        entries.payment_terms[0].payment_schedules = schedules;
        Ok(())
    }
}
