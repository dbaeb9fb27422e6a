//! Partner profile: contact details merged into the account holder.
//! Non-fatal, the client record is simply left thinner on failure.

use async_trait::async_trait;

use super::{current_client, session_token, text};
use crate::doc::extract;
use crate::errors::ConnectorError;
use crate::models::{Address, CommercialContact, Entries};
use crate::pipeline::{Scratch, Stage, StageContext};
use crate::xml::Element;

const PATH: &str = "/ws/visualiserPartenaire_rest_V2-0/invoke";

pub struct PartnerProfile;

#[async_trait]
impl Stage for PartnerProfile {
    fn name(&self) -> &'static str {
        "PartnerProfile"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let token = session_token(scratch)?;
        let client_id = current_client(entries)?.client_id.clone();

        let body = Element::new("msgRequete")
            .attr(
                "xmlns",
                "http://www.edf.fr/commerce/passerelle/css/visualiserPartenaire/service/v2",
            )
            .attr(
                "xmlns:ent",
                "http://www.edf.fr/commerce/passerelle/commun/v2/entete",
            )
            .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .child(Element::new("enteteEntree").child(Element::text("ent:jeton", &token)))
            .child(Element::new("corpsEntree").child(Element::text("numeroBp", &client_id)));

        let tree = ctx.transport.post(PATH, &body).await?;

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

        let partner = extract(&tree, &["ns:msgReponse", "ns:corpsSortie", "ns:partenaire"])
            .ok_or_else(|| {
                ConnectorError::Parse("No partner block in profile response".to_string())
            })?;

        let cell_phone = text(partner, &["ns:coordonnees", "ns:NumTelMobile"]);
        let home_phone = text(partner, &["ns:coordonnees", "ns:NumTelFixe"]);
        let email = text(partner, &["ns:coordonnees", "ns:Email"]);
        let login_email = text(partner, &["ns:coordonnees", "ns:EmailAEL"]);

        let contact = extract(partner, &["ns:centreContact"]).map(|contact_elem| {
            let address = extract(contact_elem, &["ns:adresse"]).map(|addr| {
                let street = text(addr, &["ns:nomRue"]);
                let postcode = text(addr, &["ns:codePostal"]);
                let city = text(addr, &["ns:ville"]);
                let formated = Some(format!(
                    "{}\n{} {}",
                    street.as_deref().unwrap_or_default(),
                    postcode.as_deref().unwrap_or_default(),
                    city.as_deref().unwrap_or_default()
                ));
                Address {
                    street,
                    city,
                    postcode,
                    country: None,
                    formated,
                }
            });
            CommercialContact {
                title: text(contact_elem, &["ns:gsr"]),
                phone: text(contact_elem, &["ns:telephone"]),
                address,
            }
        });

        // Merge: only non-empty values overwrite what the contract listing
        // already produced.
        let client = entries
            .clients
            .first_mut()
            .ok_or_else(|| ConnectorError::Parse("No client in pipeline state".to_string()))?;
        if cell_phone.is_some() {
            client.cell_phone = cell_phone;
        }
        if home_phone.is_some() {
            client.home_phone = home_phone;
        }
        if email.is_some() {
            client.email = email;
        }
        if login_email.is_some() {
            client.login_email = login_email;
        }
        if contact.is_some() {
            client.commercial_contact = contact;
        }

        tracing::info!("Fetched partner profile");
        Ok(())
    }
}
