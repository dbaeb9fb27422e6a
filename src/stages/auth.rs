//! Authentication against the gateway. Fatal: nothing downstream works
//! without the session token.

use async_trait::async_trait;

use crate::doc::extract_text;
use crate::errors::ConnectorError;
use crate::models::Entries;
use crate::pipeline::{Scratch, Stage, StageContext};
use crate::xml::Element;

const PATH: &str = "/ws/authentifierUnClientParticulier_rest_V3-0/invoke";

pub struct Authenticate;

#[async_trait]
impl Stage for Authenticate {
    fn name(&self) -> &'static str {
        "Authenticate"
    }

    fn fatal(&self) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &StageContext,
        _entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let body = Element::new("tns:msgRequete")
            .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .attr(
                "xmlns:tns",
                "http://www.edf.fr/commerce/passerelle/pas001/authentifierUnClientParticulier/service/v3",
            )
            .attr(
                "xsi:schemaLocation",
                "http://www.edf.fr/commerce/passerelle/pas001/authentifierUnClientParticulier/service/v3 authentifierUnClientParticulier.xsd",
            )
            .child(Element::new("tns:enteteEntree").child(Element::text("tns:idCanal", 5)))
            .child(
                Element::new("tns:corpsEntree")
                    .child(Element::text("tns:idAppelant", &ctx.credentials.email))
                    .child(Element::text("tns:password", &ctx.credentials.password)),
            );

        let tree = ctx.transport.post(PATH, &body).await?;

        let code = extract_text(&tree, &["tns:msgReponse", "tns:enteteSortie", "ent:codeRetour"]);
        if let Some(code) = code {
            if code != "0000" {
                let label = extract_text(
                    &tree,
                    &["tns:msgReponse", "tns:enteteSortie", "ent:libelleRetour"],
                )
                .unwrap_or("");
                tracing::error!("Authentication returned {}: {}", code, label);
            }
        }

        match extract_text(&tree, &["tns:msgReponse", "tns:corpsSortie", "tns:jeton"]) {
            Some(token) => {
                tracing::info!("Session token fetched");
                scratch.edf_token = Some(token.to_string());
                Ok(())
            }
            None => Err(ConnectorError::business(
                "AUTH",
                "No session token in authentication response",
            )),
        }
    }
}
