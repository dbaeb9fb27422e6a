//! Contract listing: builds the account holder and the contract list
//! everything else hangs off. Fatal: without a client id and contract
//! numbers the remaining stages have nothing to query.

use async_trait::async_trait;
use serde_json::json;

use super::{session_token, text};
use crate::dictionaries::{translate, ENERGY, OFFERS, POWERS};
use crate::doc::{extract, Node};
use crate::errors::ConnectorError;
use crate::models::{
    Address, Client, Contract, Counter, Entries, MeterStatement, PersonName, VENDOR,
};
use crate::pipeline::{Scratch, Stage, StageContext};
use crate::xml::Element;

const PATH: &str = "/ws/listerContratClientParticulier_rest_V3-0/invoke";

pub struct ListContracts;

#[async_trait]
impl Stage for ListContracts {
    fn name(&self) -> &'static str {
        "ListContracts"
    }

    fn fatal(&self) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let token = session_token(scratch)?;

        let body = Element::new("tns:msgRequete")
            .attr(
                "xmlns:tns",
                "http://www.edf.fr/commerce/passerelle/pas072/listerContratClientParticulier/service/v3",
            )
            .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .attr(
                "xsi:schemaLocation",
                "http://www.edf.fr/commerce/passerelle/pas072/listerContratClientParticulier/service/v3 listerContratClientParticulier_rest_V3-0.xsd ",
            )
            .child(Element::new("tns:EnteteEntree").child(Element::text("tns:Jeton", &token)))
            .child(
                Element::new("tns:CorpsEntree").child(Element::text("tns:SynchroniserSI", true)),
            );

        let tree = ctx.transport.post(PATH, &body).await?;

        let code = text(&tree, &["tns:msgReponse", "tns:EnteteSortie", "tns:CodeErreur"]);
        if let Some(code) = code {
            if code != "PSC0000" {
                let label = text(
                    &tree,
                    &["tns:msgReponse", "tns:EnteteSortie", "tns:LibelleErreur"],
                )
                .unwrap_or_default();
                return Err(ConnectorError::business(code, label));
            }
        }

        let agreement = extract(&tree, &["tns:msgReponse", "tns:CorpsSortie", "tns:AccordCo"])
            .ok_or_else(|| {
                ConnectorError::Parse("No commercial agreement in contract listing".to_string())
            })?;

        let client = build_client(agreement)?;
        let contracts = build_contracts(agreement, &client.client_id);

        tracing::info!("Fetched {} contracts", contracts.len());
        entries.clients.push(client);
        entries.contracts = contracts;
        Ok(())
    }
}

fn build_client(agreement: &Node) -> Result<Client, ConnectorError> {
    let numero_acc = text(agreement, &["tns:Numero"]).ok_or_else(|| {
        ConnectorError::Parse("No account number in contract listing".to_string())
    })?;

    let bp = extract(agreement, &["tns:BP"])
        .ok_or_else(|| ConnectorError::Parse("No partner block in contract listing".to_string()))?;
    let client_id = text(bp, &["tns:Numero"]).ok_or_else(|| {
        ConnectorError::Parse("No client id in contract listing".to_string())
    })?;

    let address = extract(agreement, &["tns:Adresse"]).map(|addr| {
        let num_rue = text(addr, &["tns:NumRue"]).unwrap_or_default();
        let nom_rue = text(addr, &["tns:NomRue"]).unwrap_or_default();
        let code_postal = text(addr, &["tns:CodePostal"]).unwrap_or_default();
        let ville = text(addr, &["tns:Ville"]).unwrap_or_default();

        Address {
            street: Some(format!("{} {}", num_rue, nom_rue)),
            city: Some(ville.clone()),
            postcode: Some(code_postal.clone()),
            country: Some("FRANCE".to_string()),
            formated: Some(format!("{} {}\n{} {}", num_rue, nom_rue, code_postal, ville)),
        }
    });

    let civilite = text(bp, &["tns:Identite", "tns:Civilite"]).unwrap_or_default();
    let nom = text(bp, &["tns:Identite", "tns:Nom"]).unwrap_or_default();
    let prenom = text(bp, &["tns:Identite", "tns:Prenom"]).unwrap_or_default();
    let name = PersonName {
        prefix: Some(civilite),
        family: Some(nom.clone()),
        given: Some(prenom.clone()),
        formated: Some(format!("{} {}", prenom, nom)),
    };

    let co_holder = extract(bp, &["tns:IdentitePart"]).map(|part| {
        let family = text(part, &["tns:NomCoTitulaire"]);
        let given = text(part, &["tns:PrenomCoTitulaire"]);
        let formated = Some(format!(
            "{} {}",
            given.as_deref().unwrap_or_default(),
            family.as_deref().unwrap_or_default()
        ));
        PersonName {
            prefix: None,
            family,
            given,
            formated,
        }
    });

    Ok(Client {
        vendor: VENDOR.to_string(),
        client_id,
        numero_acc,
        name: Some(name),
        address,
        co_holder,
        email: text(bp, &["tns:Coordonnees", "tns:Email"]),
        login_email: None,
        cell_phone: text(bp, &["tns:Coordonnees", "tns:NumTelMobile"]),
        home_phone: None,
        commercial_contact: None,
    })
}

fn build_contracts(agreement: &Node, client_id: &str) -> Vec<Contract> {
    // Services subscribed at account level apply to every contract.
    let account_services: Vec<serde_json::Value> = agreement
        .children("tns:ServicesSouscrits")
        .iter()
        .map(|service| {
            json!({
                "nom": text(service, &["tns:nomService"]),
                "start": text(service, &["tns:dateSouscription"]),
                "activ": text(service, &["tns:statut"]),
            })
        })
        .collect();

    agreement
        .children("tns:Contrat")
        .iter()
        .filter_map(|elem| {
            let Some(number) = text(elem, &["tns:Numero"]) else {
                tracing::warn!("Contract without number in listing, skipped");
                return None;
            };
            Some(build_contract(elem, client_id, number, &account_services))
        })
        .collect()
}

fn build_contract(
    elem: &Node,
    client_id: &str,
    number: String,
    account_services: &[serde_json::Value],
) -> Contract {
    let mut contract = Contract {
        vendor: VENDOR.to_string(),
        client_id: client_id.to_string(),
        number,
        ..Default::default()
    };

    contract.pdl = text(elem, &["tns:NumeroPDL"]);
    contract.start = text(elem, &["tns:VieDuContrat", "tns:DateDebut"]);
    contract.status = text(elem, &["tns:VieDuContrat", "tns:Statut"]);
    contract.end = text(elem, &["tns:VieDuContrat", "tns:DateFin"]);
    contract.termination_grounds = text(elem, &["tns:VieDuContrat", "tns:MotifResiliation"]);

    contract.energy_type =
        text(elem, &["tns:OffreSouscrite", "tns:Energie"]).map(|code| translate(ENERGY, &code));
    contract.name =
        text(elem, &["tns:OffreSouscrite", "tns:NomOffre"]).map(|code| translate(OFFERS, &code));
    contract.troubleshooting_phone =
        text(elem, &["tns:OffreSouscrite", "tns:NumeroDepannageContrat"]);

    match contract.energy_type.as_deref() {
        Some("Électricité") => {
            contract.power = text(elem, &["tns:OffreSouscrite", "tns:Puissance"])
                .map(|code| translate(POWERS, &code));
            contract.contract_subcategory1 =
                text(elem, &["tns:OffreSouscrite", "tns:StructureTarifaire"]);
        }
        Some("Gaz") => {
            contract.contract_subcategory2 =
                text(elem, &["tns:OffreSouscrite", "tns:OptionPrix"]);
        }
        _ => {}
    }

    if let Some(cadran) = extract(elem, &["tns:ListeCadran"]) {
        contract.counter = Some(Counter {
            comptage: text(cadran, &["tns:Type"]),
            nombre_roues: text(cadran, &["tns:NombreRoues"]),
            dernier_index: text(cadran, &["tns:DernierIndex"]),
            counter_type: text(elem, &["tns:DonneesTechniques", "tns:TypeCompteur"]),
        });
        contract.annual_consumption = text(cadran, &["tns:ConsommationAnnuelle"]);
    }

    contract.peak_hours = text(elem, &["tns:DonneesTechniques", "tns:HorrairesHC"]);

    if let Some(releve) = extract(elem, &["tns:Releve"]) {
        contract.statement = Some(MeterStatement {
            prochaine_releve: text(releve, &["tns:ProchaineDateReleveReelle"]),
            saisie_releve_confiance: text(releve, &["tns:SaisieRC"]),
            date_fermeture_releve_confiance: text(releve, &["tns:DateFermetureRC"]),
            prochaine_date_ouverture_releve_confiance: text(
                releve,
                &["tns:ProchaineDateOuvertureRC"],
            ),
            prochaine_date_fermeture_releve_confiance: text(
                releve,
                &["tns:ProchaineDateFermetureRC"],
            ),
            prochaine_date_fermeture_reelle: text(releve, &["tns:ProchaineDateFermetureReelle"]),
            saisie_suivi_conso: text(releve, &["tns:SaisieSC"]),
            prochaine_date_ouverture_saisie_conso: text(
                releve,
                &["tns:ProchaineDateOuvertureSC"],
            ),
        });
    }

    for service in elem.children("tns:ServicesSouscrits") {
        contract.services.push(json!({
            "nom": text(service, &["tns:NomService"]),
            "activ": text(service, &["tns:Etat"]),
        }));
    }
    contract.services.extend(account_services.iter().cloned());

    contract
}
