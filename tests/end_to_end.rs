/// Integration tests with mocked gateway and Edelia servers. Exercises
/// the XML exchange, response shaping, dictionary translation, bill
/// filtering and the PDF download path without hitting real services.
use std::sync::Arc;

use chrono::NaiveDate;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edf_connector::edelia::HttpEdeliaApi;
use edf_connector::filestore::LocalFileStore;
use edf_connector::models::{Bill, Client, Contract, Entries, VENDOR};
use edf_connector::pipeline::{run_pipeline, Credentials, Scratch, Stage, StageContext};
use edf_connector::stages::auth::Authenticate;
use edf_connector::stages::contracts::ListContracts;
use edf_connector::stages::edelia::EdeliaData;
use edf_connector::stages::payment::{CommercialTerms, FetchPaymentSchedule};
use edf_connector::store::{MemoryStore, Store};
use edf_connector::transport::HttpTransport;
use edf_connector::upsert::{FilterExistingBills, SaveBills};

fn temp_bills_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "edf-connector-e2e-{}-{}-{}",
        tag,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ))
}

fn context(gateway: &MockServer, edelia: &MockServer, bills_dir: &std::path::Path) -> StageContext {
    StageContext {
        credentials: Credentials {
            email: "jean@example.com".to_string(),
            password: "secret".to_string(),
        },
        transport: Arc::new(HttpTransport::without_backoff(gateway.uri()).unwrap()),
        edelia: Arc::new(HttpEdeliaApi::new(edelia.uri()).unwrap()),
        store: Arc::new(MemoryStore::new()),
        files: Arc::new(LocalFileStore::new(bills_dir)),
    }
}

fn test_client() -> Client {
    Client {
        vendor: VENDOR.to_string(),
        client_id: "BP123".to_string(),
        numero_acc: "ACC1".to_string(),
        ..Default::default()
    }
}

const AUTH_RESPONSE: &str = "<tns:msgReponse>\
    <tns:enteteSortie><ent:codeRetour>0000</ent:codeRetour></tns:enteteSortie>\
    <tns:corpsSortie><tns:jeton>TOKEN123</tns:jeton></tns:corpsSortie>\
    </tns:msgReponse>";

const CONTRACTS_RESPONSE: &str = "<tns:msgReponse>\
    <tns:EnteteSortie><tns:CodeErreur>PSC0000</tns:CodeErreur></tns:EnteteSortie>\
    <tns:CorpsSortie><tns:AccordCo>\
    <tns:Numero>ACC1</tns:Numero>\
    <tns:BP>\
    <tns:Numero>BP123</tns:Numero>\
    <tns:Identite><tns:Civilite>M</tns:Civilite><tns:Nom>Martin</tns:Nom><tns:Prenom>Jean</tns:Prenom></tns:Identite>\
    <tns:Coordonnees><tns:Email>jean@example.com</tns:Email><tns:NumTelMobile>0600000000</tns:NumTelMobile></tns:Coordonnees>\
    </tns:BP>\
    <tns:Adresse><tns:NumRue>12</tns:NumRue><tns:NomRue>rue de la Paix</tns:NomRue><tns:CodePostal>75002</tns:CodePostal><tns:Ville>Paris</tns:Ville></tns:Adresse>\
    <tns:Contrat>\
    <tns:Numero>K1</tns:Numero>\
    <tns:NumeroPDL>PDL1</tns:NumeroPDL>\
    <tns:VieDuContrat><tns:DateDebut>2015-01-01</tns:DateDebut><tns:Statut>EN COURS</tns:Statut></tns:VieDuContrat>\
    <tns:OffreSouscrite><tns:Energie>ELECTRICITE</tns:Energie><tns:NomOffre>TARIF_BLEU_PART</tns:NomOffre><tns:Puissance>PUI06</tns:Puissance><tns:StructureTarifaire>HC</tns:StructureTarifaire></tns:OffreSouscrite>\
    <tns:ServicesSouscrits><tns:NomService>Releve Confiance</tns:NomService><tns:Etat>ACTIF</tns:Etat></tns:ServicesSouscrits>\
    </tns:Contrat>\
    </tns:AccordCo></tns:CorpsSortie>\
    </tns:msgReponse>";

#[tokio::test]
async fn authenticate_then_list_contracts() {
    let gateway = MockServer::start().await;
    let edelia = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ws/authentifierUnClientParticulier_rest_V3-0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AUTH_RESPONSE))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/ws/listerContratClientParticulier_rest_V3-0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CONTRACTS_RESPONSE))
        .mount(&gateway)
        .await;

    let dir = temp_bills_dir("contracts");
    let ctx = context(&gateway, &edelia, &dir);
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(Authenticate), Box::new(ListContracts)];
    let mut entries = Entries::default();
    let mut scratch = Scratch::default();

    run_pipeline(&stages, &ctx, &mut entries, &mut scratch)
        .await
        .unwrap();

    assert_eq!(scratch.edf_token.as_deref(), Some("TOKEN123"));

    let client = &entries.clients[0];
    assert_eq!(client.client_id, "BP123");
    assert_eq!(client.numero_acc, "ACC1");
    assert_eq!(client.email.as_deref(), Some("jean@example.com"));
    assert_eq!(
        client.name.as_ref().unwrap().formated.as_deref(),
        Some("Jean Martin")
    );
    assert_eq!(
        client.address.as_ref().unwrap().postcode.as_deref(),
        Some("75002")
    );

    let contract = &entries.contracts[0];
    assert_eq!(contract.number, "K1");
    assert_eq!(contract.pdl.as_deref(), Some("PDL1"));
    assert_eq!(contract.energy_type.as_deref(), Some("Électricité"));
    assert_eq!(contract.name.as_deref(), Some("Tarif Bleu"));
    assert_eq!(contract.power.as_deref(), Some("6 kVA"));
    assert_eq!(contract.contract_subcategory1.as_deref(), Some("HC"));
    assert_eq!(contract.services.len(), 1);
    assert_eq!(contract.services[0]["nom"], "Releve Confiance");
}

#[tokio::test]
async fn subscribed_services_concatenate_across_stages() {
    let gateway = MockServer::start().await;
    let edelia = MockServer::start().await;

    // One contract-level service and one account-level service in the
    // listing, then one more from the commercial agreement.
    let contracts_response = "<tns:msgReponse>\
        <tns:EnteteSortie><tns:CodeErreur>PSC0000</tns:CodeErreur></tns:EnteteSortie>\
        <tns:CorpsSortie><tns:AccordCo>\
        <tns:Numero>ACC1</tns:Numero>\
        <tns:BP><tns:Numero>BP123</tns:Numero></tns:BP>\
        <tns:Contrat>\
        <tns:Numero>K1</tns:Numero>\
        <tns:ServicesSouscrits><tns:NomService>Releve Confiance</tns:NomService><tns:Etat>ACTIF</tns:Etat></tns:ServicesSouscrits>\
        </tns:Contrat>\
        <tns:ServicesSouscrits><tns:nomService>e.quilibre</tns:nomService><tns:dateSouscription>2015-06-01</tns:dateSouscription><tns:statut>ACTIF</tns:statut></tns:ServicesSouscrits>\
        </tns:AccordCo></tns:CorpsSortie>\
        </tns:msgReponse>";
    let terms_response = "<tns:visualiserAccordCommercialResponse>\
        <tns:responseWebService>\
        <tns:CodeEtatService>PSC0000</tns:CodeEtatService>\
        <tns:listeAccordsCommerciaux><tns:item>\
        <tns:services><tns:item>\
        <tns:nomService>Option Mobile</tns:nomService><tns:etat>ACTIF</tns:etat>\
        </tns:item></tns:services>\
        </tns:item></tns:listeAccordsCommerciaux>\
        </tns:responseWebService>\
        </tns:visualiserAccordCommercialResponse>";

    Mock::given(method("POST"))
        .and(path("/ws/listerContratClientParticulier_rest_V3-0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(contracts_response))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/ws/visualiserAccordCommercial_rest_sso_V3-0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(terms_response))
        .mount(&gateway)
        .await;

    let dir = temp_bills_dir("services");
    let ctx = context(&gateway, &edelia, &dir);
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(ListContracts), Box::new(CommercialTerms)];
    let mut entries = Entries::default();
    let mut scratch = Scratch::default();
    scratch.edf_token = Some("TOKEN123".to_string());

    run_pipeline(&stages, &ctx, &mut entries, &mut scratch)
        .await
        .unwrap();

    // Each producer appends; nothing merges or reorders.
    let services = &entries.contracts[0].services;
    assert_eq!(services.len(), 3);
    assert_eq!(services[0]["nom"], "Releve Confiance");
    assert_eq!(services[1]["nom"], "e.quilibre");
    assert_eq!(services[1]["start"], "2015-06-01");
    assert_eq!(services[2]["name"], "Option Mobile");
    assert_eq!(services[2]["status"], "ACTIF");
}

#[tokio::test]
async fn missing_session_token_is_fatal() {
    let gateway = MockServer::start().await;
    let edelia = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ws/authentifierUnClientParticulier_rest_V3-0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<tns:msgReponse><tns:enteteSortie>\
             <ent:codeRetour>9999</ent:codeRetour>\
             <ent:libelleRetour>mot de passe errone</ent:libelleRetour>\
             </tns:enteteSortie></tns:msgReponse>",
        ))
        .mount(&gateway)
        .await;

    let dir = temp_bills_dir("auth-fail");
    let ctx = context(&gateway, &edelia, &dir);
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(Authenticate), Box::new(ListContracts)];
    let mut entries = Entries::default();

    let result = run_pipeline(&stages, &ctx, &mut entries, &mut Scratch::default()).await;

    assert!(result.is_err());
    assert!(entries.clients.is_empty());
}

#[tokio::test]
async fn payment_schedule_single_energy_amounts() {
    let gateway = MockServer::start().await;
    let edelia = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ws/visualiserCalendrierPaiement_rest_V2-0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ns:msgReponse>\
             <ns:enteteSortie><ent:codeRetour>0</ent:codeRetour></ns:enteteSortie>\
             <ns:corpsSortie><ns:calendrierDePaiement>\
             <ns:listeEcheances>\
             <ns:numeroEcheance>1</ns:numeroEcheance>\
             <ns:DateEcheance>2016-04-01</ns:DateEcheance>\
             <ns:paiement>EFFECTUE</ns:paiement>\
             <ns:montantElec>12.50</ns:montantElec>\
             </ns:listeEcheances>\
             <ns:listeEcheances>\
             <ns:numeroEcheance>2</ns:numeroEcheance>\
             <ns:DateEcheance>2016-05-01</ns:DateEcheance>\
             <ns:paiement>A VENIR</ns:paiement>\
             <ns:montantElec>13.00</ns:montantElec>\
             <ns:montantGaz>7.25</ns:montantGaz>\
             </ns:listeEcheances>\
             </ns:calendrierDePaiement></ns:corpsSortie>\
             </ns:msgReponse>",
        ))
        .mount(&gateway)
        .await;

    let dir = temp_bills_dir("schedule");
    let ctx = context(&gateway, &edelia, &dir);
    let mut entries = Entries::default();
    entries.clients.push(test_client());
    let mut scratch = Scratch::default();
    scratch.edf_token = Some("TOKEN123".to_string());

    FetchPaymentSchedule
        .run(&ctx, &mut entries, &mut scratch)
        .await
        .unwrap();

    // The schedule stage creates the payment terms record when the
    // commercial terms stage did not.
    assert_eq!(entries.payment_terms.len(), 1);
    let schedules = &entries.payment_terms[0].payment_schedules;
    assert_eq!(schedules.len(), 2);

    assert_eq!(schedules[0].number, Some(1));
    assert!(schedules[0].paid);
    assert_eq!(schedules[0].amount_electricity, 12.5);
    assert_eq!(schedules[0].amount_gas, 0.0);
    assert_eq!(schedules[0].amount, 12.5);

    assert!(!schedules[1].paid);
    assert_eq!(schedules[1].amount, 20.25);
}

#[tokio::test]
async fn edelia_unavailable_account_yields_no_home() {
    let gateway = MockServer::start().await;
    let edelia = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authorization-server/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "edelia-token"})),
        )
        .mount(&edelia)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorization-proxy/api/v1/sites/-/profiles/simple"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errorCode": "403",
            "errorDescription": "customer not eligible"
        })))
        .mount(&edelia)
        .await;

    let dir = temp_bills_dir("no-edelia");
    let ctx = context(&gateway, &edelia, &dir);
    let mut entries = Entries::default();
    entries.contracts.push(Contract {
        vendor: VENDOR.to_string(),
        client_id: "BP123".to_string(),
        number: "K1".to_string(),
        pdl: Some("PDL1".to_string()),
        energy_type: Some("Électricité".to_string()),
        ..Default::default()
    });
    let mut scratch = Scratch::default();
    scratch.edf_token = Some("TOKEN123".to_string());

    let result = EdeliaData::new().run(&ctx, &mut entries, &mut scratch).await;

    // Not-available is absorbed per contract, never escalated.
    assert!(result.is_ok());
    assert!(entries.homes.is_empty());
    assert!(entries.consumption_statements.is_empty());
}

fn test_bill(number: &str) -> Bill {
    Bill {
        vendor: VENDOR.to_string(),
        client_id: "BP123".to_string(),
        number: number.to_string(),
        date: NaiveDate::from_ymd_opt(2016, 3, 1).unwrap(),
        title: Some("Facture".to_string()),
        payment_due_date: None,
        scheduled_payment_date: None,
        total_payment_due: Some("42.00".to_string()),
        value: Some("42.00".to_string()),
        balance_before_invoice: None,
        pdfurl: None,
    }
}

#[tokio::test]
async fn existing_bills_are_filtered_by_number() {
    let gateway = MockServer::start().await;
    let edelia = MockServer::start().await;

    let dir = temp_bills_dir("filter");
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "bill",
        serde_json::json!({"vendor": "EDF", "number": "F001"}),
    );
    store.insert(
        "bill",
        serde_json::json!({"vendor": "OTHER", "number": "F002"}),
    );

    let mut ctx = context(&gateway, &edelia, &dir);
    ctx.store = store;

    let mut entries = Entries::default();
    entries.fetched = vec![test_bill("F001"), test_bill("F002")];

    FilterExistingBills
        .run(&ctx, &mut entries, &mut Scratch::default())
        .await
        .unwrap();

    // F001 is already stored for this vendor; F002 only exists for
    // another vendor and stays.
    assert_eq!(entries.filtered.len(), 1);
    assert_eq!(entries.filtered[0].number, "F002");
    assert!(entries.fetched.is_empty());
}

#[tokio::test]
async fn save_bills_downloads_pdf_and_persists() {
    let gateway = MockServer::start().await;
    let edelia = MockServer::start().await;

    // "JVBERi0xLjQ=" is "%PDF-1.4" in base64.
    Mock::given(method("POST"))
        .and(path("/ws/recupererDocumentContractuelGet_rest_V1-0/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<rdc:getResponse><getResponse><docubase><documentPDF>\
             <pdf>JVBERi0xLjQ=</pdf>\
             </documentPDF></docubase></getResponse></rdc:getResponse>",
        ))
        .mount(&gateway)
        .await;

    let dir = temp_bills_dir("save");
    let ctx = context(&gateway, &edelia, &dir);
    let store = Arc::clone(&ctx.store);

    let mut entries = Entries::default();
    entries.filtered = vec![test_bill("F042")];
    let mut scratch = Scratch::default();
    scratch.edf_token = Some("TOKEN123".to_string());

    SaveBills
        .run(&ctx, &mut entries, &mut scratch)
        .await
        .unwrap();

    let saved = dir.join("EDF_032016_F042.pdf");
    assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"%PDF-1.4");

    assert_eq!(
        entries.filtered[0].pdfurl.as_deref(),
        Some(saved.to_string_lossy().as_ref())
    );
    assert_eq!(scratch.created.get("bill"), Some(&1));

    // The stored document carries the local file path, not the remote
    // endpoint.
    let docs = store.find_existing("bill", VENDOR).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["number"], "F042");
    assert_eq!(docs[0]["pdfurl"], saved.to_string_lossy().as_ref());

    tokio::fs::remove_dir_all(&dir).await.ok();
}
