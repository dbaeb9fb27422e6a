//! Canonical records produced by the pipeline and handed to the store.
//!
//! Field names serialize camelCase to match the stored document shape;
//! natural keys are vendor-assigned identifiers (`clientId`, `number`,
//! `pdl`, ...). Most upstream values arrive as free-form strings and are
//! kept that way; only quantities the pipeline computes with are numeric.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VENDOR: &str = "EDF";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    // Upstream spells it "formated"; kept for document compatibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formated: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formated: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommercialContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// Account holder. Exactly one per pipeline run; `clients[0]` is the
/// implicit current client every later stage reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub vendor: String,
    pub client_id: String,
    pub numero_acc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<PersonName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co_holder: Option<PersonName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commercial_contact: Option<CommercialContact>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comptage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre_roues: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dernier_index: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub counter_type: Option<String>,
}

/// Meter-reading schedule block of a contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeterStatement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prochaine_releve: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saisie_releve_confiance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_fermeture_releve_confiance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prochaine_date_ouverture_releve_confiance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prochaine_date_fermeture_releve_confiance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prochaine_date_fermeture_reelle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saisie_suivi_conso: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prochaine_date_ouverture_saisie_conso: Option<String>,
}

/// One energy supply agreement. Natural key (`number`, `vendor`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub vendor: String,
    pub client_id: String,
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_grounds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub troubleshooting_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_subcategory1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_subcategory2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<Counter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_consumption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_hours: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<MeterStatement>,
    /// Subscribed services, merged in from up to three independent stages.
    /// Only ever appended to, never replaced.
    pub services: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastPayment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_date: Option<String>,
    pub paid: bool,
    pub amount: f64,
    pub amount_gas: f64,
    pub amount_electricity: f64,
}

/// Billing/payment configuration. At most one per run; natural key
/// (`vendor`, `clientId`). Two stages may each create it if absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    pub vendor: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_bank_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_means: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modif_bank_details_allowed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dernier_reglement: Option<LastPayment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_bill_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_payer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer_divergent: Option<String>,
    pub payment_schedules: Vec<PaymentSchedule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimilarHomes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub least: Option<f64>,
}

/// One energy-usage observation over an interval. Natural key
/// (`contractNumber`, `statementType`, `statementReason`,
/// `statementCategory`, `start`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionStatement {
    pub contract_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub costs_by_category: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_by_category: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_homes: Option<SimilarHomes>,
    /// Raw index readings attached by the index-enrichment stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statements: Option<Vec<Value>>,
}

/// Household profile, one per delivery point. Natural key `pdl`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Home {
    pub pdl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_profile_validated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub housing_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residence_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub construction_date: Option<String>,
    #[serde(rename = "isBBC", skip_serializing_if = "Option::is_none")]
    pub is_bbc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupants_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_heating_system_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitory_hot_water_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageBreakdown {
    pub usage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

/// Per-contract, per-energy-type cost breakdown by usage category.
/// Natural key (`contractNumber`, `vendor`, `energyType`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnergyBreakdown {
    pub vendor: String,
    pub client_id: String,
    pub contract_number: String,
    pub energy_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    pub usage_breakdowns: Vec<UsageBreakdown>,
}

/// One invoice document. Not upserted by key: bills go through the
/// filter-existing / download-file / persist path instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub vendor: String,
    pub client_id: String,
    pub number: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_payment_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_payment_due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_before_invoice: Option<String>,
    /// Remote document endpoint, replaced by the stored file path once
    /// the PDF has been saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdfurl: Option<String>,
}

/// The accumulator: canonical entity lists grown across stages and handed
/// wholesale to the upsert dispatcher at the end of the run.
#[derive(Debug, Default)]
pub struct Entries {
    pub clients: Vec<Client>,
    pub contracts: Vec<Contract>,
    pub payment_terms: Vec<PaymentTerms>,
    pub consumption_statements: Vec<ConsumptionStatement>,
    pub homes: Vec<Home>,
    pub energy_breakdowns: Vec<EnergyBreakdown>,
    /// Bills fetched from the gateway, pending the existing-bill filter.
    pub fetched: Vec<Bill>,
    /// Bills that passed the filter and still need download + persist.
    pub filtered: Vec<Bill>,
}
