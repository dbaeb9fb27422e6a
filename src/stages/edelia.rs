//! Edelia consumption-insight stages, run as a sub-pipeline once per
//! contract. A failure inside the sub-run costs that contract's insight
//! data only; the next contract starts from a clean per-contract state.
//!
//! Availability is signalled in-band: 403 on the profile means the
//! account has no Edelia capability at all, 404/500 on a consumption
//! endpoint means no data for that energy type.

use async_trait::async_trait;
use chrono::{Months, Utc};
use serde_json::{json, Value};

use crate::errors::ConnectorError;
use crate::models::{
    ConsumptionStatement, Contract, EnergyBreakdown, Entries, Home, SimilarHomes, UsageBreakdown,
    VENDOR,
};
use crate::pipeline::{run_sub_pipeline, Scratch, Stage, StageContext};

/// Outer stage: drives the per-contract sub-pipeline.
pub struct EdeliaData {
    sub_stages: Vec<Box<dyn Stage>>,
}

impl EdeliaData {
    pub fn new() -> Self {
        Self {
            sub_stages: vec![
                Box::new(FetchEdeliaToken),
                Box::new(EdeliaProfile),
                Box::new(EdeliaMonthlyElec),
                Box::new(EdeliaElecComparisons),
                Box::new(EdeliaElecIndexes),
                Box::new(EdeliaMonthlyGas),
                Box::new(EdeliaGasComparisons),
                Box::new(EdeliaGasIndexes),
                Box::new(EdeliaUsageBreakdown),
            ],
        }
    }
}

impl Default for EdeliaData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for EdeliaData {
    fn name(&self) -> &'static str {
        "EdeliaData"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let contracts = entries.contracts.clone();
        for contract in contracts {
            if contract.pdl.is_none() {
                tracing::info!(
                    "Contract {} has no delivery point, skipping Edelia",
                    contract.number
                );
                continue;
            }

            let number = contract.number.clone();
            scratch.begin_contract(contract);
            if let Err(err) = run_sub_pipeline(&self.sub_stages, ctx, entries, scratch).await {
                tracing::warn!("Edelia data for contract {} incomplete: {}", number, err);
            }
        }
        scratch.contract = None;
        Ok(())
    }
}

fn current_contract(scratch: &Scratch) -> Result<&Contract, ConnectorError> {
    scratch
        .contract
        .as_ref()
        .ok_or_else(|| ConnectorError::Parse("No contract in sub-pipeline state".to_string()))
}

fn edelia_token(scratch: &Scratch) -> Result<String, ConnectorError> {
    scratch
        .edelia_token
        .clone()
        .ok_or_else(|| ConnectorError::Parse("No Edelia token in sub-pipeline state".to_string()))
}

/// String view of a JSON value; numbers are rendered, anything else is
/// treated as absent. Edelia mixes string and numeric keys freely.
fn jstr(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn month_after_next_month() -> String {
    (Utc::now().date_naive() + Months::new(1))
        .format("%Y-%m")
        .to_string()
}

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

pub struct FetchEdeliaToken;

#[async_trait]
impl Stage for FetchEdeliaToken {
    fn name(&self) -> &'static str {
        "FetchEdeliaToken"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        _entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let sso_token = scratch.edf_token.clone().ok_or_else(|| {
            ConnectorError::Parse("No session token in pipeline state".to_string())
        })?;
        let contract = current_contract(scratch)?;
        let pdl = contract.pdl.clone().ok_or_else(|| {
            ConnectorError::Parse("Contract without delivery point in sub-pipeline".to_string())
        })?;

        let token = ctx
            .edelia
            .token(&sso_token, &contract.client_id, &pdl)
            .await?;
        tracing::info!("Edelia token fetched");
        scratch.edelia_token = Some(token);
        Ok(())
    }
}

pub struct EdeliaProfile;

#[async_trait]
impl Stage for EdeliaProfile {
    fn name(&self) -> &'static str {
        "EdeliaProfile"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        let token = edelia_token(scratch)?;
        let pdl = current_contract(scratch)?.pdl.clone().unwrap_or_default();

        let path = format!("/sites/-/profiles/simple?ts={}", Utc::now().to_rfc3339());
        let payload = ctx.edelia.get(&token, &path).await?;

        if payload.body.is_null() {
            return Err(ConnectorError::Parse(
                "Empty Edelia profile response".to_string(),
            ));
        }

        if jstr(payload.body.get("errorCode")).as_deref() == Some("403") {
            scratch.no_edelia = true;
            let description = jstr(payload.body.get("errorDescription")).unwrap_or_default();
            tracing::warn!("No Edelia for this account: {}", description);
            return Err(ConnectorError::business("EDELIA_403", description));
        }

        let obj = &payload.body;
        entries.homes.push(Home {
            pdl,
            begin_ts: jstr(obj.get("beginTs")),
            is_profile_validated: obj.get("isProfileValidated").and_then(|v| v.as_bool()),
            housing_type: jstr(obj.get("housingType")),
            residence_type: jstr(obj.get("residenceType")),
            occupation_type: jstr(obj.get("occupationType")),
            construction_date: jstr(obj.get("constructionDate")),
            is_bbc: obj.get("isBBC").and_then(|v| v.as_bool()),
            surface: obj.get("surfaceInSqMeter").and_then(|v| v.as_f64()),
            occupants_count: obj.get("noOfOccupants").and_then(|v| v.as_i64()),
            principal_heating_system_type: jstr(obj.get("principalHeatingSystemType")),
            sanitory_hot_water_type: jstr(obj.get("sanitoryHotWaterType")),
        });

        tracing::info!("Fetched Edelia profile");
        Ok(())
    }
}

/// Shared shaping for monthly/yearly energy documents: the tariff-heading
/// cost map gets the standing charge folded in under "standing".
fn elec_costs_by_category(energy: &Value) -> Value {
    let mut costs = energy
        .pointer("/consumption/costsByTariffHeading")
        .cloned()
        .unwrap_or_else(|| json!({}));
    if let (Value::Object(map), Some(standing)) = (&mut costs, energy.get("standingCharge")) {
        map.insert("standing".to_string(), standing.clone());
    }
    costs
}

fn gas_costs_by_category(energy: &Value) -> Value {
    json!({
        "consumption": energy.pointer("/consumption/cost"),
        "standing": energy.get("standingCharge"),
    })
}

fn energy_statement(
    contract_number: &str,
    reason: &str,
    period: Option<String>,
    energy: &Value,
    costs_by_category: Value,
    values_by_category: Option<Value>,
) -> ConsumptionStatement {
    ConsumptionStatement {
        contract_number: contract_number.to_string(),
        start: jstr(energy.get("beginDay")),
        end: jstr(energy.get("endDay")),
        value: energy.pointer("/consumption/energy").and_then(|v| v.as_f64()),
        statement_type: Some("estime".to_string()),
        statement_category: Some("edelia".to_string()),
        statement_reason: Some(reason.to_string()),
        period,
        cost: energy.get("totalCost").and_then(|v| v.as_f64()),
        costs_by_category: Some(costs_by_category),
        values_by_category,
        ..Default::default()
    }
}

pub struct EdeliaMonthlyElec;

#[async_trait]
impl Stage for EdeliaMonthlyElec {
    fn name(&self) -> &'static str {
        "EdeliaMonthlyElec"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        if scratch.no_edelia {
            return Ok(());
        }

        let token = edelia_token(scratch)?;
        let contract_number = current_contract(scratch)?.number.clone();

        let path = format!(
            "/sites/-/monthly-elec-consumptions?begin-month=2012-01&end-month={}&ended=false",
            month_after_next_month()
        );
        let payload = ctx.edelia.get(&token, &path).await?;

        if payload.status == 404 || payload.status == 500 {
            tracing::warn!("No monthly electricity consumptions");
            scratch.no_elec = true;
            return Ok(());
        }

        scratch.statement_by_month.clear();
        scratch.statement_by_year.clear();

        let monthly = payload
            .body
            .get("monthlyElecEnergies")
            .and_then(|v| v.as_array());
        for mee in monthly.into_iter().flatten() {
            let period = jstr(mee.get("month"));
            let doc = energy_statement(
                &contract_number,
                "EdeliaMonthlyElecConsumption",
                period.clone(),
                mee,
                elec_costs_by_category(mee),
                mee.pointer("/consumption/energiesByTariffHeading").cloned(),
            );
            if let Some(month) = period {
                scratch
                    .statement_by_month
                    .insert(month, entries.consumption_statements.len());
            }
            entries.consumption_statements.push(doc);
        }

        let yearly = payload
            .body
            .get("yearlyElecEnergies")
            .and_then(|v| v.as_array());
        for yee in yearly.into_iter().flatten() {
            let period = jstr(yee.get("year"));
            let doc = energy_statement(
                &contract_number,
                "EdeliaYearlyElecConsumption",
                period.clone(),
                yee,
                elec_costs_by_category(yee),
                yee.pointer("/consumption/energiesByTariffHeading").cloned(),
            );
            if let Some(year) = period {
                scratch
                    .statement_by_year
                    .insert(year, entries.consumption_statements.len());
            }
            entries.consumption_statements.push(doc);
        }

        tracing::info!("Fetched monthly electricity consumptions");
        Ok(())
    }
}

pub struct EdeliaElecComparisons;

#[async_trait]
impl Stage for EdeliaElecComparisons {
    fn name(&self) -> &'static str {
        "EdeliaElecComparisons"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        if scratch.no_edelia || scratch.no_elec {
            return Ok(());
        }

        let token = edelia_token(scratch)?;
        let payload = ctx
            .edelia
            .get(&token, "/sites/-/similar-home-yearly-elec-comparisons?begin-year=2012")
            .await?;

        if payload.status == 404 || payload.status == 500 {
            tracing::warn!("No similar-home electricity comparisons");
            scratch.no_elec = true;
            scratch.statement_by_year.clear();
            return Ok(());
        }

        attach_comparisons(entries, scratch, &payload.body);
        scratch.statement_by_year.clear();
        tracing::info!("Fetched similar-home electricity comparisons");
        Ok(())
    }
}

/// Attaches similar-home figures to the yearly statements built by the
/// preceding monthly stage, via the year index map.
fn attach_comparisons(entries: &mut Entries, scratch: &Scratch, body: &Value) {
    for obj in body.as_array().into_iter().flatten() {
        let Some(year) = jstr(obj.get("year")) else {
            continue;
        };
        let Some(&idx) = scratch.statement_by_year.get(&year) else {
            tracing::warn!("No yearly statement for {}", year);
            continue;
        };
        if let Some(statement) = entries.consumption_statements.get_mut(idx) {
            statement.similar_homes = Some(SimilarHomes {
                site: obj.pointer("/energies/site").and_then(|v| v.as_f64()),
                average: obj
                    .pointer("/energies/similarHomes/SH_AVERAGE_CONSUMING")
                    .and_then(|v| v.as_f64()),
                least: obj
                    .pointer("/energies/similarHomes/SH_LEAST_CONSUMING")
                    .and_then(|v| v.as_f64()),
            });
        }
    }
}

pub struct EdeliaElecIndexes;

#[async_trait]
impl Stage for EdeliaElecIndexes {
    fn name(&self) -> &'static str {
        "EdeliaElecIndexes"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        if scratch.no_edelia || scratch.no_elec {
            return Ok(());
        }

        let token = edelia_token(scratch)?;
        let path = format!(
            "/sites/-/elec-indexes?begin-date=2012-01-01&end-date={}&types=",
            today()
        );
        let payload = ctx.edelia.get(&token, &path).await?;

        if payload.status == 404 {
            tracing::warn!("No electricity indexes");
            scratch.statement_by_month.clear();
            return Ok(());
        }

        attach_indexes(entries, scratch, &payload.body);
        scratch.statement_by_month.clear();
        tracing::info!("Fetched electricity indexes");
        Ok(())
    }
}

/// Attaches raw index readings to the monthly statements built by the
/// preceding monthly stage, via the month index map.
fn attach_indexes(entries: &mut Entries, scratch: &Scratch, body: &Value) {
    for obj in body.as_array().into_iter().flatten() {
        let Some(month) = jstr(obj.get("date")).and_then(|d| d.get(..7).map(str::to_string))
        else {
            continue;
        };
        let Some(&idx) = scratch.statement_by_month.get(&month) else {
            tracing::warn!("No monthly statement for {}", month);
            continue;
        };
        if let Some(statement) = entries.consumption_statements.get_mut(idx) {
            statement
                .statements
                .get_or_insert_with(Vec::new)
                .push(obj.clone());
        }
    }
}

pub struct EdeliaMonthlyGas;

#[async_trait]
impl Stage for EdeliaMonthlyGas {
    fn name(&self) -> &'static str {
        "EdeliaMonthlyGas"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        if scratch.no_edelia {
            return Ok(());
        }

        let token = edelia_token(scratch)?;
        let contract_number = current_contract(scratch)?.number.clone();

        let path = format!(
            "/sites/-/monthly-gas-consumptions?begin-month=2012-01&end-month={}&ended=false",
            month_after_next_month()
        );
        let payload = ctx.edelia.get(&token, &path).await?;

        if payload.status == 404 {
            tracing::warn!("No monthly gas consumptions");
            scratch.no_gas = true;
            return Ok(());
        }

        scratch.statement_by_month.clear();
        scratch.statement_by_year.clear();

        let monthly = payload
            .body
            .get("monthlyGasEnergies")
            .and_then(|v| v.as_array());
        for mee in monthly.into_iter().flatten() {
            let period = jstr(mee.get("month"));
            let doc = energy_statement(
                &contract_number,
                "EdeliaMonthlyGasConsumption",
                period.clone(),
                mee,
                gas_costs_by_category(mee),
                None,
            );
            if let Some(month) = period {
                scratch
                    .statement_by_month
                    .insert(month, entries.consumption_statements.len());
            }
            entries.consumption_statements.push(doc);
        }

        let yearly = payload
            .body
            .get("yearlyGasEnergies")
            .and_then(|v| v.as_array());
        for yee in yearly.into_iter().flatten() {
            let period = jstr(yee.get("year"));
            let doc = energy_statement(
                &contract_number,
                "EdeliaYearlyGasConsumption",
                period.clone(),
                yee,
                gas_costs_by_category(yee),
                None,
            );
            if let Some(year) = period {
                scratch
                    .statement_by_year
                    .insert(year, entries.consumption_statements.len());
            }
            entries.consumption_statements.push(doc);
        }

        tracing::info!("Fetched monthly gas consumptions");
        Ok(())
    }
}

pub struct EdeliaGasComparisons;

#[async_trait]
impl Stage for EdeliaGasComparisons {
    fn name(&self) -> &'static str {
        "EdeliaGasComparisons"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        if scratch.no_edelia || scratch.no_gas {
            return Ok(());
        }

        let token = edelia_token(scratch)?;
        let payload = ctx
            .edelia
            .get(&token, "/sites/-/similar-home-yearly-gas-comparisons?begin-year=2012")
            .await?;

        if payload.status == 404 || payload.status == 500 {
            tracing::warn!("No similar-home gas comparisons");
            scratch.statement_by_year.clear();
            return Ok(());
        }

        attach_comparisons(entries, scratch, &payload.body);
        scratch.statement_by_year.clear();
        tracing::info!("Fetched similar-home gas comparisons");
        Ok(())
    }
}

pub struct EdeliaGasIndexes;

#[async_trait]
impl Stage for EdeliaGasIndexes {
    fn name(&self) -> &'static str {
        "EdeliaGasIndexes"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        if scratch.no_edelia || scratch.no_gas {
            return Ok(());
        }

        let token = edelia_token(scratch)?;
        let path = format!(
            "/sites/-/gas-indexes?begin-date=2012-01-01&end-date={}&types=",
            today()
        );
        let payload = ctx.edelia.get(&token, &path).await?;

        if payload.status == 404 {
            tracing::warn!("No gas indexes");
            scratch.statement_by_month.clear();
            return Ok(());
        }

        attach_indexes(entries, scratch, &payload.body);
        scratch.statement_by_month.clear();
        tracing::info!("Fetched gas indexes");
        Ok(())
    }
}

pub struct EdeliaUsageBreakdown;

#[async_trait]
impl Stage for EdeliaUsageBreakdown {
    fn name(&self) -> &'static str {
        "EdeliaUsageBreakdown"
    }

    async fn run(
        &self,
        ctx: &StageContext,
        entries: &mut Entries,
        scratch: &mut Scratch,
    ) -> Result<(), ConnectorError> {
        if scratch.no_edelia {
            return Ok(());
        }

        let contract = current_contract(scratch)?;
        let Some(energy_type) = contract.energy_type.clone() else {
            tracing::info!(
                "Contract {} has no energy type, skipping usage breakdown",
                contract.number
            );
            return Ok(());
        };
        let contract_number = contract.number.clone();
        let client_id = contract.client_id.clone();

        let token = edelia_token(scratch)?;
        let path = format!("/sites/-/usage-breakdowns?ts={}", Utc::now().to_rfc3339());
        let payload = ctx.edelia.get(&token, &path).await?;

        if payload.status == 404 || payload.status == 500 {
            tracing::warn!("No usage breakdown");
            return Ok(());
        }

        let obj = &payload.body;
        let usage_breakdowns: Vec<UsageBreakdown> = obj
            .get("usageBreakdowns")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|item| {
                Some(UsageBreakdown {
                    usage: jstr(item.get("usage"))?,
                    cost: item.get("cost").and_then(|v| v.as_f64()),
                    percent: item.get("percent").and_then(|v| v.as_f64()),
                })
            })
            .collect();

        if usage_breakdowns.is_empty() {
            tracing::info!("Usage breakdown empty for contract {}", contract_number);
            return Ok(());
        }

        entries.energy_breakdowns.push(EnergyBreakdown {
            vendor: VENDOR.to_string(),
            client_id,
            contract_number,
            energy_type,
            begin_month: jstr(obj.get("beginMonth")),
            end_month: jstr(obj.get("endMonth")),
            total_cost: obj.get("totalCost").and_then(|v| v.as_f64()),
            usage_breakdowns,
        });

        tracing::info!("Fetched usage breakdown");
        Ok(())
    }
}
