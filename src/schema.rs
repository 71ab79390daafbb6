use crate::error::{RevenueLedgerError, Result};
use crate::fiscal::{FiscalYearClassifier, DEFAULT_FISCAL_SEED_YEAR};
use crate::AccrualStatus;
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[schemars(description = "Billed every month: MRR is recognized in each month from the anchor month onward.")]
    Monthly,

    #[schemars(description = "Billed once a year: MRR is recognized in the anchor month of each year.")]
    Annual,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Monthly => write!(f, "monthly"),
            Cadence::Annual => write!(f, "annual"),
        }
    }
}

/// How much of an institution a record covers. `Full` outranks `Partial`
/// when the same entity appears twice in one accounting month.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    #[schemars(description = "Paid deployment covering part of the institution.")]
    Partial,

    #[schemars(description = "Paid deployment covering the whole institution.")]
    Full,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStatus::Partial => write!(f, "partial"),
            DeploymentStatus::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Contract,
    Opportunity,
}

impl RecordKind {
    pub fn sheet_name(&self) -> &'static str {
        match self {
            RecordKind::Contract => "contracts",
            RecordKind::Opportunity => "opportunities",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Contract => write!(f, "contract"),
            RecordKind::Opportunity => write!(f, "opportunity"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(default)]
pub struct ContractColumns {
    #[schemars(description = "Column holding the institution id shared with opportunities.")]
    pub entity_id: String,
    pub entity_name: String,
    #[schemars(description = "Column holding the CRM owner id, mapped through `owners`.")]
    pub owner: String,
    #[schemars(description = "Column holding the number of enrolled seats.")]
    pub quantity: String,
    #[schemars(description = "Column holding the unit price per seat.")]
    pub rate: String,
    pub cadence: String,
    #[schemars(description = "Column holding the contract start date (YYYY-MM-DD).")]
    pub anchor_date: String,
    #[schemars(description = "Column holding the deployment status, mapped through `deployment_statuses`.")]
    pub status: String,
}

impl Default for ContractColumns {
    fn default() -> Self {
        Self {
            entity_id: "kyoikukikanmei__c".to_string(),
            entity_name: "Name".to_string(),
            owner: "OwnerId".to_string(),
            quantity: "donyuseitosu__c".to_string(),
            rate: "tanka__c".to_string(),
            cadence: "keiyakukeitai__c".to_string(),
            anchor_date: "keiyakukaisibi__c".to_string(),
            status: "status__c".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(default)]
pub struct OpportunityColumns {
    pub entity_id: String,
    pub entity_name: String,
    pub owner: String,
    #[schemars(description = "Column holding the planned number of seats.")]
    pub quantity: String,
    #[schemars(description = "Column holding the expected unit price.")]
    pub rate: String,
    pub cadence: String,
    #[schemars(description = "Column holding the expected close date (YYYY-MM-DD).")]
    pub anchor_date: String,
    #[schemars(description = "Column holding the record type id, mapped through `deployment_statuses`.")]
    pub status: String,
    #[schemars(description = "Column holding the win probability in percent (0-100).")]
    pub probability: String,
}

impl Default for OpportunityColumns {
    fn default() -> Self {
        Self {
            entity_id: "AccountId".to_string(),
            entity_name: "Name".to_string(),
            owner: "OwnerId".to_string(),
            quantity: "dounyuyoteisu__c".to_string(),
            rate: "souteitanka__c".to_string(),
            cadence: "keiyakukeitai__c".to_string(),
            anchor_date: "CloseDate".to_string(),
            status: "RecordTypeId".to_string(),
            probability: "kakudo__c".to_string(),
        }
    }
}

/// Text written for each status in the rendered ledgers and summaries.
/// Internal values never change; only the output wording does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(default)]
pub struct DisplayLabels {
    pub confirmed: String,
    pub unconfirmed: String,
    pub forecast: String,
    pub partial: String,
    pub full: String,
}

impl Default for DisplayLabels {
    fn default() -> Self {
        Self {
            confirmed: AccrualStatus::Confirmed.to_string(),
            unconfirmed: AccrualStatus::Unconfirmed.to_string(),
            forecast: AccrualStatus::Forecast.to_string(),
            partial: DeploymentStatus::Partial.to_string(),
            full: DeploymentStatus::Full.to_string(),
        }
    }
}

impl DisplayLabels {
    pub fn accrual(&self, status: AccrualStatus) -> &str {
        match status {
            AccrualStatus::Confirmed => &self.confirmed,
            AccrualStatus::Unconfirmed => &self.unconfirmed,
            AccrualStatus::Forecast => &self.forecast,
        }
    }

    pub fn deployment(&self, status: DeploymentStatus) -> &str {
        match status {
            DeploymentStatus::Partial => &self.partial,
            DeploymentStatus::Full => &self.full,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportConfig {
    #[schemars(description = "CRM owner id to the display name shown in the report. Unmapped ids fail the run.")]
    pub owners: BTreeMap<String, String>,

    #[schemars(
        description = "Raw deployment status value (contract status label or opportunity record type id) to its deployment status. Unmapped values fail the run."
    )]
    pub deployment_statuses: BTreeMap<String, DeploymentStatus>,

    #[serde(default = "default_cadences")]
    #[schemars(description = "Raw cadence label to billing cadence. Defaults accept 'monthly' and 'annual'.")]
    pub cadences: BTreeMap<String, Cadence>,

    #[serde(default)]
    pub contract_columns: ContractColumns,

    #[serde(default)]
    pub opportunity_columns: OpportunityColumns,

    #[serde(default = "default_window_floor")]
    #[schemars(description = "Oldest accounting month ever recognized (first day of a month).")]
    pub window_floor: NaiveDate,

    #[serde(default = "default_fiscal_seed_year")]
    #[schemars(description = "Earliest fiscal year the classifier knows about.")]
    pub fiscal_seed_year: i32,

    #[serde(default = "default_total_marker")]
    #[schemars(description = "Owner value used for the per-fiscal-year total row. Must not collide with an owner name.")]
    pub total_marker: String,

    #[serde(default = "default_destination_prefix")]
    #[schemars(description = "Prefix of each fiscal year's summary destination, e.g. 'MRR-' gives 'MRR-2023'.")]
    pub destination_prefix: String,

    #[serde(default)]
    #[schemars(description = "Wording of the status values and status columns in the written output.")]
    pub labels: DisplayLabels,
}

fn default_cadences() -> BTreeMap<String, Cadence> {
    BTreeMap::from([
        ("monthly".to_string(), Cadence::Monthly),
        ("annual".to_string(), Cadence::Annual),
    ])
}

fn default_window_floor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 4, 1).unwrap_or_default()
}

fn default_fiscal_seed_year() -> i32 {
    DEFAULT_FISCAL_SEED_YEAR
}

fn default_total_marker() -> String {
    "TOTAL".to_string()
}

fn default_destination_prefix() -> String {
    "MRR-".to_string()
}

impl ReportConfig {
    pub fn new(
        owners: BTreeMap<String, String>,
        deployment_statuses: BTreeMap<String, DeploymentStatus>,
    ) -> Self {
        Self {
            owners,
            deployment_statuses,
            cadences: default_cadences(),
            contract_columns: ContractColumns::default(),
            opportunity_columns: OpportunityColumns::default(),
            window_floor: default_window_floor(),
            fiscal_seed_year: default_fiscal_seed_year(),
            total_marker: default_total_marker(),
            destination_prefix: default_destination_prefix(),
            labels: DisplayLabels::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ReportConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn classifier(&self) -> FiscalYearClassifier {
        FiscalYearClassifier::new(self.fiscal_seed_year)
    }

    pub fn destination_name(&self, fiscal_year: i32) -> String {
        format!("{}{}", self.destination_prefix, fiscal_year)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_floor.day() != 1 {
            return Err(RevenueLedgerError::InvalidConfig(format!(
                "window_floor {} must be the first day of a month",
                self.window_floor
            )));
        }

        let seed_start = FiscalYearClassifier::fiscal_year_start(self.fiscal_seed_year)
            .ok_or_else(|| {
                RevenueLedgerError::InvalidConfig(format!(
                    "fiscal_seed_year {} is out of range",
                    self.fiscal_seed_year
                ))
            })?;
        if self.window_floor < seed_start {
            return Err(RevenueLedgerError::InvalidConfig(format!(
                "window_floor {} precedes fiscal year {} (starting {})",
                self.window_floor, self.fiscal_seed_year, seed_start
            )));
        }

        if self.total_marker.trim().is_empty() {
            return Err(RevenueLedgerError::InvalidConfig(
                "total_marker must not be empty".to_string(),
            ));
        }
        if self.owners.values().any(|name| name == &self.total_marker) {
            return Err(RevenueLedgerError::InvalidConfig(format!(
                "total_marker '{}' collides with an owner display name",
                self.total_marker
            )));
        }

        let status_labels: BTreeSet<&str> = AccrualStatus::ALL
            .iter()
            .map(|status| self.labels.accrual(*status))
            .collect();
        if status_labels.len() != AccrualStatus::ALL.len()
            || status_labels.iter().any(|label| label.trim().is_empty())
        {
            return Err(RevenueLedgerError::InvalidConfig(
                "status labels must be non-empty and distinct".to_string(),
            ));
        }

        if self.cadences.is_empty() {
            return Err(RevenueLedgerError::InvalidConfig(
                "cadences must map at least one label".to_string(),
            ));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
