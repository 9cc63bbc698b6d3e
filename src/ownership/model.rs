use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::EnumIter;
use uuid::Uuid;

use crate::edgar::parsing::values::normalize_cik;

// Record ids are name-based so re-processing a filing reproduces them.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_58a2_93d4_4b0e_9a57_2c8e_41f0_d3b7);

pub fn stable_id(parts: &[&str]) -> Uuid {
    Uuid::new_v5(&ID_NAMESPACE, parts.join("|").as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Company,
    Person,
    Trust,
    Group,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Company => write!(f, "company"),
            EntityType::Person => write!(f, "person"),
            EntityType::Trust => write!(f, "trust"),
            EntityType::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    /// Leading zeros stripped.
    pub cik: String,
    pub name: String,
    pub entity_type: EntityType,
}

impl Entity {
    pub fn new(raw_cik: &str, name: &str, entity_type: EntityType) -> Option<Self> {
        let cik = normalize_cik(raw_cik)?;
        Some(Self {
            id: Self::id_for_cik(&cik),
            cik,
            name: name.to_string(),
            entity_type,
        })
    }

    pub fn id_for_cik(normalized_cik: &str) -> Uuid {
        stable_id(&["entity", normalized_cik])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street1.is_none()
            && self.street2.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip_code.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub cik: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trading_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Director,
    Officer,
    TenPercentOwner,
    Other,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipType::Director => write!(f, "director"),
            RelationshipType::Officer => write!(f, "officer"),
            RelationshipType::TenPercentOwner => write!(f, "ten_percent_owner"),
            RelationshipType::Other => write!(f, "other"),
        }
    }
}

/// One role in `relationship_details.roles`: director and 10% owner are plain
/// tags, officer and other carry their text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleEntry {
    Tag(String),
    Officer {
        #[serde(rename = "type")]
        kind: String,
        title: String,
    },
    Other {
        #[serde(rename = "type")]
        kind: String,
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDetails {
    pub issuer: EntitySummary,
    pub owner: EntitySummary,
    pub roles: Vec<RoleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    /// Same for every filing by this owner about this issuer.
    pub ownership_id: Uuid,
    pub accession_number: String,
    pub issuer_entity_id: Uuid,
    pub owner_entity_id: Uuid,
    pub filing_date: Option<NaiveDate>,
    pub is_director: bool,
    pub is_officer: bool,
    pub is_ten_percent_owner: bool,
    pub is_other: bool,
    pub officer_title: Option<String>,
    pub other_text: Option<String>,
    pub relationship_type: RelationshipType,
    pub is_group_filing: bool,
    pub relationship_details: RelationshipDetails,
    pub total_shares_owned: Option<Decimal>,
}

impl Relationship {
    /// One row per filing and owner.
    pub fn id_for(accession_number: &str, issuer_cik: &str, owner_cik: &str) -> Uuid {
        stable_id(&["relationship", accession_number, issuer_cik, owner_cik])
    }

    /// Identity of the issuer and owner pair. Position lines are keyed on it
    /// so holdings carry from one filing to the next.
    pub fn ownership_id_for(issuer_cik: &str, owner_cik: &str) -> Uuid {
        stable_id(&["ownership", issuer_cik, owner_cik])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    Equity,
    Option,
    Convertible,
    OtherDerivative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub id: Uuid,
    pub title: String,
    pub issuer_entity_id: Uuid,
    pub security_type: SecurityType,
    pub standard_cusip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeSecurity {
    pub id: Uuid,
    pub security_id: Uuid,
    pub underlying_security_id: Option<Uuid>,
    pub underlying_security_title: String,
    pub conversion_price: Option<Decimal>,
    pub exercise_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquiredDisposed {
    #[serde(rename = "A")]
    Acquired,
    #[serde(rename = "D")]
    Disposed,
}

impl AcquiredDisposed {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(AcquiredDisposed::Acquired),
            "D" => Some(AcquiredDisposed::Disposed),
            _ => None,
        }
    }

    /// Signed share impact of a transaction moving `shares`.
    pub fn signed(&self, shares: Decimal) -> Decimal {
        match self {
            AcquiredDisposed::Acquired => shares,
            AcquiredDisposed::Disposed => -shares,
        }
    }
}

/// Form 4 transaction codes (General Instruction 8).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum TransactionCode {
    OpenMarketPurchase,
    OpenMarketSale,
    VoluntaryReport,
    Grant,
    DispositionToIssuer,
    TaxWithholding,
    Discretionary,
    DerivativeExercise,
    Conversion,
    Expiration,
    ExpirationLong,
    OutOfTheMoneyExercise,
    InTheMoneyExercise,
    Gift,
    SmallAcquisition,
    Inheritance,
    VotingTrust,
    Other,
    EquitySwap,
    TenderOfShares,
    Unknown(String),
}

impl TransactionCode {
    pub fn description(&self) -> &str {
        match self {
            TransactionCode::OpenMarketPurchase => "Open market or private purchase",
            TransactionCode::OpenMarketSale => "Open market or private sale",
            TransactionCode::VoluntaryReport => "Transaction voluntarily reported earlier than required",
            TransactionCode::Grant => "Grant, award or other acquisition",
            TransactionCode::DispositionToIssuer => "Disposition to the issuer",
            TransactionCode::TaxWithholding => "Payment of exercise price or tax liability by delivering securities",
            TransactionCode::Discretionary => "Discretionary transaction",
            TransactionCode::DerivativeExercise => "Exercise or conversion of derivative security",
            TransactionCode::Conversion => "Conversion of derivative security",
            TransactionCode::Expiration => "Expiration of short derivative position",
            TransactionCode::ExpirationLong => "Expiration of long derivative position with value received",
            TransactionCode::OutOfTheMoneyExercise => "Exercise of out-of-the-money derivative security",
            TransactionCode::InTheMoneyExercise => "Exercise of in-the-money or at-the-money derivative security",
            TransactionCode::Gift => "Bona fide gift",
            TransactionCode::SmallAcquisition => "Small acquisition",
            TransactionCode::Inheritance => "Acquisition or disposition by will or laws of descent",
            TransactionCode::VotingTrust => "Deposit into or withdrawal from voting trust",
            TransactionCode::Other => "Other acquisition or disposition",
            TransactionCode::EquitySwap => "Equity swap or similar instrument",
            TransactionCode::TenderOfShares => "Disposition pursuant to a tender of shares",
            TransactionCode::Unknown(_) => "Unrecognized transaction code",
        }
    }
}

impl fmt::Display for TransactionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionCode::OpenMarketPurchase => write!(f, "P"),
            TransactionCode::OpenMarketSale => write!(f, "S"),
            TransactionCode::VoluntaryReport => write!(f, "V"),
            TransactionCode::Grant => write!(f, "A"),
            TransactionCode::DispositionToIssuer => write!(f, "D"),
            TransactionCode::TaxWithholding => write!(f, "F"),
            TransactionCode::Discretionary => write!(f, "I"),
            TransactionCode::DerivativeExercise => write!(f, "M"),
            TransactionCode::Conversion => write!(f, "C"),
            TransactionCode::Expiration => write!(f, "E"),
            TransactionCode::ExpirationLong => write!(f, "H"),
            TransactionCode::OutOfTheMoneyExercise => write!(f, "O"),
            TransactionCode::InTheMoneyExercise => write!(f, "X"),
            TransactionCode::Gift => write!(f, "G"),
            TransactionCode::SmallAcquisition => write!(f, "L"),
            TransactionCode::Inheritance => write!(f, "W"),
            TransactionCode::VotingTrust => write!(f, "Z"),
            TransactionCode::Other => write!(f, "J"),
            TransactionCode::EquitySwap => write!(f, "K"),
            TransactionCode::TenderOfShares => write!(f, "U"),
            TransactionCode::Unknown(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for TransactionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err("empty transaction code".to_string());
        }
        Ok(match code.as_str() {
            "P" => TransactionCode::OpenMarketPurchase,
            "S" => TransactionCode::OpenMarketSale,
            "V" => TransactionCode::VoluntaryReport,
            "A" => TransactionCode::Grant,
            "D" => TransactionCode::DispositionToIssuer,
            "F" => TransactionCode::TaxWithholding,
            "I" => TransactionCode::Discretionary,
            "M" => TransactionCode::DerivativeExercise,
            "C" => TransactionCode::Conversion,
            "E" => TransactionCode::Expiration,
            "H" => TransactionCode::ExpirationLong,
            "O" => TransactionCode::OutOfTheMoneyExercise,
            "X" => TransactionCode::InTheMoneyExercise,
            "G" => TransactionCode::Gift,
            "L" => TransactionCode::SmallAcquisition,
            "W" => TransactionCode::Inheritance,
            "Z" => TransactionCode::VotingTrust,
            "J" => TransactionCode::Other,
            "K" => TransactionCode::EquitySwap,
            "U" => TransactionCode::TenderOfShares,
            _ => TransactionCode::Unknown(code),
        })
    }
}

impl TryFrom<String> for TransactionCode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        TransactionCode::from_str(&s)
    }
}

impl From<TransactionCode> for String {
    fn from(value: TransactionCode) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    NonDerivative,
    Derivative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub accession_number: String,
    pub relationship_id: Uuid,
    pub ownership_id: Uuid,
    pub security_id: Uuid,
    pub kind: TransactionKind,
    pub derivative_security_id: Option<Uuid>,
    pub transaction_code: Option<TransactionCode>,
    pub transaction_form_type: Option<String>,
    pub equity_swap_involved: bool,
    pub transaction_date: Option<NaiveDate>,
    pub deemed_execution_date: Option<NaiveDate>,
    pub transaction_timeliness: Option<String>,
    pub shares_amount: Decimal,
    pub price_per_share: Option<Decimal>,
    pub price_per_derivative: Option<Decimal>,
    pub underlying_shares_amount: Option<Decimal>,
    pub acquisition_disposition_flag: Option<AcquiredDisposed>,
    pub shares_owned_following: Option<Decimal>,
    pub direct_ownership: bool,
    pub ownership_nature_explanation: Option<String>,
    pub footnote_ids: Vec<String>,
    pub is_position_only: bool,
}

impl Transaction {
    /// Signed change in shares, `None` for position-only rows.
    pub fn share_impact(&self) -> Option<Decimal> {
        if self.is_position_only {
            return None;
        }
        self.acquisition_disposition_flag
            .map(|flag| flag.signed(self.shares_amount))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Relationship row of the filing whose transaction produced it.
    pub relationship_id: Uuid,
    pub ownership_id: Uuid,
    pub security_id: Uuid,
    pub derivative_security_id: Option<Uuid>,
    pub position_date: NaiveDate,
    pub shares_amount: Decimal,
    pub direct_ownership: bool,
    pub is_position_only: bool,
    pub transaction_id: Option<Uuid>,
    pub filing_id: String,
    /// Ledger write counter. A stored snapshot is only replaced by one with
    /// an equal or higher revision.
    #[serde(default)]
    pub revision: u64,
}

impl PositionSnapshot {
    /// Whether `other` records the same position: the same transaction, or
    /// the same declared holding on the same line and date.
    pub fn same_slot(&self, other: &PositionSnapshot) -> bool {
        match (self.transaction_id, other.transaction_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => {
                self.is_position_only
                    && other.is_position_only
                    && self.ownership_id == other.ownership_id
                    && self.security_id == other.security_id
                    && self.derivative_security_id == other.derivative_security_id
                    && self.direct_ownership == other.direct_ownership
                    && self.position_date == other.position_date
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footnote {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub date: Option<NaiveDate>,
}

/// Document-level facts from the ownership XML that are not tied to a
/// single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipSummary {
    pub schema_version: Option<String>,
    pub document_type: Option<String>,
    pub period_of_report: Option<NaiveDate>,
    pub not_subject_to_section16: Option<bool>,
    pub aff10b5_one: Option<bool>,
    pub remarks: Option<String>,
    pub signatures: Vec<Signature>,
    pub footnotes: Vec<Footnote>,
}
