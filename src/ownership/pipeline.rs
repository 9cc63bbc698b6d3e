use chrono::{NaiveDate, NaiveDateTime};
use roxmltree::Document;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::entity::{EntityResolver, EntitySource, ResolvedEntities};
use super::ledger::PositionLedger;
use super::model::{
    DerivativeSecurity, Entity, OwnershipSummary, PositionSnapshot, Relationship, Security,
    Transaction,
};
use super::registry::{self, FormParser};
use super::relationship::classify_relationships;
use super::report::{ExtractionReport, SkipReason, Stage};
use super::security::SecurityResolver;
use super::transaction::{extract_summary, OwnerLink, TransactionExtractor};
use super::xml::locate_ownership_xml;
use crate::edgar::parsing::header::{
    parse_header, HeaderFields, KEY_ACCEPTANCE_DATETIME, KEY_ACCESSION_NUMBER, KEY_FILED_AS_OF,
    KEY_PERIOD_OF_REPORT, KEY_SUBMISSION_TYPE,
};
use crate::edgar::parsing::types::Exhibit;
use crate::edgar::parsing::split_submission;
use crate::edgar::parsing::values::{parse_date, parse_datetime};
use crate::edgar::report::ReportType;

/// Caller-supplied facts about a submission. Empty fields are filled from the
/// SGML header when it has them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingContext {
    pub cik: String,
    pub accession_number: String,
    pub form_type: String,
    pub filing_date: Option<NaiveDate>,
}

impl FilingContext {
    pub fn new(cik: &str, accession_number: &str, form_type: &str, filing_date: Option<NaiveDate>) -> Self {
        Self {
            cik: cik.to_string(),
            accession_number: accession_number.to_string(),
            form_type: form_type.to_string(),
            filing_date,
        }
    }

    fn fill_from_header(&mut self, header: &HeaderFields) {
        if self.accession_number.trim().is_empty() {
            if let Some(accession) = header.top_level(KEY_ACCESSION_NUMBER) {
                self.accession_number = accession.to_string();
            }
        }
        if self.form_type.trim().is_empty() {
            if let Some(form_type) = header.top_level(KEY_SUBMISSION_TYPE) {
                self.form_type = form_type.to_string();
            }
        }
        if self.filing_date.is_none() {
            self.filing_date = header.top_level(KEY_FILED_AS_OF).and_then(parse_date);
        }
    }
}

/// Whether relationships came from the ownership XML or only the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Xml,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingMetadata {
    pub accession_number: String,
    pub form_type: ReportType,
    pub is_amendment: bool,
    pub filing_date: Option<NaiveDate>,
    pub period_of_report: Option<NaiveDate>,
    pub acceptance_datetime: Option<NaiveDateTime>,
    pub parser: FormParser,
    pub source: DataSource,
}

/// Everything extracted from one submission, as plain records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingBundle {
    pub metadata: FilingMetadata,
    pub exhibits: Vec<Exhibit>,
    pub issuer: Entity,
    pub owners: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub securities: Vec<Security>,
    pub derivative_securities: Vec<DerivativeSecurity>,
    pub transactions: Vec<Transaction>,
    pub positions: Vec<PositionSnapshot>,
    pub summary: Option<OwnershipSummary>,
    pub report: ExtractionReport,
}

impl FilingBundle {
    pub fn accession_number(&self) -> &str {
        &self.metadata.accession_number
    }

    pub fn primary_exhibit(&self) -> Option<&Exhibit> {
        self.exhibits.iter().find(|e| e.is_primary)
    }

    pub fn relationship(&self, id: Uuid) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.id == id)
    }
}

/// Runs submissions through the extraction stages in order.
///
/// Security rows and the position ledger live here for the length of a
/// batch; owner de-duplication is fresh for every filing.
#[derive(Debug, Default)]
pub struct FilingProcessor {
    securities: SecurityResolver,
    ledger: PositionLedger,
}

impl FilingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: PositionLedger) -> Self {
        Self {
            securities: SecurityResolver::new(),
            ledger,
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PositionLedger {
        &mut self.ledger
    }

    pub fn reset(&mut self) {
        self.securities.reset();
        self.ledger.reset();
    }

    pub fn process(&mut self, raw_text: &str, context: &FilingContext) -> FilingBundle {
        let split = split_submission(raw_text);
        let header = parse_header(raw_text);

        let mut context = context.clone();
        context.fill_from_header(&header);
        let (form_type, is_amendment) = ReportType::parse_form(&context.form_type);

        let mut report = ExtractionReport::new(&context.accession_number);
        if split.documents.is_empty() {
            log::warn!("[{}] no documents found in submission", context.accession_number);
        }

        let xml_text = locate_ownership_xml(raw_text);
        let document = xml_text.and_then(|xml| match Document::parse(xml) {
            Ok(doc) => Some(doc),
            Err(e) => {
                report.skip(
                    Stage::Document,
                    "ownershipDocument",
                    SkipReason::XmlParse(e.to_string()),
                );
                None
            }
        });
        let xml_root = document.as_ref().map(|doc| doc.root_element());

        let parser = registry::select(&form_type, xml_root.is_some());
        log::info!(
            "[{}] processing form {}{} with {} parser",
            context.accession_number,
            form_type,
            if is_amendment { "/A" } else { "" },
            parser
        );

        let mut resolver = EntityResolver::new();
        let mut relationships = Vec::new();
        let mut transactions = Vec::new();
        let mut summary = None;

        let resolved: ResolvedEntities = match parser {
            FormParser::Ownership => {
                let resolved = resolver.resolve(xml_root, &header, &context.cik, &mut report);
                relationships = classify_relationships(
                    &context.accession_number,
                    context.filing_date,
                    &resolved,
                    xml_root,
                );
                if let Some(root) = xml_root {
                    let extractor = TransactionExtractor {
                        accession_number: &context.accession_number,
                        issuer_entity_id: resolved.issuer.id,
                        owner: relationships.first().map(OwnerLink::of),
                    };
                    transactions = extractor.extract(root, &mut self.securities, &mut report);
                    summary = Some(extract_summary(root));
                }
                resolved
            }
            FormParser::ExhibitsOnly => resolver.resolve(None, &header, &context.cik, &mut report),
        };

        let period_of_report = summary
            .as_ref()
            .and_then(|s| s.period_of_report)
            .or_else(|| header.top_level(KEY_PERIOD_OF_REPORT).and_then(parse_date));

        self.apply_to_ledger(&transactions, period_of_report.or(context.filing_date), &mut report);
        let positions = self.ledger.drain_emitted();

        for relationship in relationships.iter_mut() {
            relationship.total_shares_owned = self.ledger.shares_held(relationship.ownership_id, None);
        }

        let (securities, derivative_securities) = self.referenced_securities(&transactions);
        let source = if xml_root.is_some() && resolved.owner_source == Some(EntitySource::Xml) {
            DataSource::Xml
        } else {
            DataSource::Header
        };

        FilingBundle {
            metadata: FilingMetadata {
                accession_number: context.accession_number.clone(),
                form_type,
                is_amendment,
                filing_date: context.filing_date,
                period_of_report,
                acceptance_datetime: header
                    .top_level(KEY_ACCEPTANCE_DATETIME)
                    .and_then(parse_datetime),
                parser,
                source,
            },
            exhibits: split.exhibits(),
            issuer: resolved.issuer,
            owners: resolved.owners.into_iter().map(|o| o.entity).collect(),
            relationships,
            securities,
            derivative_securities,
            transactions,
            positions,
            summary,
            report,
        }
    }

    /// Dated transactions go in date order, then holdings at `position_date`.
    fn apply_to_ledger(
        &mut self,
        transactions: &[Transaction],
        position_date: Option<NaiveDate>,
        report: &mut ExtractionReport,
    ) {
        let mut dated: Vec<&Transaction> = transactions.iter().filter(|t| !t.is_position_only).collect();
        dated.sort_by_key(|t| t.transaction_date);

        for txn in dated {
            if let Err(e) = self.ledger.apply(txn) {
                report.skip(Stage::Ledger, txn.id.to_string(), SkipReason::Ledger(e.to_string()));
            }
        }

        for holding in transactions.iter().filter(|t| t.is_position_only) {
            let outcome = match position_date {
                Some(date) => self
                    .ledger
                    .record_position_only(holding, date)
                    .map(|_| ())
                    .map_err(|e| SkipReason::Ledger(e.to_string())),
                None => Err(SkipReason::MissingField("periodOfReport".to_string())),
            };
            if let Err(reason) = outcome {
                report.skip(Stage::Ledger, holding.id.to_string(), reason);
            }
        }
    }

    fn referenced_securities(
        &self,
        transactions: &[Transaction],
    ) -> (Vec<Security>, Vec<DerivativeSecurity>) {
        let derivative_ids: HashSet<Uuid> = transactions
            .iter()
            .filter_map(|t| t.derivative_security_id)
            .collect();
        let derivatives: Vec<DerivativeSecurity> = self
            .securities
            .derivative_securities()
            .iter()
            .filter(|d| derivative_ids.contains(&d.id))
            .cloned()
            .collect();

        let mut security_ids: HashSet<Uuid> = transactions.iter().map(|t| t.security_id).collect();
        for derivative in &derivatives {
            security_ids.insert(derivative.security_id);
            security_ids.extend(derivative.underlying_security_id);
        }
        let securities = self
            .securities
            .securities()
            .iter()
            .filter(|s| security_ids.contains(&s.id))
            .cloned()
            .collect();

        (securities, derivatives)
    }
}

/// Extracts one submission with fresh state.
pub fn extract(raw_text: &str, context: &FilingContext) -> FilingBundle {
    FilingProcessor::new().process(raw_text, context)
}
