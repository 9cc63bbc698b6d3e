use roxmltree::Node;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::model::{Address, Entity, EntitySummary, EntityType};
use super::report::{ExtractionReport, SkipReason, Stage};
use super::xml::{child, children, value_at};
use crate::edgar::parsing::header::{
    HeaderBlock, HeaderFields, BLOCK_ISSUER, BLOCK_REPORTING_OWNER, KEY_CIK, KEY_CONFORMED_NAME,
};
use crate::edgar::parsing::values::normalize_cik;

// Name tokens that mark a business entity rather than a natural person.
const COMPANY_TOKENS: &[&str] = &[
    "inc", "incorporated", "corp", "corporation", "co", "company", "llc", "lp", "llp", "lllp",
    "ltd", "limited", "plc", "trust", "fund", "funds", "partners", "partnership", "holdings",
    "holding", "capital", "group", "management", "advisors", "advisers", "investments",
    "ventures", "bank", "foundation", "associates", "sa", "ag", "nv", "gmbh",
];

/// Where the issuer and owners were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    Xml,
    Header,
    CikScan,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOwner {
    pub entity: Entity,
    pub summary: EntitySummary,
    /// Position of the owner's `<reportingOwner>` element, when read from XML.
    pub xml_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntities {
    pub issuer: Entity,
    pub issuer_summary: EntitySummary,
    pub issuer_source: EntitySource,
    pub owners: Vec<ResolvedOwner>,
    pub owner_source: Option<EntitySource>,
}

/// Classifies a name as company or person from business-entity tokens.
pub fn classify_entity_type(name: &str) -> EntityType {
    let lowered = name.to_lowercase().replace('.', "");
    let is_company = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| COMPANY_TOKENS.contains(&token));
    if is_company {
        EntityType::Company
    } else {
        EntityType::Person
    }
}

/// Builds issuer and owner entities for one filing.
///
/// Holds the per-filing set of owner CIKs already admitted; use a fresh
/// resolver (or [`EntityResolver::reset`]) for every filing.
#[derive(Debug, Default)]
pub struct EntityResolver {
    seen_ciks: HashSet<String>,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.seen_ciks.clear();
    }

    pub fn resolve(
        &mut self,
        xml_root: Option<Node>,
        header: &HeaderFields,
        caller_cik: &str,
        report: &mut ExtractionReport,
    ) -> ResolvedEntities {
        let (issuer, issuer_summary, issuer_source) = xml_root
            .and_then(issuer_from_xml)
            .map(|(e, s)| (e, s, EntitySource::Xml))
            .or_else(|| issuer_from_header(header).map(|(e, s)| (e, s, EntitySource::Header)))
            .or_else(|| issuer_from_scan(header, caller_cik).map(|(e, s)| (e, s, EntitySource::CikScan)))
            .unwrap_or_else(|| {
                let (e, s) = placeholder_issuer(caller_cik);
                log::warn!("No issuer found, using placeholder {}", e.name);
                (e, s, EntitySource::Placeholder)
            });

        let mut owners = Vec::new();
        let mut owner_source = None;

        if let Some(root) = xml_root {
            owners = self.owners_from_xml(root, report);
            if !owners.is_empty() {
                owner_source = Some(EntitySource::Xml);
            }
        }
        if owners.is_empty() {
            owners = self.owners_from_header(header, report);
            if !owners.is_empty() {
                owner_source = Some(EntitySource::Header);
            }
        }
        if owners.is_empty() {
            owners = self.owners_from_scan(header, &issuer.cik, report);
            if !owners.is_empty() {
                owner_source = Some(EntitySource::CikScan);
            }
        }

        log::debug!(
            "Resolved issuer {} ({:?}) and {} owner(s)",
            issuer.cik,
            issuer_source,
            owners.len()
        );

        ResolvedEntities {
            issuer,
            issuer_summary,
            issuer_source,
            owners,
            owner_source,
        }
    }

    /// Admits an owner CIK once per filing; repeats are dropped quietly.
    fn admit(&mut self, raw_cik: &str, report: &mut ExtractionReport) -> Option<String> {
        let cik = normalize_cik(raw_cik)?;
        if self.seen_ciks.insert(cik.clone()) {
            Some(cik)
        } else {
            log::debug!("Dropping duplicate owner CIK {}", cik);
            report.duplicates_dropped += 1;
            None
        }
    }

    fn owners_from_xml(&mut self, root: Node, report: &mut ExtractionReport) -> Vec<ResolvedOwner> {
        let mut owners = Vec::new();
        for (idx, owner_node) in children(root, "reportingOwner").enumerate() {
            let locator = format!("reportingOwner[{}]", idx);
            let Some(raw_cik) = value_at(owner_node, &["reportingOwnerId", "rptOwnerCik"]) else {
                report.skip(
                    Stage::Entities,
                    locator,
                    SkipReason::MissingField("rptOwnerCik".to_string()),
                );
                continue;
            };
            let Some(cik) = self.admit(&raw_cik, report) else {
                continue;
            };

            let name = value_at(owner_node, &["reportingOwnerId", "rptOwnerName"])
                .unwrap_or_else(|| format!("Unknown Owner ({})", cik));
            let entity_type = classify_entity_type(&name);
            let address = owner_address(owner_node);

            if let Some(entity) = Entity::new(&cik, &name, entity_type) {
                report.accepted += 1;
                owners.push(ResolvedOwner {
                    summary: EntitySummary {
                        cik: raw_cik,
                        name,
                        trading_symbol: None,
                        address,
                    },
                    entity,
                    xml_index: Some(idx),
                });
            }
        }
        owners
    }

    fn owners_from_header(
        &mut self,
        header: &HeaderFields,
        report: &mut ExtractionReport,
    ) -> Vec<ResolvedOwner> {
        let mut owners = Vec::new();
        for block in header.blocks(BLOCK_REPORTING_OWNER) {
            let Some(raw_cik) = block.get(KEY_CIK) else {
                report.skip(
                    Stage::Entities,
                    format!("REPORTING-OWNER[{}]", block.index),
                    SkipReason::MissingField(KEY_CIK.to_string()),
                );
                continue;
            };
            if let Some(owner) = self.owner_from_block(&block, raw_cik, report) {
                owners.push(owner);
            }
        }
        owners
    }

    /// Every CIK in the header other than the issuer's becomes an owner.
    fn owners_from_scan(
        &mut self,
        header: &HeaderFields,
        issuer_cik: &str,
        report: &mut ExtractionReport,
    ) -> Vec<ResolvedOwner> {
        let mut owners = Vec::new();
        let candidates = header.fields.iter().filter(|f| {
            f.key == KEY_CIK && normalize_cik(&f.value).as_deref() != Some(issuer_cik)
        });
        for field in candidates {
            let Some(cik) = self.admit(&field.value, report) else {
                continue;
            };
            let name = sibling_name(header, field.block.as_deref(), field.block_index)
                .unwrap_or_else(|| format!("Unknown Owner ({})", cik));
            if let Some(entity) = Entity::new(&cik, &name, classify_entity_type(&name)) {
                report.accepted += 1;
                owners.push(ResolvedOwner {
                    summary: summary(&field.value, &name),
                    entity,
                    xml_index: None,
                });
            }
        }
        owners
    }

    fn owner_from_block(
        &mut self,
        block: &HeaderBlock,
        raw_cik: &str,
        report: &mut ExtractionReport,
    ) -> Option<ResolvedOwner> {
        let cik = self.admit(raw_cik, report)?;
        let name = block
            .get(KEY_CONFORMED_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown Owner ({})", cik));
        let entity = Entity::new(&cik, &name, classify_entity_type(&name))?;
        report.accepted += 1;
        Some(ResolvedOwner {
            summary: summary(raw_cik, &name),
            entity,
            xml_index: None,
        })
    }
}

fn summary(raw_cik: &str, name: &str) -> EntitySummary {
    EntitySummary {
        cik: raw_cik.to_string(),
        name: name.to_string(),
        trading_symbol: None,
        address: None,
    }
}

fn issuer_from_xml(root: Node) -> Option<(Entity, EntitySummary)> {
    let issuer = child(root, "issuer")?;
    let raw_cik = value_at(issuer, &["issuerCik"])?;
    let cik = normalize_cik(&raw_cik)?;
    let name = value_at(issuer, &["issuerName"]).unwrap_or_else(|| format!("Unknown Issuer ({})", cik));
    let entity = Entity::new(&raw_cik, &name, EntityType::Company)?;
    Some((
        entity,
        EntitySummary {
            cik: raw_cik,
            name,
            trading_symbol: value_at(issuer, &["issuerTradingSymbol"]),
            address: None,
        },
    ))
}

fn issuer_from_header(header: &HeaderFields) -> Option<(Entity, EntitySummary)> {
    header.blocks(BLOCK_ISSUER).into_iter().find_map(|block| {
        let raw_cik = block.get(KEY_CIK)?;
        let cik = normalize_cik(raw_cik)?;
        let name = block
            .get(KEY_CONFORMED_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown Issuer ({})", cik));
        let entity = Entity::new(raw_cik, &name, EntityType::Company)?;
        Some((entity, summary(raw_cik, &name)))
    })
}

/// Last resort: the caller's CIK, if the header mentions it anywhere.
fn issuer_from_scan(header: &HeaderFields, caller_cik: &str) -> Option<(Entity, EntitySummary)> {
    let wanted = normalize_cik(caller_cik)?;
    let field = header
        .fields
        .iter()
        .filter(|f| f.key == KEY_CIK)
        .find(|f| normalize_cik(&f.value).as_deref() == Some(wanted.as_str()))?;
    let name = sibling_name(header, field.block.as_deref(), field.block_index)
        .unwrap_or_else(|| format!("Unknown Issuer ({})", wanted));
    let entity = Entity::new(&field.value, &name, EntityType::Company)?;
    Some((entity, summary(&field.value, &name)))
}

fn placeholder_issuer(caller_cik: &str) -> (Entity, EntitySummary) {
    let cik = normalize_cik(caller_cik).unwrap_or_else(|| "0".to_string());
    let name = format!("Unknown Issuer ({})", cik);
    let entity = Entity {
        id: Entity::id_for_cik(&cik),
        cik: cik.clone(),
        name: name.clone(),
        entity_type: EntityType::Company,
    };
    (entity, summary(caller_cik, &name))
}

fn sibling_name(header: &HeaderFields, block: Option<&str>, block_index: usize) -> Option<String> {
    block?;
    header
        .fields
        .iter()
        .find(|f| {
            f.block.as_deref() == block && f.block_index == block_index && f.key == KEY_CONFORMED_NAME
        })
        .map(|f| f.value.clone())
}

fn owner_address(owner: Node) -> Option<Address> {
    let address_node = child(owner, "reportingOwnerAddress")?;
    let address = Address {
        street1: value_at(address_node, &["rptOwnerStreet1"]),
        street2: value_at(address_node, &["rptOwnerStreet2"]),
        city: value_at(address_node, &["rptOwnerCity"]),
        state: value_at(address_node, &["rptOwnerState"]),
        zip_code: value_at(address_node, &["rptOwnerZipCode"]),
    };
    if address.is_empty() {
        None
    } else {
        Some(address)
    }
}
