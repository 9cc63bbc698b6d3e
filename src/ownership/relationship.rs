use chrono::NaiveDate;
use roxmltree::Node;

use super::entity::ResolvedEntities;
use super::model::{Relationship, RelationshipDetails, RelationshipType, RoleEntry};
use super::xml::{child, children, flag_at, value_at};

pub const DEFAULT_OTHER_TEXT: &str = "Form 4 Filer";
pub const DEFAULT_OFFICER_TITLE: &str = "Officer";

/// The four role flags of a `<reportingOwnerRelationship>` plus their text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFlags {
    pub is_director: bool,
    pub is_officer: bool,
    pub is_ten_percent_owner: bool,
    pub is_other: bool,
    pub officer_title: Option<String>,
    pub other_text: Option<String>,
}

impl RoleFlags {
    /// Reads the flags from a `<reportingOwner>` element. Missing or
    /// unreadable flags count as false.
    pub fn from_owner_node(owner: Node) -> Self {
        let Some(rel) = child(owner, "reportingOwnerRelationship") else {
            return Self::default();
        };
        let flag = |name: &str| flag_at(rel, &[name]).unwrap_or(false);
        Self {
            is_director: flag("isDirector"),
            is_officer: flag("isOfficer"),
            is_ten_percent_owner: flag("isTenPercentOwner"),
            is_other: flag("isOther"),
            officer_title: value_at(rel, &["officerTitle"]),
            other_text: value_at(rel, &["otherText"]),
        }
    }

    /// Applies the defaulting rules: no flag at all means "other", and the
    /// text of a set officer/other flag is never left empty.
    pub fn normalized(self) -> Self {
        let any = self.is_director || self.is_officer || self.is_ten_percent_owner || self.is_other;
        let is_other = self.is_other || !any;

        let officer_title = if self.is_officer {
            Some(
                self.officer_title
                    .unwrap_or_else(|| DEFAULT_OFFICER_TITLE.to_string()),
            )
        } else {
            None
        };
        let other_text = if is_other {
            Some(self.other_text.unwrap_or_else(|| DEFAULT_OTHER_TEXT.to_string()))
        } else {
            None
        };

        Self {
            is_other,
            officer_title,
            other_text,
            ..self
        }
    }

    /// First set flag wins: director, officer, ten-percent owner, other.
    pub fn relationship_type(&self) -> RelationshipType {
        if self.is_director {
            RelationshipType::Director
        } else if self.is_officer {
            RelationshipType::Officer
        } else if self.is_ten_percent_owner {
            RelationshipType::TenPercentOwner
        } else {
            RelationshipType::Other
        }
    }

    pub fn roles(&self) -> Vec<RoleEntry> {
        let mut roles = Vec::new();
        if self.is_director {
            roles.push(RoleEntry::Tag(RelationshipType::Director.to_string()));
        }
        if self.is_officer {
            roles.push(RoleEntry::Officer {
                kind: RelationshipType::Officer.to_string(),
                title: self
                    .officer_title
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OFFICER_TITLE.to_string()),
            });
        }
        if self.is_ten_percent_owner {
            roles.push(RoleEntry::Tag(RelationshipType::TenPercentOwner.to_string()));
        }
        if self.is_other {
            roles.push(RoleEntry::Other {
                kind: RelationshipType::Other.to_string(),
                description: self
                    .other_text
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OTHER_TEXT.to_string()),
            });
        }
        roles
    }
}

/// Builds one relationship per resolved owner.
///
/// Owners read from XML take their flags from their `<reportingOwner>`
/// element; owners found only in the header get the default "other" role.
pub fn classify_relationships(
    accession_number: &str,
    filing_date: Option<NaiveDate>,
    entities: &ResolvedEntities,
    xml_root: Option<Node>,
) -> Vec<Relationship> {
    let owner_nodes: Vec<Node> = xml_root
        .map(|root| children(root, "reportingOwner").collect())
        .unwrap_or_default();
    let is_group_filing = entities.owners.len() > 1;

    entities
        .owners
        .iter()
        .map(|owner| {
            let flags = owner
                .xml_index
                .and_then(|idx| owner_nodes.get(idx).copied())
                .map(RoleFlags::from_owner_node)
                .unwrap_or_default()
                .normalized();
            let relationship_type = flags.relationship_type();
            log::debug!(
                "Owner {} classified as {} of {}",
                owner.entity.cik,
                relationship_type,
                entities.issuer.cik
            );

            Relationship {
                id: Relationship::id_for(accession_number, &entities.issuer.cik, &owner.entity.cik),
                ownership_id: Relationship::ownership_id_for(&entities.issuer.cik, &owner.entity.cik),
                accession_number: accession_number.to_string(),
                issuer_entity_id: entities.issuer.id,
                owner_entity_id: owner.entity.id,
                filing_date,
                relationship_details: RelationshipDetails {
                    issuer: entities.issuer_summary.clone(),
                    owner: owner.summary.clone(),
                    roles: flags.roles(),
                },
                is_director: flags.is_director,
                is_officer: flags.is_officer,
                is_ten_percent_owner: flags.is_ten_percent_owner,
                is_other: flags.is_other,
                officer_title: flags.officer_title,
                other_text: flags.other_text,
                relationship_type,
                is_group_filing,
                total_shares_owned: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::parsing::header::HeaderFields;
    use crate::ownership::entity::EntityResolver;
    use crate::ownership::report::ExtractionReport;

    fn owner_node_xml(rel: &str) -> String {
        format!(
            "<ownershipDocument><reportingOwner><reportingOwnerRelationship>{}</reportingOwnerRelationship></reportingOwner></ownershipDocument>",
            rel
        )
    }

    fn flags_for(rel: &str) -> RoleFlags {
        let xml = owner_node_xml(rel);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let owner = child(doc.root_element(), "reportingOwner").unwrap();
        RoleFlags::from_owner_node(owner).normalized()
    }

    #[test]
    fn test_priority_order() {
        let flags = flags_for(
            "<isDirector>1</isDirector><isOfficer>1</isOfficer><officerTitle>CEO</officerTitle><isTenPercentOwner>1</isTenPercentOwner>",
        );
        assert_eq!(flags.relationship_type(), RelationshipType::Director);
        assert!(!flags.is_other);
        assert_eq!(flags.officer_title.as_deref(), Some("CEO"));
        assert_eq!(flags.roles().len(), 3);

        let flags = flags_for("<isOfficer>true</isOfficer><isTenPercentOwner>true</isTenPercentOwner>");
        assert_eq!(flags.relationship_type(), RelationshipType::Officer);
        assert_eq!(flags.officer_title.as_deref(), Some(DEFAULT_OFFICER_TITLE));

        let flags = flags_for("<isDirector>0</isDirector><isTenPercentOwner>TRUE</isTenPercentOwner>");
        assert_eq!(flags.relationship_type(), RelationshipType::TenPercentOwner);
    }

    #[test]
    fn test_no_flags_forces_other() {
        let flags = flags_for("<isDirector>false</isDirector><isOfficer>0</isOfficer>");
        assert_eq!(flags.relationship_type(), RelationshipType::Other);
        assert!(flags.is_other);
        assert_eq!(flags.other_text.as_deref(), Some(DEFAULT_OTHER_TEXT));
        assert!(flags.officer_title.is_none());

        let flags = flags_for("<isOther>1</isOther><otherText>Member of 13(d) group</otherText>");
        assert_eq!(flags.other_text.as_deref(), Some("Member of 13(d) group"));

        let flags = flags_for("<isOther>1</isOther><otherText>  </otherText>");
        assert_eq!(flags.other_text.as_deref(), Some(DEFAULT_OTHER_TEXT));
    }

    #[test]
    fn test_officer_title_ignored_without_flag() {
        let flags = flags_for("<isDirector>1</isDirector><officerTitle>CFO</officerTitle>");
        assert!(flags.officer_title.is_none());
        assert_eq!(flags.roles(), vec![RoleEntry::Tag("director".to_string())]);
    }

    #[test]
    fn test_classify_relationships_group_and_details() {
        let xml = "<ownershipDocument>
            <issuer><issuerCik>0001770787</issuerCik><issuerName>Acme Inc</issuerName></issuer>
            <reportingOwner><reportingOwnerId><rptOwnerCik>11</rptOwnerCik><rptOwnerName>Doe John</rptOwnerName></reportingOwnerId>
              <reportingOwnerRelationship><isDirector>1</isDirector></reportingOwnerRelationship></reportingOwner>
            <reportingOwner><reportingOwnerId><rptOwnerCik>12</rptOwnerCik><rptOwnerName>Doe Holdings LLC</rptOwnerName></reportingOwnerId>
              <reportingOwnerRelationship><isTenPercentOwner>1</isTenPercentOwner></reportingOwnerRelationship></reportingOwner>
        </ownershipDocument>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let root = doc.root_element();
        let mut report = ExtractionReport::new("acc-1");
        let entities =
            EntityResolver::new().resolve(Some(root), &HeaderFields::default(), "1770787", &mut report);
        let rels = classify_relationships("acc-1", None, &entities, Some(root));

        assert_eq!(rels.len(), 2);
        assert!(rels.iter().all(|r| r.is_group_filing));
        assert_eq!(rels[0].relationship_type, RelationshipType::Director);
        assert_eq!(rels[1].relationship_type, RelationshipType::TenPercentOwner);
        assert_eq!(rels[0].relationship_details.issuer.name, "Acme Inc");
        assert_eq!(rels[1].relationship_details.owner.name, "Doe Holdings LLC");
        assert_eq!(rels[0].id, Relationship::id_for("acc-1", "1770787", "11"));
        assert_eq!(rels[0].ownership_id, Relationship::ownership_id_for("1770787", "11"));

        // Another filing by the same owner gets its own row on the same ownership.
        let later = classify_relationships("acc-2", None, &entities, Some(root));
        assert_ne!(later[0].id, rels[0].id);
        assert_eq!(later[0].ownership_id, rels[0].ownership_id);
    }
}
