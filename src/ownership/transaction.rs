use chrono::NaiveDate;
use roxmltree::Node;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::footnote::{collect_footnotes, footnote_ids};
use super::model::{
    stable_id, AcquiredDisposed, OwnershipSummary, Relationship, Signature, Transaction,
    TransactionCode, TransactionKind,
};
use super::report::{ExtractionReport, SkipReason, Stage};
use super::security::{DerivativeTerms, SecurityResolver};
use super::xml::{children, date_at, decimal_at, descendants_named, flag_at, value_at};
use crate::edgar::parsing::values::parse_date;

/// The four record elements of an ownership document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    NonDerivativeTransaction,
    NonDerivativeHolding,
    DerivativeTransaction,
    DerivativeHolding,
}

impl RecordKind {
    /// Non-derivative records come first so underlying equity is resolved
    /// before the derivatives that point at it.
    pub const ALL: [RecordKind; 4] = [
        RecordKind::NonDerivativeTransaction,
        RecordKind::NonDerivativeHolding,
        RecordKind::DerivativeTransaction,
        RecordKind::DerivativeHolding,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            RecordKind::NonDerivativeTransaction => "nonDerivativeTransaction",
            RecordKind::NonDerivativeHolding => "nonDerivativeHolding",
            RecordKind::DerivativeTransaction => "derivativeTransaction",
            RecordKind::DerivativeHolding => "derivativeHolding",
        }
    }

    pub fn is_derivative(&self) -> bool {
        matches!(
            self,
            RecordKind::DerivativeTransaction | RecordKind::DerivativeHolding
        )
    }

    pub fn is_holding(&self) -> bool {
        matches!(
            self,
            RecordKind::NonDerivativeHolding | RecordKind::DerivativeHolding
        )
    }

    fn kind(&self) -> TransactionKind {
        if self.is_derivative() {
            TransactionKind::Derivative
        } else {
            TransactionKind::NonDerivative
        }
    }
}

fn required(node: Node, names: &[&str], field: &str) -> Result<String, SkipReason> {
    value_at(node, names).ok_or_else(|| SkipReason::MissingField(field.to_string()))
}

fn required_date(node: Node, names: &[&str], field: &str) -> Result<NaiveDate, SkipReason> {
    let raw = required(node, names, field)?;
    parse_date(&raw).ok_or(SkipReason::UnparseableDate {
        field: field.to_string(),
        value: raw,
    })
}

/// The relationship row a record belongs to and the ownership its
/// positions accumulate under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerLink {
    pub relationship_id: Uuid,
    pub ownership_id: Uuid,
}

impl OwnerLink {
    pub fn of(relationship: &Relationship) -> Self {
        Self {
            relationship_id: relationship.id,
            ownership_id: relationship.ownership_id,
        }
    }
}

/// Extracts transactions and holdings from one ownership document.
///
/// Every record is attached to `owner`, the primary reporting owner's
/// relationship. A record that cannot be read is skipped on its own and
/// noted in the report.
pub struct TransactionExtractor<'a> {
    pub accession_number: &'a str,
    pub issuer_entity_id: Uuid,
    pub owner: Option<OwnerLink>,
}

impl<'a> TransactionExtractor<'a> {
    pub fn extract(
        &self,
        root: Node,
        securities: &mut SecurityResolver,
        report: &mut ExtractionReport,
    ) -> Vec<Transaction> {
        let mut transactions = Vec::new();
        for kind in RecordKind::ALL {
            for (idx, node) in descendants_named(root, kind.tag()).enumerate() {
                let locator = format!("{}[{}]", kind.tag(), idx);
                let outcome = self.extract_record(kind, idx, node, securities);
                let stage = match &outcome {
                    Err(SkipReason::UnresolvedSecurity(_))
                    | Err(SkipReason::UnresolvedDerivativeSecurity(_)) => Stage::Securities,
                    _ => Stage::Transactions,
                };
                if let Some(txn) = report.record(stage, locator, outcome) {
                    transactions.push(txn);
                }
            }
        }
        log::debug!(
            "[{}] extracted {} transaction(s)",
            self.accession_number,
            transactions.len()
        );
        transactions
    }

    fn extract_record(
        &self,
        kind: RecordKind,
        idx: usize,
        node: Node,
        securities: &mut SecurityResolver,
    ) -> Result<Transaction, SkipReason> {
        let owner = self.owner.ok_or(SkipReason::UnresolvedRelationship)?;
        let title = required(node, &["securityTitle"], "securityTitle")?;

        // Dated fields are checked before any security row is created.
        let (transaction_code, transaction_date, flag) = if kind.is_holding() {
            (None, None, None)
        } else {
            let raw_code = required(node, &["transactionCoding", "transactionCode"], "transactionCode")?;
            let code = raw_code
                .parse::<TransactionCode>()
                .map_err(|_| SkipReason::MissingField("transactionCode".to_string()))?;
            let date = required_date(node, &["transactionDate"], "transactionDate")?;
            let raw_flag = required(
                node,
                &["transactionAmounts", "transactionAcquiredDisposedCode"],
                "transactionAcquiredDisposedCode",
            )?;
            let flag = AcquiredDisposed::parse(&raw_flag)
                .ok_or(SkipReason::InvalidAcquiredDisposed(raw_flag))?;
            (Some(code), Some(date), Some(flag))
        };

        let shares_owned_following =
            decimal_at(node, &["postTransactionAmounts", "sharesOwnedFollowingTransaction"]);
        let shares_amount = if kind.is_holding() {
            shares_owned_following.ok_or_else(|| {
                SkipReason::MissingField("sharesOwnedFollowingTransaction".to_string())
            })?
        } else {
            decimal_at(node, &["transactionAmounts", "transactionShares"]).unwrap_or_else(|| {
                log::debug!("{}[{}] has no share count, using 0", kind.tag(), idx);
                Decimal::ZERO
            })
        };

        let security_id = securities.resolve_security(&title, self.issuer_entity_id, kind.is_derivative())?;

        let mut derivative_security_id = None;
        let mut underlying_shares_amount = None;
        if kind.is_derivative() {
            let terms = DerivativeTerms {
                underlying_title: value_at(node, &["underlyingSecurity", "underlyingSecurityTitle"]),
                conversion_price: decimal_at(node, &["conversionOrExercisePrice"]),
                exercise_date: date_at(node, &["exerciseDate"]),
                expiration_date: date_at(node, &["expirationDate"]),
            };
            derivative_security_id = Some(securities.resolve_derivative(security_id, &terms)?);
            underlying_shares_amount =
                decimal_at(node, &["underlyingSecurity", "underlyingSecurityShares"]);
        }

        let price = if kind.is_holding() {
            None
        } else {
            decimal_at(node, &["transactionAmounts", "transactionPricePerShare"])
        };
        let (price_per_share, price_per_derivative) = if kind.is_derivative() {
            (None, price)
        } else {
            (price, None)
        };

        let direct_ownership = value_at(node, &["ownershipNature", "directOrIndirectOwnership"])
            .map(|v| !v.eq_ignore_ascii_case("I"))
            .unwrap_or(true);

        Ok(Transaction {
            id: stable_id(&["transaction", self.accession_number, kind.tag(), &idx.to_string()]),
            accession_number: self.accession_number.to_string(),
            relationship_id: owner.relationship_id,
            ownership_id: owner.ownership_id,
            security_id,
            kind: kind.kind(),
            derivative_security_id,
            transaction_code,
            transaction_form_type: value_at(node, &["transactionCoding", "transactionFormType"]),
            equity_swap_involved: flag_at(node, &["transactionCoding", "equitySwapInvolved"])
                .unwrap_or(false),
            transaction_date,
            deemed_execution_date: date_at(node, &["deemedExecutionDate"]),
            transaction_timeliness: value_at(node, &["transactionTimeliness"]),
            shares_amount,
            price_per_share,
            price_per_derivative,
            underlying_shares_amount,
            acquisition_disposition_flag: flag,
            shares_owned_following,
            direct_ownership,
            ownership_nature_explanation: value_at(node, &["ownershipNature", "natureOfOwnership"]),
            footnote_ids: footnote_ids(node),
            is_position_only: kind.is_holding(),
        })
    }
}

/// Document-level facts: schema, period, section 16 flags, remarks,
/// signatures and footnote bodies.
pub fn extract_summary(root: Node) -> OwnershipSummary {
    let signatures = children(root, "ownerSignature")
        .filter_map(|sig| {
            let name = value_at(sig, &["signatureName"])?;
            Some(Signature {
                name,
                date: date_at(sig, &["signatureDate"]),
            })
        })
        .collect();

    OwnershipSummary {
        schema_version: value_at(root, &["schemaVersion"]),
        document_type: value_at(root, &["documentType"]),
        period_of_report: date_at(root, &["periodOfReport"]),
        not_subject_to_section16: flag_at(root, &["notSubjectToSection16"]),
        aff10b5_one: flag_at(root, &["aff10b5One"]),
        remarks: value_at(root, &["remarks"]),
        signatures,
        footnotes: collect_footnotes(root),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::model::SecurityType;

    const DOC: &str = r#"<ownershipDocument>
    <schemaVersion>X0306</schemaVersion>
    <documentType>4</documentType>
    <periodOfReport>2023-01-06</periodOfReport>
    <notSubjectToSection16>0</notSubjectToSection16>
    <aff10b5One>1</aff10b5One>
    <nonDerivativeTable>
        <nonDerivativeTransaction>
            <securityTitle><value>Common Stock</value></securityTitle>
            <transactionDate><value>2023-01-05</value></transactionDate>
            <transactionCoding><transactionFormType>4</transactionFormType><transactionCode>P</transactionCode><equitySwapInvolved>0</equitySwapInvolved></transactionCoding>
            <transactionAmounts>
                <transactionShares><value>1000</value></transactionShares>
                <transactionPricePerShare><value>10.25</value></transactionPricePerShare>
                <transactionAcquiredDisposedCode><value>A</value></transactionAcquiredDisposedCode>
            </transactionAmounts>
            <postTransactionAmounts><sharesOwnedFollowingTransaction><value>1000</value></sharesOwnedFollowingTransaction></postTransactionAmounts>
            <ownershipNature><directOrIndirectOwnership><value>D</value></directOrIndirectOwnership></ownershipNature>
        </nonDerivativeTransaction>
        <nonDerivativeTransaction>
            <securityTitle><value>Common Stock</value></securityTitle>
            <transactionDate><value>not a date</value></transactionDate>
            <transactionCoding><transactionCode>S</transactionCode></transactionCoding>
            <transactionAmounts>
                <transactionShares><value>5</value></transactionShares>
                <transactionAcquiredDisposedCode><value>D</value></transactionAcquiredDisposedCode>
            </transactionAmounts>
        </nonDerivativeTransaction>
        <nonDerivativeHolding>
            <securityTitle><value>Common Stock</value></securityTitle>
            <postTransactionAmounts><sharesOwnedFollowingTransaction><value>2500</value></sharesOwnedFollowingTransaction></postTransactionAmounts>
            <ownershipNature>
                <directOrIndirectOwnership><value>I</value></directOrIndirectOwnership>
                <natureOfOwnership><value>By Trust</value><footnoteId id="F2"/></natureOfOwnership>
            </ownershipNature>
        </nonDerivativeHolding>
    </nonDerivativeTable>
    <derivativeTable>
        <derivativeTransaction>
            <securityTitle><value>Stock Option (right to buy)</value></securityTitle>
            <conversionOrExercisePrice><value>12.00</value></conversionOrExercisePrice>
            <transactionDate><value>2023-01-05</value></transactionDate>
            <transactionCoding><transactionCode>A</transactionCode></transactionCoding>
            <transactionAmounts>
                <transactionShares><value>300</value></transactionShares>
                <transactionPricePerShare><value>0</value></transactionPricePerShare>
                <transactionAcquiredDisposedCode><value>A</value></transactionAcquiredDisposedCode>
            </transactionAmounts>
            <exerciseDate><footnoteId id="F1"/></exerciseDate>
            <expirationDate><value>2033-01-05</value></expirationDate>
            <underlyingSecurity>
                <underlyingSecurityTitle><value>Common Stock</value></underlyingSecurityTitle>
                <underlyingSecurityShares><value>300</value></underlyingSecurityShares>
            </underlyingSecurity>
        </derivativeTransaction>
        <derivativeTransaction>
            <securityTitle><value>Warrant</value></securityTitle>
            <transactionDate><value>2023-01-05</value></transactionDate>
            <transactionCoding><transactionCode>P</transactionCode></transactionCoding>
            <transactionAmounts>
                <transactionShares><value>10</value></transactionShares>
                <transactionAcquiredDisposedCode><value>A</value></transactionAcquiredDisposedCode>
            </transactionAmounts>
        </derivativeTransaction>
    </derivativeTable>
    <footnotes><footnote id="F1">Vests in three installments.</footnote><footnote id="F2">Held by trust.</footnote></footnotes>
    <remarks>No remarks of note.</remarks>
    <ownerSignature><signatureName>/s/ John Doe</signatureName><signatureDate>2023-01-09</signatureDate></ownerSignature>
</ownershipDocument>"#;

    fn link() -> Option<OwnerLink> {
        Some(OwnerLink {
            relationship_id: Uuid::nil(),
            ownership_id: Uuid::nil(),
        })
    }

    fn run(owner: Option<OwnerLink>) -> (Vec<Transaction>, SecurityResolver, ExtractionReport) {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let mut securities = SecurityResolver::new();
        let mut report = ExtractionReport::new("acc-1");
        let extractor = TransactionExtractor {
            accession_number: "acc-1",
            issuer_entity_id: Uuid::nil(),
            owner,
        };
        let txns = extractor.extract(doc.root_element(), &mut securities, &mut report);
        (txns, securities, report)
    }

    #[test]
    fn test_extracts_all_record_kinds() {
        let (txns, securities, report) = run(link());
        assert_eq!(txns.len(), 3);

        let buy = &txns[0];
        assert_eq!(buy.transaction_code, Some(TransactionCode::OpenMarketPurchase));
        assert_eq!(buy.transaction_date, NaiveDate::from_ymd_opt(2023, 1, 5));
        assert_eq!(buy.shares_amount, Decimal::from(1000));
        assert_eq!(buy.price_per_share, Some("10.25".parse().unwrap()));
        assert_eq!(buy.acquisition_disposition_flag, Some(AcquiredDisposed::Acquired));
        assert_eq!(buy.transaction_form_type.as_deref(), Some("4"));
        assert!(buy.direct_ownership);
        assert!(!buy.is_position_only);

        let held = &txns[1];
        assert!(held.is_position_only);
        assert!(held.transaction_code.is_none() && held.transaction_date.is_none());
        assert!(held.price_per_share.is_none());
        assert_eq!(held.shares_amount, Decimal::from(2500));
        assert!(!held.direct_ownership);
        assert_eq!(held.ownership_nature_explanation.as_deref(), Some("By Trust"));
        assert_eq!(held.footnote_ids, vec!["F2"]);

        let option = &txns[2];
        assert_eq!(option.kind, TransactionKind::Derivative);
        assert!(option.derivative_security_id.is_some());
        assert!(option.price_per_share.is_none());
        assert_eq!(option.price_per_derivative, Some(Decimal::ZERO));
        assert_eq!(option.underlying_shares_amount, Some(Decimal::from(300)));
        assert_eq!(option.footnote_ids, vec!["F1"]);

        let derivative = &securities.derivative_securities()[0];
        let common = &securities.securities()[0];
        assert_eq!(common.security_type, SecurityType::Equity);
        assert_eq!(derivative.underlying_security_id, Some(common.id));
        assert_eq!(derivative.expiration_date, NaiveDate::from_ymd_opt(2033, 1, 5));

        // Bad date and the warrant without an underlying are skipped alone.
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::UnparseableDate { .. }
        ));
        assert_eq!(report.skipped[0].locator, "nonDerivativeTransaction[1]");
        assert_eq!(report.skipped_in(Stage::Securities).count(), 1);
        assert_eq!(report.accepted, 3);
    }

    #[test]
    fn test_ids_are_stable() {
        let (first, _, _) = run(link());
        let (second, _, _) = run(link());
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_relationship_drops_everything() {
        let (txns, _, report) = run(None);
        assert!(txns.is_empty());
        assert!(report
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::UnresolvedRelationship));
        assert_eq!(report.skipped.len(), 5);
    }

    #[test]
    fn test_invalid_flag_and_missing_code() {
        let xml = r#"<ownershipDocument><nonDerivativeTable>
            <nonDerivativeTransaction>
                <securityTitle><value>Common Stock</value></securityTitle>
                <transactionDate><value>2023-01-05</value></transactionDate>
                <transactionCoding><transactionCode>S</transactionCode></transactionCoding>
                <transactionAmounts><transactionAcquiredDisposedCode><value>X</value></transactionAcquiredDisposedCode></transactionAmounts>
            </nonDerivativeTransaction>
            <nonDerivativeTransaction>
                <securityTitle><value>Common Stock</value></securityTitle>
                <transactionDate><value>2023-01-05</value></transactionDate>
            </nonDerivativeTransaction>
        </nonDerivativeTable></ownershipDocument>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let mut securities = SecurityResolver::new();
        let mut report = ExtractionReport::new("acc-2");
        let extractor = TransactionExtractor {
            accession_number: "acc-2",
            issuer_entity_id: Uuid::nil(),
            owner: link(),
        };
        let txns = extractor.extract(doc.root_element(), &mut securities, &mut report);
        assert!(txns.is_empty());
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::InvalidAcquiredDisposed("X".to_string())
        );
        assert_eq!(
            report.skipped[1].reason,
            SkipReason::MissingField("transactionCode".to_string())
        );
        assert!(securities.securities().is_empty());
    }

    #[test]
    fn test_extract_summary() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let summary = extract_summary(doc.root_element());
        assert_eq!(summary.schema_version.as_deref(), Some("X0306"));
        assert_eq!(summary.document_type.as_deref(), Some("4"));
        assert_eq!(summary.period_of_report, NaiveDate::from_ymd_opt(2023, 1, 6));
        assert_eq!(summary.not_subject_to_section16, Some(false));
        assert_eq!(summary.aff10b5_one, Some(true));
        assert_eq!(summary.remarks.as_deref(), Some("No remarks of note."));
        assert_eq!(summary.signatures.len(), 1);
        assert_eq!(summary.signatures[0].date, NaiveDate::from_ymd_opt(2023, 1, 9));
        assert_eq!(summary.footnotes.len(), 2);
    }
}
