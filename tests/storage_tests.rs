use insider_ledger::edgar::parsing::text::read_submission;
use insider_ledger::storage::StorageError;
use insider_ledger::{FilingContext, FilingProcessor, FilingSink, MemoryStore, PositionLedger};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn filing(accession: &str, filed: &str, day: &str, code: &str, shares: &str, flag: &str) -> String {
    format!(
        r#"<SEC-DOCUMENT>{acc}.txt : {filed}
<SEC-HEADER>{acc}.hdr.sgml : {filed}
ACCESSION NUMBER:		{acc}
CONFORMED SUBMISSION TYPE:	4
FILED AS OF DATE:		{filed}
</SEC-HEADER>
<DOCUMENT>
<TYPE>4
<SEQUENCE>1
<FILENAME>form4.xml
<TEXT>
<XML>
<?xml version="1.0"?>
<ownershipDocument>
  <documentType>4</documentType>
  <periodOfReport>{day}</periodOfReport>
  <issuer><issuerCik>0000000100</issuerCik><issuerName>Widget Corp</issuerName></issuer>
  <reportingOwner>
    <reportingOwnerId><rptOwnerCik>0000000200</rptOwnerCik><rptOwnerName>Doe Jane</rptOwnerName></reportingOwnerId>
    <reportingOwnerRelationship><isOfficer>1</isOfficer><officerTitle>CFO</officerTitle></reportingOwnerRelationship>
  </reportingOwner>
  <nonDerivativeTable>
    <nonDerivativeTransaction>
      <securityTitle><value>Common Stock</value></securityTitle>
      <transactionDate><value>{day}</value></transactionDate>
      <transactionCoding><transactionCode>{code}</transactionCode></transactionCoding>
      <transactionAmounts>
        <transactionShares><value>{shares}</value></transactionShares>
        <transactionPricePerShare><value>20</value></transactionPricePerShare>
        <transactionAcquiredDisposedCode><value>{flag}</value></transactionAcquiredDisposedCode>
      </transactionAmounts>
      <ownershipNature><directOrIndirectOwnership><value>D</value></directOrIndirectOwnership></ownershipNature>
    </nonDerivativeTransaction>
  </nonDerivativeTable>
</ownershipDocument>
</XML>
</TEXT>
</DOCUMENT>
</SEC-DOCUMENT>"#,
        acc = accession,
        filed = filed,
        day = day,
        code = code,
        shares = shares,
        flag = flag
    )
}

fn write_batch(dir: &std::path::Path) -> Vec<PathBuf> {
    let filings = [
        ("01-buy.txt", filing("0000000200-23-000001", "20230104", "2023-01-03", "P", "100", "A")),
        ("02-sell.txt", filing("0000000200-23-000002", "20230202", "2023-02-01", "S", "30", "D")),
        ("03-late-buy.txt", filing("0000000200-23-000003", "20230203", "2023-01-15", "P", "50", "A")),
    ];
    filings
        .iter()
        .map(|(name, content)| {
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn test_batch_persists_positions_across_filings() {
    let temp_dir = tempdir().unwrap();
    let paths = write_batch(temp_dir.path());

    let store = MemoryStore::new();
    let mut processor = FilingProcessor::new();
    for path in &paths {
        let raw = read_submission(path).unwrap();
        let bundle = processor.process(&raw, &FilingContext::default());
        store.persist(&bundle).await.unwrap();
    }

    let counts = store.counts();
    assert_eq!(counts.filings, 3);
    assert_eq!(counts.entities, 2);
    assert_eq!(counts.securities, 1);
    assert_eq!(counts.relationships, 3);
    assert_eq!(counts.transactions, 3);
    assert_eq!(counts.snapshots, 3);

    let relationships = store.relationships();
    assert!(relationships.iter().all(|r| r.ownership_id == relationships[0].ownership_id));
    let rel = relationships.last().unwrap();
    assert_eq!(rel.accession_number, "0000000200-23-000003");
    assert_eq!(rel.officer_title.as_deref(), Some("CFO"));
    assert_eq!(rel.total_shares_owned, Some(dec("120")));

    let amounts: Vec<Decimal> = store
        .snapshots_for(rel.ownership_id)
        .iter()
        .map(|s| s.shares_amount)
        .collect();
    assert_eq!(amounts, vec![dec("100"), dec("150"), dec("120")]);

    let owner = store.entity_by_cik("200").unwrap();
    assert_eq!(owner.name, "Doe Jane");
    assert!(store.entity_by_cik("0000000100").is_some());
}

#[tokio::test]
async fn test_persisting_twice_replaces_filing() {
    let temp_dir = tempdir().unwrap();
    let paths = write_batch(temp_dir.path());
    let raw = read_submission(&paths[0]).unwrap();

    let store = MemoryStore::new();
    let mut processor = FilingProcessor::new();
    let bundle = processor.process(&raw, &FilingContext::default());

    let first = store.persist(&bundle).await.unwrap();
    assert!(!first.replaced);
    assert_eq!(first.entities_inserted, 2);
    let before = store.counts();

    let second = store.persist(&bundle).await.unwrap();
    assert!(second.replaced);
    assert_eq!(second.entities_inserted, 0);
    assert_eq!(store.counts(), before);
    assert_eq!(store.transactions_for("0000000200-23-000001").len(), 1);
}

#[tokio::test]
async fn test_each_filing_keeps_its_own_relationship_row() {
    let first = filing("0000000200-23-000001", "20230104", "2023-01-03", "P", "100", "A");
    let second = filing("0000000200-23-000002", "20230202", "2023-02-01", "S", "30", "D")
        .replace("<officerTitle>CFO</officerTitle>", "<officerTitle>CEO</officerTitle>");

    let store = MemoryStore::new();
    let mut processor = FilingProcessor::new();
    for raw in [&first, &second] {
        let bundle = processor.process(raw, &FilingContext::default());
        store.persist(&bundle).await.unwrap();
    }

    let a = store.relationships_for("0000000200-23-000001");
    let b = store.relationships_for("0000000200-23-000002");
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_ne!(a[0].id, b[0].id);
    assert_eq!(a[0].ownership_id, b[0].ownership_id);
    assert_eq!(a[0].officer_title.as_deref(), Some("CFO"));
    assert_eq!(b[0].officer_title.as_deref(), Some("CEO"));
    assert_eq!(a[0].total_shares_owned, Some(dec("100")));
    assert_eq!(b[0].total_shares_owned, Some(dec("70")));

    let first_txn = &store.transactions_for("0000000200-23-000001")[0];
    assert_eq!(first_txn.relationship_id, a[0].id);
    assert_eq!(store.transactions_for("0000000200-23-000002")[0].relationship_id, b[0].id);
}

#[tokio::test]
async fn test_redelivered_filing_does_not_roll_back_positions() {
    let sale = filing("0000000200-23-000002", "20230202", "2023-02-01", "S", "30", "D");
    let buy = filing("0000000200-23-000001", "20230104", "2023-01-03", "P", "100", "A");

    let store = MemoryStore::new();
    let mut processor = FilingProcessor::new();
    let sale_bundle = processor.process(&sale, &FilingContext::default());
    store.persist(&sale_bundle).await.unwrap();
    assert_eq!(sale_bundle.positions[0].shares_amount, dec("-30"));

    let buy_bundle = processor.process(&buy, &FilingContext::default());
    store.persist(&buy_bundle).await.unwrap();

    let ownership_id = buy_bundle.relationships[0].ownership_id;
    let expected = vec![
        (NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(), dec("100")),
        (NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(), dec("70")),
    ];
    let stored = |store: &MemoryStore| -> Vec<(NaiveDate, Decimal)> {
        store
            .snapshots_for(ownership_id)
            .iter()
            .map(|s| (s.position_date, s.shares_amount))
            .collect()
    };
    assert_eq!(stored(&store), expected);

    let summary = store.persist(&sale_bundle).await.unwrap();
    assert!(summary.replaced);
    assert_eq!(summary.positions, 0);
    assert_eq!(summary.stale_positions, 1);
    assert_eq!(stored(&store), expected);
    assert_eq!(store.counts().snapshots, 2);
    assert_eq!(store.transactions_for("0000000200-23-000002").len(), 1);
}

#[tokio::test]
async fn test_stored_snapshots_seed_a_new_ledger() {
    let temp_dir = tempdir().unwrap();
    let paths = write_batch(temp_dir.path());

    let store = MemoryStore::new();
    let mut processor = FilingProcessor::new();
    for path in &paths[..2] {
        let raw = read_submission(path).unwrap();
        let bundle = processor.process(&raw, &FilingContext::default());
        store.persist(&bundle).await.unwrap();
    }

    let mut resumed = FilingProcessor::with_ledger(PositionLedger::seeded(store.all_snapshots()));
    let raw = filing("0000000200-23-000004", "20230302", "2023-03-01", "S", "20", "D");
    let bundle = resumed.process(&raw, &FilingContext::default());
    store.persist(&bundle).await.unwrap();

    assert_eq!(bundle.positions.len(), 1);
    assert_eq!(bundle.positions[0].shares_amount, dec("50"));
    assert_eq!(bundle.relationships[0].total_shares_owned, Some(dec("50")));
    assert_eq!(store.counts().snapshots, 3);
}

#[tokio::test]
async fn test_missing_accession_is_rejected() {
    let raw = filing("", "20230104", "2023-01-03", "P", "100", "A");
    let bundle = FilingProcessor::new().process(&raw, &FilingContext::default());
    let store = MemoryStore::new();

    let err = store.persist(&bundle).await.unwrap_err();
    assert_eq!(err, StorageError::MissingAccession);
    assert_eq!(store.counts().filings, 0);
}
