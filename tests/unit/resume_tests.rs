/*!
 * Tests for the resume ledger
 */

use anyhow::Result;
use std::collections::HashSet;
use std::fs;

use lingodeck::cards::resume::ResumeLedger;
use crate::common;

/// Test that a missing ledger loads as an empty set
#[test]
fn test_load_withMissingFile_shouldReturnEmptySet() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let ledger = ResumeLedger::new(temp_dir.path().join("state.json"));
    assert!(ledger.load().is_empty());
    Ok(())
}

/// Test that a corrupt ledger loads as an empty set
#[test]
fn test_load_withCorruptFile_shouldReturnEmptySet() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "state.json", "{\"processed\": [1, 2")?;
    assert!(ResumeLedger::new(path).load().is_empty());
    Ok(())
}

/// Test that a commit is written sorted and loads back
#[test]
fn test_commit_shouldPersistSortedSet() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("out").join("state.json");
    let ledger = ResumeLedger::new(&path);

    let processed: HashSet<String> = ["makan", "kucing", "anjing"].iter().map(|w| w.to_string()).collect();
    ledger.commit(&processed)?;

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(raw["processed"], serde_json::json!(["anjing", "kucing", "makan"]));
    assert_eq!(ledger.load(), processed);
    Ok(())
}

/// Test that a commit leaves no temp files next to the ledger
#[test]
fn test_commit_shouldNotLeaveTempFiles() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let ledger = ResumeLedger::new(temp_dir.path().join("state.json"));
    ledger.commit(&HashSet::from(["kucing".to_string()]))?;
    ledger.commit(&HashSet::from(["kucing".to_string(), "makan".to_string()]))?;

    let entries: Vec<_> = fs::read_dir(temp_dir.path())?.collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(ledger.load().len(), 2);
    Ok(())
}
