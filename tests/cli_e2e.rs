use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SEED_LEDGER: &str = "\
date,description,amount,tags,notes,type,check
2023-01-03,COFFEE SHOP DOWNTOWN,-4.50,Dining,,Checking,
2023-01-05,GROCERY MART #12,-52.10,Groceries,,Checking,
2023-01-09,COFFEE SHOP AIRPORT,-6.25,Dining,,CreditCard,
2023-01-12,GROCERY MART #40,-38.00,Groceries,,Checking,
2023-01-15,STRIPE PAYOUT,2500.00,Income,,Checking,
2023-01-20,COFFEE SHOP DOWNTOWN,-5.00,Dining,,Checking,
";

const FEB_STATEMENT: &str = "\
Description,,Summary Amt.
Beginning balance as of 02/01/2023,,\"1,000.00\"
Total credits,,0.00
Total debits,,-60.00
Ending balance as of 02/28/2023,,940.00

Date,Description,Amount,Running Bal.
02/02/2023,COFFEE SHOP DOWNTOWN,-4.75,995.25
02/06/2023,GROCERY MART #12,-55.25,940.00
";

struct Books {
    _tmp: TempDir,
    config: PathBuf,
    data: PathBuf,
}

impl Books {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("settings.json");
        let data = tmp.path().join("books");
        Self {
            _tmp: tmp,
            config,
            data,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("finbot").unwrap();
        cmd.env("NO_COLOR", "1")
            .arg("--config")
            .arg(&self.config)
            .arg("--data-dir")
            .arg(&self.data);
        cmd
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.data.join(rel)
    }

    /// Initialized, seeded with a tagged ledger and a trained model.
    fn trained() -> Self {
        let books = Self::new();
        books.cmd().arg("init").assert().success();
        fs::write(books.path("data/ledger.csv"), SEED_LEDGER).unwrap();
        books.cmd().arg("train").assert().success();
        books
    }

    fn ledger_rows(&self) -> usize {
        fs::read_to_string(self.path("data/ledger.csv")).unwrap().lines().count() - 1
    }
}

fn backup_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn test_help() {
    Command::cargo_bin("finbot")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("replace-tag"));
}

#[test]
fn test_init_creates_layout_and_settings() {
    let books = Books::new();
    books
        .cmd()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized finbot"));
    for dir in ["data", "model", "input", "reports"] {
        assert!(books.path(dir).is_dir(), "{dir} missing");
    }
    let settings = fs::read_to_string(&books.config).unwrap();
    assert!(settings.contains("confidence_threshold"));
}

#[test]
fn test_ingest_without_model_fails_cleanly() {
    let books = Books::new();
    books.cmd().arg("init").assert().success();
    books
        .cmd()
        .arg("ingest")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No trained model"));
    assert!(!books.path("data/ledger.csv").exists());
}

#[test]
fn test_train_reports_labels() {
    let books = Books::new();
    books.cmd().arg("init").assert().success();
    fs::write(books.path("data/ledger.csv"), SEED_LEDGER).unwrap();
    books
        .cmd()
        .arg("train")
        .assert()
        .success()
        .stdout(predicate::str::contains("Trained on 6 rows"))
        .stdout(predicate::str::contains("3 tags"));
    assert!(books.path("model/model.json").exists());
}

#[test]
fn test_ingest_merges_once() {
    let books = Books::trained();
    fs::write(books.path("input/stmt_feb.csv"), FEB_STATEMENT).unwrap();

    books
        .cmd()
        .args(["ingest", "--no-reports"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 new row(s) added"));
    assert_eq!(books.ledger_rows(), 8);

    books
        .cmd()
        .arg("ingest")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 new row(s) added"));
    assert_eq!(books.ledger_rows(), 8);
    assert_eq!(backup_count(&books.path("data/backups")), 1);
}

#[test]
fn test_ingest_writes_reports() {
    let books = Books::trained();
    fs::write(books.path("input/stmt_feb.csv"), FEB_STATEMENT).unwrap();
    books.cmd().arg("ingest").assert().success();
    let monthly = fs::read_to_string(books.path("reports/monthly_summary.csv")).unwrap();
    assert!(monthly.starts_with("tags,2023-02,2023-01"));
    assert!(books.path("reports/yearly_summary.csv").exists());
}

#[test]
fn test_ingest_rejects_bad_threshold() {
    let books = Books::trained();
    books
        .cmd()
        .args(["ingest", "--threshold", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Confidence threshold"));
}

#[test]
fn test_review_without_checkpoint() {
    let books = Books::trained();
    books
        .cmd()
        .arg("review")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No paused review"));
}

#[test]
fn test_list_filters_by_tag() {
    let books = Books::trained();
    books
        .cmd()
        .args(["list", "--tag", "Dining"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COFFEE SHOP AIRPORT"))
        .stdout(predicate::str::contains("GROCERY").not())
        .stdout(predicate::str::contains("3 row(s)"));
}

#[test]
fn test_tag_by_index_and_where_tag() {
    let books = Books::trained();
    books
        .cmd()
        .args(["tag", "4", "Salary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged 1 row(s) as Salary"));
    books
        .cmd()
        .args(["tag", "--where-tag", "Dining", "Coffee"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged 3 row(s) as Coffee"));

    let ledger = fs::read_to_string(books.path("data/ledger.csv")).unwrap();
    assert!(ledger.contains("STRIPE PAYOUT,2500.00,Salary"));
    assert!(!ledger.contains("Dining"));
    assert_eq!(backup_count(&books.path("data/backups")), 2);
}

#[test]
fn test_tag_out_of_range() {
    let books = Books::trained();
    books
        .cmd()
        .args(["tag", "99", "Dining"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No ledger record at index 99"));
}

#[test]
fn test_replace_tag_with_retrain() {
    let books = Books::trained();
    books
        .cmd()
        .args(["replace-tag", "Groceries", "Food", "--retrain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed Groceries to Food on 2 row(s)"))
        .stdout(predicate::str::contains("Model retrained"));
    let model_backups = backup_count(&books.path("model/backups"));
    assert_eq!(model_backups, 2);
}

#[test]
fn test_offset_splits_amount() {
    let books = Books::trained();
    books
        .cmd()
        .args(["offset", "1", "-12.10", "Household"])
        .assert()
        .success()
        .stdout(predicate::str::contains("offset: GROCERY MART #12"));
    let ledger = fs::read_to_string(books.path("data/ledger.csv")).unwrap();
    assert!(ledger.contains("2023-01-05,GROCERY MART #12,-40.00,Groceries"));
    assert!(ledger.contains("2023-01-05,offset: GROCERY MART #12,-12.10,Household"));
    assert_eq!(books.ledger_rows(), 7);
}

#[test]
fn test_dedupe_removes_repeats() {
    let books = Books::trained();
    let mut content = SEED_LEDGER.to_string();
    content.push_str("2023-01-03,COFFEE SHOP DOWNTOWN,-4.50,,,Checking,\n");
    fs::write(books.path("data/ledger.csv"), content).unwrap();

    books
        .cmd()
        .arg("dedupe")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 duplicate"));
    assert_eq!(books.ledger_rows(), 6);
    books
        .cmd()
        .arg("dedupe")
        .assert()
        .success()
        .stdout(predicate::str::contains("No duplicates"));
}

#[test]
fn test_backup_and_list() {
    let books = Books::trained();
    books
        .cmd()
        .args(["backup", "--event", "before taxes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup saved to"));
    books
        .cmd()
        .args(["backup", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("before_taxes"));
}

#[test]
fn test_report_kinds() {
    let books = Books::trained();
    books
        .cmd()
        .args(["report", "yearly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Netflow"));
    books
        .cmd()
        .args(["report", "balance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$2,394.15"));
}

#[test]
fn test_status() {
    let books = Books::trained();
    books
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows:       6"))
        .stdout(predicate::str::contains("3 tags"))
        .stdout(predicate::str::contains("none pending"));
}

#[test]
fn test_tag_several_indices_and_by_description() {
    let books = Books::trained();
    books
        .cmd()
        .args(["tag", "0", "2", "Coffee"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged 2 row(s) as Coffee"));
    books
        .cmd()
        .args(["tag", "--where-desc", "^GROCERY MART", "Food"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged 2 row(s) as Food"));

    let ledger = fs::read_to_string(books.path("data/ledger.csv")).unwrap();
    assert!(ledger.contains("2023-01-09,COFFEE SHOP AIRPORT,-6.25,Coffee"));
    assert!(ledger.contains("2023-01-20,COFFEE SHOP DOWNTOWN,-5.00,Dining"));
    assert!(!ledger.contains("Groceries"));
}

#[test]
fn test_dedupe_keep_last() {
    let books = Books::trained();
    let mut content = SEED_LEDGER.to_string();
    content.push_str("2023-01-03,COFFEE SHOP DOWNTOWN,-4.50,Snacks,,Checking,\n");
    fs::write(books.path("data/ledger.csv"), content).unwrap();

    books.cmd().args(["dedupe", "--keep", "last"]).assert().success();
    let ledger = fs::read_to_string(books.path("data/ledger.csv")).unwrap();
    assert!(ledger.contains("COFFEE SHOP DOWNTOWN,-4.50,Snacks"));
    assert!(!ledger.contains("COFFEE SHOP DOWNTOWN,-4.50,Dining"));
}
