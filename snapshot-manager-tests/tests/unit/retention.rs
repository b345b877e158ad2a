//! Retention decisions over provider snapshot lists

use chrono::{TimeZone, Utc};
use rstest::rstest;
use snapshot_manager::{decide, Provider, Snapshot};

fn snapshot(id: &str, day: u32) -> Snapshot {
    Snapshot {
        id: id.to_string(),
        name: format!("web1-202401{:02}", day),
        created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        provider: Provider::DigitalOcean,
    }
}

fn ids(snapshots: &[Snapshot]) -> Vec<&str> {
    snapshots.iter().map(|s| s.id.as_str()).collect()
}

#[rstest]
#[case(0, vec![], vec!["6", "5", "4", "3", "2", "1"])]
#[case(3, vec!["6", "5", "4"], vec!["3", "2", "1"])]
#[case(6, vec!["6", "5", "4", "3", "2", "1"], vec![])]
#[case(10, vec!["6", "5", "4", "3", "2", "1"], vec![])]
fn test_keep_newest(#[case] retain: usize, #[case] keep: Vec<&str>, #[case] delete: Vec<&str>) {
    // deliberately unordered input
    let snapshots: Vec<_> = [3, 1, 6, 2, 5, 4]
        .iter()
        .map(|d| snapshot(&d.to_string(), *d))
        .collect();

    let decision = decide(&snapshots, retain);

    assert_eq!(ids(&decision.keep), keep);
    assert_eq!(ids(&decision.delete), delete);
}

#[test]
fn test_empty_list() {
    let decision = decide(&[], 3);
    assert!(decision.keep.is_empty());
    assert!(decision.delete.is_empty());
}

#[test]
fn test_equal_timestamps_are_deterministic() {
    let snapshots = vec![snapshot("100", 1), snapshot("9", 1), snapshot("55", 1)];

    let first = decide(&snapshots, 1);
    let reversed: Vec<_> = snapshots.iter().rev().cloned().collect();
    let second = decide(&reversed, 1);

    assert_eq!(ids(&first.keep), ids(&second.keep));
    assert_eq!(ids(&first.delete), ids(&second.delete));
}
