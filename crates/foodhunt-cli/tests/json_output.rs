//! Shape of the JSON the CLI prints with `--json`.

use foodhunt::{Deal, ScrapeError, ScrapeReport, ScrapeStats, ScrapeWarning};
use foodhunt_cli::render_error;
use serde_json::{json, Value};

fn sample_report() -> ScrapeReport {
    ScrapeReport {
        query: "https://shopeefood.vn/ho-chi-minh/food/danh-sach-dia-diem?q=tra".into(),
        threshold: 100.0,
        deals: vec![Deal {
            restaurant_id: "1".into(),
            restaurant_name: "Quán A".into(),
            item_id: "10".into(),
            item_name: "Trà đá".into(),
            price: 1.0,
            original_price: Some(5000.0),
            currency: "đ".into(),
        }],
        warnings: vec![ScrapeWarning::MenuUnavailable {
            restaurant_id: "2".into(),
            url: "https://shopeefood.vn/ho-chi-minh/quan-b".into(),
            reason: "capture timed out".into(),
        }],
        stats: ScrapeStats {
            responses_captured: 3,
            restaurants: 2,
            menu_items: 4,
            menus_followed: 0,
            duplicates_removed: 0,
            orphaned_items: 0,
        },
    }
}

#[test]
fn test_report_json_fields() {
    let value = serde_json::to_value(sample_report()).unwrap();

    assert_eq!(value["threshold"], json!(100.0));
    assert_eq!(value["deals"][0]["restaurant_name"], "Quán A");
    assert_eq!(value["deals"][0]["price"], json!(1.0));
    assert_eq!(value["deals"][0]["original_price"], json!(5000.0));
    assert_eq!(value["warnings"][0]["kind"], "menu_unavailable");
    assert_eq!(value["stats"]["responses_captured"], 3);
}

#[test]
fn test_error_json_for_run_timeout() {
    let err = anyhow::Error::from(ScrapeError::RunTimeout { timeout_ms: 120_000 });
    let value: Value = serde_json::from_str(&render_error(&err, true)).unwrap();
    assert_eq!(value["ok"], false);
    assert_eq!(value["stage"], "run");
    assert!(value["error"].as_str().unwrap().contains("120000ms"));
    assert_eq!(foodhunt_cli::exit_code(&err), 5);
}
