// examples/import_export_usage.rs
//
// Demonstrates the rule file format: exporting a collection, importing a
// file that still uses the old `extensionIds` field, merging on id, and
// filtering the merged list for display.
//
// Run with: cargo run --example import_export_usage

use rule_engine::*;

fn main() {
    println!("=== Rule Import / Export ===\n");

    let current = vec![
        Rule::with_id(
            RuleId::from("rule_1700000000000_aaaaaaaaa"),
            RuleDraft::new(
                "Work mode",
                TargetType::Profile,
                ["p1"],
                RuleAction::Apply,
                Trigger::at("08:30", [1, 2, 3, 4, 5]),
            )
            .with_tags(["work"]),
        ),
        Rule::with_id(
            RuleId::from("rule_1700000000001_bbbbbbbbb"),
            RuleDraft::new(
                "Docs reader",
                TargetType::Extension,
                ["ext2"],
                RuleAction::Enable,
                Trigger::on_url("docs.rs"),
            ),
        ),
    ];

    // ========================================================================
    // Example 1: Export
    // ========================================================================
    println!("Example 1: Export");
    println!("--------------------------");
    match export_rules(&current) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("export failed: {}", e),
    }
    println!();

    // ========================================================================
    // Example 2: Legacy import and merge
    // ========================================================================
    println!("Example 2: Import with legacy fields");
    println!("--------------------------");

    let file = r#"[
        {"id": "rule_1700000000001_bbbbbbbbb", "name": "Docs reader", "targetType": "extension",
         "targetIds": ["ext2"], "action": "disable", "trigger": {"type": "url", "url": "docs.rs"},
         "enabled": false},
        {"id": "rule_1600000000000_legacy001", "name": "Old night rule", "extensionIds": ["ext9"],
         "action": "disable", "trigger": {"type": "time", "time": "23:00", "days": [0, 6]}}
    ]"#;

    let imported = match parse_rules(file) {
        Ok(rules) => rules,
        Err(e) => {
            println!("import rejected: {}", e);
            return;
        }
    };
    let merged = merge_by_id(&current, imported);
    println!("added {}, replaced {}", merged.added, merged.replaced);
    for rule in &merged.rules {
        println!("  {} -> {} {:?} ({})", rule.name, rule.target_type, rule.target_ids, rule.action);
    }
    println!();

    // ========================================================================
    // Example 3: Rejected files
    // ========================================================================
    println!("Example 3: Malformed files");
    println!("--------------------------");
    for bad in [r#"{"rules": []}"#, r#"[{"name": "no id"}]"#, "not json"] {
        println!("  {:<22} => {:?}", bad, parse_rules(bad).err());
    }
    println!();

    // ========================================================================
    // Example 4: Filtering for display
    // ========================================================================
    println!("Example 4: Filtering");
    println!("--------------------------");

    let query = RuleQuery::new()
        .with_status(StatusFilter::Enabled)
        .with_trigger(TriggerFilter::Time);
    for rule in query.filter(&merged.rules) {
        println!("  visible: {}", rule.name);
    }

    let summary = RuleSummary::of(&merged.rules);
    println!(
        "  {} rules, {} enabled, {} time triggers, {} url triggers",
        summary.total, summary.enabled, summary.time_triggers, summary.url_triggers
    );
}
