// examples/conflict_detection_usage.rs
//
// This example walks a candidate rule through validation and conflict
// detection against a small catalog, the same path the rule form takes
// before anything is saved.
//
// Run with: cargo run --example conflict_detection_usage

use rule_engine::*;

fn main() {
    println!("=== Rule Validation & Conflict Detection ===\n");

    let catalog = TargetCatalog::default()
        .with_extensions([
            Extension::new("ext1", "Ad Blocker", true),
            Extension::new("ext2", "Dark Reader", false),
        ])
        .with_groups([Group::new("Focus", ["ext1", "ext2"])]);

    let existing = vec![
        Rule::create(RuleDraft::new(
            "Workday blocker",
            TargetType::Extension,
            ["ext1"],
            RuleAction::Enable,
            Trigger::at("09:00", [1, 2, 3, 4, 5]),
        )),
        Rule::create(RuleDraft::new(
            "Focus on video",
            TargetType::Group,
            ["Focus"],
            RuleAction::Toggle,
            Trigger::on_url("youtube.com"),
        )),
    ];

    // ========================================================================
    // Example 1: Field scoped validation errors
    // ========================================================================
    println!("Example 1: Validation");
    println!("--------------------------");

    let validator = RuleValidator::new();
    let broken = Rule::create(RuleDraft::new(
        "workday BLOCKER",
        TargetType::Group,
        Vec::<String>::new(),
        RuleAction::Apply,
        Trigger::at("9am", Vec::<u8>::new()),
    ));
    let result = validator.validate(&broken, &existing, &catalog);
    println!("valid: {}", result.valid);
    for (field, message) in result.field_messages() {
        println!("  [{}] {}", field, message);
    }
    println!();

    // ========================================================================
    // Example 2: Opposing actions on the same schedule
    // ========================================================================
    println!("Example 2: Time trigger conflict");
    println!("--------------------------");

    let detector = ConflictDetector::new();
    let monday_off = Rule::create(RuleDraft::new(
        "Monday off",
        TargetType::Extension,
        ["ext1"],
        RuleAction::Disable,
        Trigger::at("09:00", [1]),
    ));
    match detector.find_conflict(&monday_off, &existing) {
        Some(conflict) => println!("  {}", conflict),
        None => println!("  no conflict"),
    }

    // Same rule, different day: the weekday sets no longer intersect
    let sunday_off = Rule::create(RuleDraft::new(
        "Sunday off",
        TargetType::Extension,
        ["ext1"],
        RuleAction::Disable,
        Trigger::at("09:00", [0]),
    ));
    let sunday = detector.find_conflict(&sunday_off, &existing);
    println!("  sunday: {:?}", sunday.map(|c| c.conflict_type));
    println!();

    // ========================================================================
    // Example 3: Toggle next to a direct action on a URL trigger
    // ========================================================================
    println!("Example 3: URL trigger conflict");
    println!("--------------------------");

    let watch_on = Rule::create(RuleDraft::new(
        "Watch page",
        TargetType::Group,
        ["Focus"],
        RuleAction::Enable,
        Trigger::on_url("youtube.com/watch"),
    ));
    if let Some(conflict) = detector.find_conflict(&watch_on, &existing) {
        println!("  {} ({})", conflict, conflict.conflict_type);
    }

    // A disabled candidate never conflicts
    let parked = watch_on.clone().with_enabled(false);
    println!("  disabled candidate: {:?}", detector.find_conflict(&parked, &existing));
    println!();

    // ========================================================================
    // Example 4: Scanning a whole collection
    // ========================================================================
    println!("Example 4: Collection scan");
    println!("--------------------------");

    let mut all = existing.clone();
    all.push(monday_off);
    all.push(watch_on);
    for conflict in detector.scan(&all) {
        println!("  {}", conflict);
    }
}
