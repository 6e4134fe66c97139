use acctwatch::cli::Cli;
use acctwatch::config::TrackerConfig;
use acctwatch::core::tracker::audit::{audit_profiles, AuditIssue, AuditReport};
use acctwatch::core::tracker::profiles::{JsonFileProfileSource, ProfileSource};

#[cfg(feature = "live-http")]
use acctwatch::core::tracker::{RunSummary, Tracker};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    main_impl().await
}

async fn main_impl() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();

    // Handle configuration commands
    if cli.init {
        let path = TrackerConfig::init()?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => TrackerConfig::load_from(path)?,
        None => TrackerConfig::load()?,
    };

    if cli.print {
        config.print()?;
        return Ok(());
    }

    config.check()?;
    if cli.check {
        println!("✓ Configuration valid");
        return Ok(());
    }

    if cli.audit {
        let profiles = JsonFileProfileSource::new(config.profiles.path.clone())
            .list_profiles()
            .await?;
        print_audit(&audit_profiles(&profiles));
        return Ok(());
    }

    run(&config, cli.limit).await
}

#[cfg(feature = "live-http")]
async fn run(config: &TrackerConfig, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = Tracker::from_config(config, limit)?;
    if let Some(limit) = limit {
        println!("Test mode: checking only the first {} profiles", limit);
    }

    let summary = tracker.run(chrono::Utc::now()).await?;
    print_summary(&summary);
    Ok(())
}

#[cfg(not(feature = "live-http"))]
async fn run(_config: &TrackerConfig, _limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Network access is not enabled. Please install with --features live-http");
    std::process::exit(1);
}

#[cfg(feature = "live-http")]
fn print_summary(summary: &RunSummary) {
    for (i, result) in summary.results.iter().enumerate() {
        let detail = match &result.status.error {
            Some(error) => format!("{} ({})", result.status.state, error),
            None => format!("{} score {}", result.status.state, result.status.total_score),
        };
        println!(
            "[{}/{}] {}: {} | proxy {}",
            i + 1,
            summary.results.len(),
            result.profile.display_name,
            detail,
            result.proxy_health.status
        );
        for warning in &result.warnings {
            println!("      {}", warning);
        }
    }

    for event in &summary.events {
        println!("! {}: {}", event.kind, event.detail);
    }

    println!("=== SUMMARY BY CATEGORY ===");
    let mut categories: Vec<_> = summary.by_category.iter().collect();
    categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (category, count) in categories {
        println!("  {}: {}", category, count);
    }
    println!("Total score across all accounts: {}", summary.total_score);

    println!("=== BY OWNER ===");
    for (owner, owner_summary) in &summary.by_owner {
        println!("{}:", if owner.is_empty() { "Unknown" } else { owner });
        for (category, count) in &owner_summary.categories {
            println!("  {}: {}", category, count);
        }
        println!("  Total score: {}", owner_summary.total_score);
    }

    if let Some(report) = &summary.report {
        println!(
            "Report: {} updated, {} inserted",
            report.updated, report.inserted
        );
    }
    if !summary.state_saved {
        eprintln!("Warning: state snapshot was not saved");
    }
    if summary.sink_failures > 0 {
        eprintln!("Warning: {} sink call(s) failed", summary.sink_failures);
    }
}

fn print_audit(report: &AuditReport) {
    println!("\n=== Profile Audit ===");
    println!("Total profiles: {}", report.total_profiles);
    println!();

    if report.profiles_with_issues == 0 {
        println!("No issues found. All profiles are properly configured.");
        return;
    }

    println!("ISSUES FOUND:");
    let sections = [
        (AuditIssue::NoProxy, report.no_proxy_count, "profiles with no proxy configured"),
        (
            AuditIssue::RotatingProxy,
            report.rotating_proxy_count,
            "profiles using rotating proxy (should be sticky)",
        ),
        (AuditIssue::NoGeoTargeting, report.no_geo_count, "profiles with no geo-targeting"),
    ];

    for (issue, count, label) in sections {
        if count == 0 {
            continue;
        }
        println!("  - {} {}", count, label);
        let affected: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.issues.contains(&issue))
            .collect();
        for profile in affected.iter().take(5) {
            println!("      * {} (owner: {})", profile.account_id, profile.owner);
        }
        if affected.len() > 5 {
            println!("      ... and {} more", affected.len() - 5);
        }
    }

    if !report.shared_sessions.is_empty() {
        println!(
            "  - {} profiles sharing proxy sessions ({} shared sessions)",
            report.shared_proxy_count,
            report.shared_sessions.len()
        );
        for (session, accounts) in report.shared_sessions.iter().take(3) {
            println!("      * Session {}: {}", session, accounts.join(", "));
        }
        if report.shared_sessions.len() > 3 {
            println!(
                "      ... and {} more shared sessions",
                report.shared_sessions.len() - 3
            );
        }
    }

    println!();
}
