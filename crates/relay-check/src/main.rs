//! One-shot operator check: window status, source access, destination
//! permissions, a test post and a short description of the sources.
//!
//! Flags: `--json` prints the report as JSON, `--no-send` skips the test post.

use relay_core::config::Config;
use relay_telegram::diagnostics::{self, Report, ReportOptions};
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    relay_core::logging::init("relay_check", cfg.log_file.as_deref())?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let opts = ReportOptions {
        send_test_message: !args.iter().any(|a| a == "--no-send"),
        ..ReportOptions::default()
    };

    let report = match diagnostics::run(&cfg, &opts).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "diagnostics failed");
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(r: &Report) {
    let rule = "=".repeat(50);
    println!("{rule}");
    println!("CHANNEL RELAY CHECK (@{})", r.bot_username);
    println!("{rule}");

    println!("Monitoring window: {} .. {}", r.window.start, r.window.end);
    println!("  Now: {}", r.window.now);
    println!("  Active: {}", if r.window.active { "yes" } else { "no" });
    if r.window.days_until_start > 0 {
        println!("  Starts in: {} days", r.window.days_until_start);
    } else if r.window.days_since_end > 0 {
        println!("  Ended: {} days ago", r.window.days_since_end);
    } else if r.window.active {
        println!("  Ends in: {} days", r.window.days_until_end);
    }
    println!();

    let total = r.sources.accessible.len() + r.sources.inaccessible.len();
    println!("Sources accessible: {}/{}", r.sources.accessible.len(), total);
    for chan in &r.sources.accessible {
        println!("  ✓ {chan}");
    }
    for (chan, err) in &r.sources.inaccessible {
        println!("  ✗ {chan} - {err}");
    }
    println!();

    match (&r.destination, &r.destination_error) {
        (Some(d), _) => {
            println!("Destination: {}", d.channel);
            println!(
                "  Bot role: {}",
                if d.is_admin { "administrator" } else { "member" }
            );
            println!("  Can post: {}", d.can_post);
        }
        (None, Some(e)) => println!("Destination check failed: {e}"),
        (None, None) => {}
    }

    match r.test_message_sent {
        Some(true) => println!("Test message: sent"),
        Some(false) => println!("Test message: FAILED"),
        None => println!("Test message: skipped"),
    }
    println!();

    if !r.channel_info.is_empty() {
        println!("Source details:");
        for info in &r.channel_info {
            let members = info
                .members
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "  {} (@{}) - {} members",
                info.title.as_deref().unwrap_or("unknown"),
                info.username.as_deref().unwrap_or("none"),
                members
            );
        }
        println!();
    }

    println!("Check complete.");
}
