//! CLI commands for telemetry / usage / cost tracking.

use chrono::Utc;
use maitre_config::AppConfig;
use maitre_telemetry::{JsonlSink, PriceMatch, PricingTable, Rollup, TelemetryRecorder};
use std::sync::Arc;

/// Daily and per-user rollups from the telemetry log.
pub fn usage(user: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let log_path = config.telemetry.resolved_log_path();
    let recorder = TelemetryRecorder::new(
        PricingTable::from_config(&config.telemetry),
        Arc::new(JsonlSink::new(&log_path)),
    );

    println!("📊 Usage from {}", log_path.display());
    println!("─────────────────────────────────────────────────────────────────");

    if let Some(user) = user {
        let rollup = recorder.user_rollup(user)?;
        if rollup.calls == 0 {
            println!("  No calls recorded for '{user}'.");
            return Ok(());
        }
        println!("  User: {user}");
        print_rollup(&rollup);
        return Ok(());
    }

    let days = recorder.daily_rollups()?;
    if days.is_empty() {
        println!("  No calls recorded yet.");
        return Ok(());
    }

    println!(
        "{:<12} {:>7} {:>8} {:>10} {:>12} {:>10}",
        "Date", "Calls", "Failed", "Tokens", "Cost", "Latency"
    );
    for day in &days {
        println!(
            "{:<12} {:>7} {:>8} {:>10} ${:>11.6} {:>8.0}ms",
            day.date.to_string(),
            day.rollup.calls,
            day.rollup.failures,
            day.rollup.total_tokens,
            day.rollup.cost_usd,
            day.rollup.mean_latency_ms()
        );
    }

    let today = recorder.rollup_for_date(Utc::now().date_naive())?;
    println!();
    println!("  Today: {} calls, ${:.6}", today.calls, today.cost_usd);

    let users = recorder.user_rollups()?;
    println!();
    println!("  Top users by cost:");
    for (user_id, rollup) in users.iter().take(10) {
        println!(
            "    {:<24} {:>6} calls  ${:.6}",
            user_id, rollup.calls, rollup.cost_usd
        );
    }

    Ok(())
}

fn print_rollup(rollup: &Rollup) {
    println!("  Calls:          {}", rollup.calls);
    println!("  Success rate:   {:.1}%", rollup.success_rate() * 100.0);
    println!("  Prompt tokens:  {}", rollup.prompt_tokens);
    println!("  Output tokens:  {}", rollup.completion_tokens);
    println!("  Total cost:     ${:.6}", rollup.cost_usd);
    println!("  Mean latency:   {:.0}ms", rollup.mean_latency_ms());
}

/// List available model pricing.
pub fn pricing() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let table = PricingTable::from_config(&config.telemetry);
    let entries = table.entries();

    println!("💰 Model Pricing (per 1M tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<40} {:>10} {:>10}", "Model", "Input", "Output");
    println!("{:<40} {:>10} {:>10}", "─────", "─────", "──────");

    for (name, p) in &entries {
        println!("{:<40} ${:>8.3} ${:>8.3}", name, p.input_per_m, p.output_per_m);
    }
    let default = table.default_row();
    println!(
        "{:<40} ${:>8.3} ${:>8.3}",
        "(unknown models)", default.input_per_m, default.output_per_m
    );

    println!();
    println!("  {} models with pricing data", entries.len());

    Ok(())
}

/// Estimate cost for a given model and token counts.
pub fn estimate(
    model: &str,
    input_tokens: u32,
    output_tokens: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let table = PricingTable::from_config(&config.telemetry);

    let (pricing, matched) = table.resolve(model);
    let cost = pricing.cost(input_tokens, output_tokens);
    if matched == PriceMatch::Default {
        println!("⚠ Model '{model}' not found in pricing table; using the default row.");
        println!("  Use `maitre pricing` to see available models.");
    }
    println!("💵 Cost estimate for {model}");
    println!("   Input tokens:  {input_tokens}");
    println!("   Output tokens: {output_tokens}");
    println!("   Estimated cost: ${cost:.6}");

    Ok(())
}
