//! `prepwise pricing`: model prices, cost estimates and logged usage.

use prepwise_telemetry::PricingSource;

use crate::app::App;

/// List every known price.
pub async fn list(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let rows = app.service.pricing().rows().await;

    println!("Model pricing (USD per 1M tokens)");
    println!("{:<44} {:>10} {:>10}  {}", "Model", "Input", "Output", "Source");
    for row in &rows {
        println!(
            "{:<44} {:>10.3} {:>10.3}  {}",
            row.model,
            row.pricing.input_per_m,
            row.pricing.output_per_m,
            source_label(row.source)
        );
    }
    println!("\n  {} models", rows.len());
    Ok(())
}

/// Estimate the cost of one call.
pub async fn estimate(
    app: &App,
    model: &str,
    input_tokens: u32,
    output_tokens: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let row = app.service.pricing().resolve(model).await;
    let cost = row.pricing.cost(input_tokens, output_tokens);

    println!("Cost estimate for {model}");
    println!("  Input tokens:   {input_tokens}");
    println!("  Output tokens:  {output_tokens}");
    println!("  Estimated cost: ${cost:.6}");
    if row.source == PricingSource::Default {
        println!("  (no price known for this model; default pricing applied)");
    }
    Ok(())
}

/// Aggregate the most recent generation log entries.
pub async fn usage(app: &App, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let summary = app.service.logger().summary(limit).await?;

    println!("Usage over the last {} call(s)", summary.calls);
    println!("  Errors:         {}", summary.errors);
    println!("  Input tokens:   {}", summary.total_input_tokens);
    println!("  Output tokens:  {}", summary.total_output_tokens);
    println!("  Total cost:     ${:.6}", summary.total_cost_usd);

    if !summary.by_model.is_empty() {
        println!();
        println!("{:<44} {:>6} {:>10} {:>10} {:>8}", "Model", "Calls", "Cost", "Tokens", "Avg ms");
        for m in &summary.by_model {
            println!(
                "{:<44} {:>6} {:>10.6} {:>10} {:>8}",
                m.model,
                m.calls,
                m.cost_usd,
                m.input_tokens + m.output_tokens,
                m.avg_latency_ms
            );
        }
    }
    Ok(())
}

fn source_label(source: PricingSource) -> &'static str {
    match source {
        PricingSource::Custom => "custom",
        PricingSource::Live => "live",
        PricingSource::Static => "static",
        PricingSource::Default => "default",
    }
}
