//! `prepwise resolve`: show which model a task would run on.

use prepwise_core::plan::{Plan, PlanContext};
use prepwise_core::tier::{ConfigSource, EffectiveConfig};

use crate::app::App;

pub async fn run(
    app: &App,
    task: &str,
    plan: Option<Plan>,
    selected_model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve(app, task, plan, selected_model).await?;
    print_config(app, &config);
    Ok(())
}

pub async fn resolve(
    app: &App,
    task: &str,
    plan: Option<Plan>,
    selected_model: Option<String>,
) -> Result<EffectiveConfig, Box<dyn std::error::Error>> {
    let plan = plan.map(|p| {
        let ctx = PlanContext::new(p);
        match &selected_model {
            Some(model) => ctx.with_selected_model(model),
            None => ctx,
        }
    });
    Ok(app.service.resolver().resolve(task, None, plan.as_ref()).await?)
}

fn print_config(app: &App, config: &EffectiveConfig) {
    let source = match config.source {
        ConfigSource::Byok => "byok",
        ConfigSource::System => "system",
    };
    if !app.service.resolver().tasks().contains(&config.task) {
        println!("  (unknown task, using the default tier)");
    }
    println!("  Task:         {}", config.task);
    println!("  Tier:         {}", config.tier);
    println!("  Provider:     {}", config.provider);
    println!("  Model:        {}", config.model);
    println!(
        "  Fallback:     {}",
        config.fallback_model.as_deref().unwrap_or("-")
    );
    println!("  Temperature:  {}", config.temperature);
    println!("  Max tokens:   {}", config.max_tokens);
    println!("  Source:       {source}");
}
