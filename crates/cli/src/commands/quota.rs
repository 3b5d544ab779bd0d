//! `prepwise quota`: show a user's crawl quota for the current period.

use prepwise_core::plan::Plan;

use crate::app::App;

pub async fn run(app: &App, user_id: &str, plan: Plan) -> Result<(), Box<dyn std::error::Error>> {
    let record = app.quota.record(user_id, plan).await?;
    let decision = app.quota.check(user_id, plan, 1).await?;

    println!("  User:       {}", record.user_id);
    println!("  Plan:       {}", record.plan);
    println!("  Metric:     {}", app.quota.metric());
    println!("  Period:     {}", record.period_key);
    println!("  Used:       {} / {}", record.used, record.limit);
    println!("  Remaining:  {}", decision.remaining);
    if !decision.allowed {
        println!("  {}", decision.message);
    }
    Ok(())
}
