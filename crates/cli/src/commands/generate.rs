//! `prepwise generate`: produce one learning activity, streaming partials.

use prepwise_agent::{ActivityRequest, GenerationEvent};
use prepwise_core::activity::ActivityKind;
use prepwise_core::plan::{Plan, PlanContext};

use crate::app::App;

pub struct GenerateArgs {
    pub kind: ActivityKind,
    pub topic: String,
    pub task: Option<String>,
    pub user_id: String,
    pub plan: Plan,
    pub stream: bool,
}

pub async fn run(app: &App, args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut request =
        ActivityRequest::new(args.kind, &args.topic).for_user(&args.user_id, PlanContext::new(args.plan));
    if let Some(task) = &args.task {
        request = request.with_task(task);
    }

    if !args.stream {
        let output = app.service.generate(&request).await?;
        println!("{}", serde_json::to_string_pretty(&output.content)?);
        eprintln!("  model: {}", output.model);
        return Ok(());
    }

    let session_key = format!("{}:{}", args.user_id, args.kind);
    let mut stream = app.service.stream(&request, &session_key, false).await?;
    let mut partials = 0usize;

    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            _ = tokio::signal::ctrl_c() => {
                app.service.cancel(&session_key);
                eprintln!("\n  Cancelled.");
                return Ok(());
            }
        };
        let Some(event) = event else { break };

        match event {
            GenerationEvent::Partial { object } => {
                partials += 1;
                eprint!("\r  receiving... {partials} update(s), {} field(s)", field_count(&object));
            }
            GenerationEvent::Complete { content, model, usage } => {
                eprintln!();
                println!("{}", serde_json::to_string_pretty(&content)?);
                match usage {
                    Some(u) => eprintln!(
                        "  model: {model}, tokens: {} in / {} out",
                        u.prompt_tokens, u.completion_tokens
                    ),
                    None => eprintln!("  model: {model}"),
                }
            }
            GenerationEvent::Error { message } => {
                eprintln!();
                return Err(message.into());
            }
        }
    }
    Ok(())
}

fn field_count(object: &serde_json::Value) -> usize {
    object.as_object().map(|o| o.len()).unwrap_or(0)
}
