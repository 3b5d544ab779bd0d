//! `prepwise ask`: a tool-enabled answer through the orchestration loop.

use prepwise_agent::AskRequest;
use prepwise_core::event::DomainEvent;
use prepwise_core::plan::{Plan, PlanContext};
use prepwise_core::tool::ToolStatus;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::debug;

use crate::app::App;

pub async fn run(
    app: &App,
    task: &str,
    prompt: &str,
    user_id: &str,
    plan: Plan,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = AskRequest::new(task, prompt, user_id, PlanContext::new(plan));
    let mut progress = Progress::new(&request.request_id);

    // Stream model text and tool progress while the loop runs.
    let mut events = app.events.subscribe();
    let ask = app.service.ask(request);
    tokio::pin!(ask);
    let result = loop {
        tokio::select! {
            result = &mut ask => break result,
            event = next_event(&mut events) => match event {
                Some(event) => progress.show(&event),
                None => break (&mut ask).await,
            },
        }
    };
    // Events published just before the loop returned.
    loop {
        match events.try_recv() {
            Ok(event) => progress.show(&event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    let output = result?;

    if progress.streamed {
        progress.end_line();
    } else {
        println!("{}", output.text);
    }
    eprintln!();
    for warning in &output.warnings {
        eprintln!("  warning: {warning}");
    }
    let tools = output.tools_used();
    if !tools.is_empty() {
        eprintln!("  tools: {}", tools.join(", "));
    }
    eprintln!(
        "  model: {}, steps: {}, tokens: {} in / {} out",
        output.model_id, output.steps, output.usage.prompt_tokens, output.usage.completion_tokens
    );
    Ok(())
}

/// The next event, skipping over any the receiver fell behind on.
/// `None` once the bus is gone.
async fn next_event(events: &mut Receiver<Arc<DomainEvent>>) -> Option<Arc<DomainEvent>> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Progress display fell behind");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Prints one request's events as they arrive.
struct Progress {
    request_id: String,
    streamed: bool,
    mid_line: bool,
}

impl Progress {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            streamed: false,
            mid_line: false,
        }
    }

    fn show(&mut self, event: &DomainEvent) {
        if event.request_id() != Some(self.request_id.as_str()) {
            return;
        }
        match event {
            DomainEvent::TextDelta { delta, .. } => {
                print!("{delta}");
                let _ = std::io::stdout().flush();
                self.streamed = true;
                self.mid_line = true;
            }
            DomainEvent::ToolStatus { invocation, .. } => {
                self.end_line();
                let status = match invocation.status {
                    ToolStatus::Calling => "calling",
                    ToolStatus::Complete => "done",
                    ToolStatus::Error => "failed",
                };
                eprintln!("  [{}] {status}", invocation.tool_id);
            }
            DomainEvent::StepStarted { step, .. } => {
                self.end_line();
                eprintln!("  step {step}");
            }
            _ => {}
        }
    }

    fn end_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}
