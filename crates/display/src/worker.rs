//! Display Agent (C8): a pure sink. Consumes `FinalResultsReady`, sorts, prints, and signals
//! that the session's output has been emitted.

use async_trait::async_trait;
use colored::Colorize;
use rsi_correlator_bus::ServiceBus;
use rsi_correlator_core::{CorrelationResult, Event, Topic};
use rsi_correlator_worker::WorkerHandler;

/// Unit of work accepted by the Display Agent. It only ever subscribes to one topic, but is
/// kept as an enum for symmetry with the other workers and room for a future `Shutdown` task.
pub enum DisplayTask {
    FinalResultsReady {
        session_guid: String,
        results: Vec<CorrelationResult>,
    },
}

pub struct DisplayAgentHandler {
    bus: ServiceBus,
}

impl DisplayAgentHandler {
    #[must_use]
    pub const fn new(bus: ServiceBus) -> Self {
        Self { bus }
    }
}

/// Orders results by `(-|correlation|, market_cap)`: strongest trackers of BTC's RSI first,
/// ties broken by smaller market cap. A missing market cap sorts last within a tie.
fn sort_key(result: &CorrelationResult) -> (f64, f64) {
    (-result.correlation.abs(), result.market_cap.unwrap_or(f64::INFINITY))
}

fn format_row(result: &CorrelationResult) -> String {
    let correlation = format!("{:+.3}", result.correlation);
    let correlation = if result.correlation >= 0.0 {
        correlation.green()
    } else {
        correlation.red()
    };
    let market_cap = result
        .market_cap
        .map_or_else(|| "n/a".to_string(), |cap| format!("{cap:.0}"));
    let low_cap = if result.low_cap_quartile { "low-cap".yellow() } else { "".normal() };
    format!(
        "{:<10} {:<6} corr={correlation} market_cap={market_cap:>14} {low_cap}",
        result.symbol, result.timeframe
    )
}

#[async_trait]
impl WorkerHandler for DisplayAgentHandler {
    type Task = DisplayTask;

    async fn handle(&mut self, task: DisplayTask) -> anyhow::Result<()> {
        let DisplayTask::FinalResultsReady { session_guid, mut results } = task;

        results.sort_by(|a, b| sort_key(a).partial_cmp(&sort_key(b)).unwrap_or(std::cmp::Ordering::Equal));

        println!("\n=== RSI/BTC correlation results — session {session_guid} ===");
        if results.is_empty() {
            println!("(no coin cleared the correlation threshold)");
        }
        for result in &results {
            println!("{}", format_row(result));
        }

        self.bus.publish(Event::DisplayCompleted { session_guid }).await;
        Ok(())
    }
}

/// The only topic the Display Agent declares at construction.
pub const SUBSCRIBED_TOPICS: [Topic; 1] = [Topic::FinalResultsReady];

/// Translates a bus event into this worker's task type, or `None` for a topic it does not
/// act on.
#[must_use]
pub fn into_task(event: Event) -> Option<DisplayTask> {
    match event {
        Event::FinalResultsReady { session_guid, results } => Some(DisplayTask::FinalResultsReady { session_guid, results }),
        _ => None,
    }
}
