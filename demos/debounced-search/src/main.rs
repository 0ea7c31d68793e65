//! # Debounced Search Example
//!
//! Every keystroke starts a lookup under the same id, so the runtime
//! cancels the previous one. Only the last query's results come back.

use anyhow::Result;
use flipflop::{
    Config, Effect, Engine, OperationContext, Terminal, Transducer, Transition,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Default)]
struct SearchState {
    query: String,
    request: Option<Uuid>,
    closed: bool,
}

impl Terminal for SearchState {
    fn is_terminal(&self) -> bool {
        self.closed
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug)]
enum SearchEvent {
    /// User typed into the search box
    QueryChanged(String),

    /// Lookup finished
    ResultsArrived {
        request: Uuid,
        hits: Vec<String>,
    },

    Close,
}

// ============================================================================
// Dependencies
// ============================================================================

#[derive(Clone)]
struct Deps {
    catalog: Arc<Vec<&'static str>>,
    debounce: Duration,
}

impl Deps {
    fn lookup(&self, query: &str) -> Vec<String> {
        self.catalog
            .iter()
            .filter(|title| title.to_lowercase().contains(&query.to_lowercase()))
            .map(|title| title.to_string())
            .collect()
    }
}

// ============================================================================
// Transducer (Decision Logic)
// ============================================================================

struct SearchMachine;

impl Transducer for SearchMachine {
    type State = SearchState;
    type Event = SearchEvent;
    type Output = (String, Vec<String>);
    type Env = Deps;

    fn update(
        &self,
        state: &mut SearchState,
        event: SearchEvent,
    ) -> Transition<SearchEvent, (String, Vec<String>), Deps> {
        match event {
            SearchEvent::QueryChanged(query) if query.is_empty() => {
                state.query.clear();
                state.request = None;
                Transition::effect(Effect::cancel("search"))
            }
            SearchEvent::QueryChanged(query) => {
                let request = Uuid::new_v4();
                state.query = query.clone();
                state.request = Some(request);

                Transition::effect(Effect::operation_with_id(
                    "search",
                    move |ctx: OperationContext<SearchEvent, Deps>| async move {
                        // Waiting out the debounce is where a newer keystroke
                        // usually cancels us.
                        tokio::time::sleep(ctx.env().debounce).await;
                        let hits = ctx.env().lookup(&query);
                        ctx.send(SearchEvent::ResultsArrived { request, hits })?;
                        Ok(())
                    },
                ))
            }
            SearchEvent::ResultsArrived { request, hits } => {
                if state.request != Some(request) {
                    return Transition::none();
                }
                state.request = None;
                Transition::output((state.query.clone(), hits))
            }
            SearchEvent::Close => {
                state.closed = true;
                Transition::none()
            }
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let deps = Deps {
        catalog: Arc::new(vec![
            "Rust in Action",
            "Programming Rust",
            "Rustonomicon",
            "Zero to Production in Rust",
            "Async Programming in Rust",
        ]),
        debounce: Duration::from_millis(150),
    };

    let engine = Engine::builder(SearchMachine, deps)
        .with_config(Config::labeled("search").with_buffer_capacity(16))
        .build()?;

    let (results_tx, mut results_rx) = mpsc::channel(4);
    let handle = engine.start(SearchState::default(), results_tx);

    let printer = tokio::spawn(async move {
        while let Some((query, hits)) = results_rx.recv().await {
            println!("Results for {:?}:", query);
            for hit in hits {
                println!("  - {}", hit);
            }
        }
    });

    // Fast typing: only "prog" should produce results.
    for query in ["p", "pr", "pro", "prog"] {
        println!("Typed: {}", query);
        handle.send_await(SearchEvent::QueryChanged(query.to_string())).await?;
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Slow typing: each query completes.
    for query in ["async", "zero"] {
        println!("Typed: {}", query);
        handle.send_await(SearchEvent::QueryChanged(query.to_string())).await?;
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    handle.send_await(SearchEvent::Close).await?;
    handle.join().await?;
    printer.await?;

    println!("Search closed.");

    Ok(())
}
