mod config;
mod db;
mod image;
mod ipc;
mod markup;
mod reconcile;
mod record;
mod render;
mod suggest;

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn main() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    // Request lines and AI completions share one queue and are handled in
    // arrival order.
    let (tx, rx) = mpsc::channel();
    let mut state = ipc::AppState::new(tx.clone());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "plaafpd started");

    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(v) => {
                    if tx.send(ipc::Event::Line(v)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!("stdin read failed: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(ipc::Event::InputClosed);
    });

    let mut stdout = io::stdout();
    let mut input_open = true;
    for event in rx {
        if matches!(event, ipc::Event::InputClosed) {
            input_open = false;
        } else if let Some(resp) = ipc::handle_event(&mut state, event) {
            let _ = writeln!(
                stdout,
                "{}",
                serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
            );
            let _ = stdout.flush();
        }
        // Calls still out when input ends are answered before exiting.
        if !input_open && state.ai_in_flight == 0 {
            break;
        }
    }
}
