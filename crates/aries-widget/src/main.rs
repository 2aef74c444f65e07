//! aries-chat – terminal host for the conversation widget.
//!
//! Reads one message per line from stdin and streams the reply to stdout.
//! `/clear`, `/retry` and `/quit` are commands; Ctrl+C stops a reply in
//! flight, or exits when nothing is running.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use aries_widget::client::DEFAULT_ENDPOINT;
use aries_widget::{
    CharCounter, ChatEvent, ChatWidget, ClearRequest, GateClient, Generation, ToastKind,
    WidgetEffect,
};

#[derive(Debug, Parser)]
#[command(name = "aries-chat")]
#[command(version, about = "Chat with the AriesBerriesCompany assistant", long_about = None)]
struct Cli {
    /// Chat endpoint of the gate
    #[arg(long, env = "ARIES_CHAT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the reply text.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| cli.log.parse::<tracing_subscriber::EnvFilter>())
        .unwrap_or_else(|e| {
            eprintln!("WARN: --log '{}' is not a valid tracing filter ({e}); falling back to 'warn'", cli.log);
            tracing_subscriber::EnvFilter::new("warn")
        });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = GateClient::new(&cli.endpoint)
        .with_context(|| format!("cannot use endpoint {}", cli.endpoint))?;
    println!("Connected to {}. Commands: /clear /retry /quit", client.endpoint());

    Host::new(client).run().await
}

struct Host {
    widget: ChatWidget,
    client: GateClient,
    in_flight: Option<Generation>,
    /// Tags events so that stragglers of an aborted request are dropped.
    generation: u64,
    events_tx: mpsc::UnboundedSender<(u64, ChatEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, ChatEvent)>,
    confirming_clear: bool,
    last_toast: u64,
}

impl Host {
    fn new(client: GateClient) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut widget = ChatWidget::new();
        // The terminal is the panel: always open.
        widget.toggle_panel();
        Self {
            widget,
            client,
            in_flight: None,
            generation: 0,
            events_tx,
            events_rx,
            confirming_clear: false,
            last_toast: 0,
        }
    }

    async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        prompt()?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !self.on_line(line.trim())? {
                        break;
                    }
                }
                Some((generation, event)) = self.events_rx.recv() => {
                    if generation == self.generation {
                        self.on_event(event)?;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    if !self.widget.status().is_busy() {
                        break;
                    }
                    let effects = self.widget.stop()?;
                    self.run_effects(effects)?;
                }
                _ = ticker.tick() => self.widget.tick(Instant::now()),
            }
            self.show_toasts();
        }

        if let Some(generation) = self.in_flight.take() {
            generation.abort();
        }
        println!();
        Ok(())
    }

    /// Handle one input line; `false` ends the session.
    fn on_line(&mut self, line: &str) -> anyhow::Result<bool> {
        if std::mem::take(&mut self.confirming_clear) {
            if matches!(line, "y" | "Y" | "yes") {
                self.widget.confirm_clear()?;
            } else {
                self.widget.cancel_clear();
            }
            prompt()?;
            return Ok(true);
        }

        match line {
            "/quit" => return Ok(false),
            "/clear" => match self.widget.request_clear() {
                Ok(ClearRequest::Cleared) => prompt()?,
                Ok(ClearRequest::NeedsConfirmation) => {
                    print!("Are you sure you want to clear the conversation? [y/N] ");
                    std::io::stdout().flush()?;
                    self.confirming_clear = true;
                }
                Err(_) => println!("(a reply is streaming; press Ctrl+C to stop it first)"),
            },
            "/retry" => match self.widget.retry() {
                Ok(effects) => self.run_effects(effects)?,
                Err(_) => println!("(nothing to retry)"),
            },
            text => {
                if self.widget.status().is_busy() {
                    println!("(still replying; press Ctrl+C to stop)");
                    return Ok(true);
                }
                self.widget.set_input(text);
                match self.widget.counter() {
                    CharCounter::Hidden => {}
                    CharCounter::Shown { count, max } => println!("({count}/{max})"),
                    CharCounter::Warning { count, max } => eprintln!("! {count}/{max} characters"),
                }
                let effects = self.widget.submit(Instant::now());
                if effects.is_empty() {
                    self.show_toasts();
                    prompt()?;
                }
                self.run_effects(effects)?;
            }
        }
        Ok(true)
    }

    fn on_event(&mut self, event: ChatEvent) -> anyhow::Result<()> {
        let effects = match self.widget.apply(event.clone()) {
            Ok(effects) => effects,
            Err(e) => {
                debug!(error = %e, "dropped gate event");
                return Ok(());
            }
        };

        match event {
            ChatEvent::ChunkReceived(text) => print!("{text}"),
            ChatEvent::StreamEnd | ChatEvent::Error(_) => {
                self.in_flight = None;
                println!();
                self.show_toasts();
                if self.widget.last_error().is_some() {
                    println!("(type /retry to try again)");
                }
                prompt()?;
            }
            _ => {}
        }
        self.run_effects(effects)
    }

    fn run_effects(&mut self, effects: Vec<WidgetEffect>) -> anyhow::Result<()> {
        for effect in effects {
            match effect {
                WidgetEffect::SendRequest(messages) => {
                    self.generation += 1;
                    let tag = self.generation;
                    let (generation, mut events) = self.client.send(messages);
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        use futures::StreamExt;
                        while let Some(event) = events.next().await {
                            if tx.send((tag, event)).is_err() {
                                break;
                            }
                        }
                    });
                    self.in_flight = Some(generation);
                    print!("assistant> ");
                }
                WidgetEffect::CancelRequest => {
                    if let Some(generation) = self.in_flight.take() {
                        generation.abort();
                    }
                    println!(" [stopped]");
                    prompt()?;
                }
                // The terminal scrolls by itself; flushing shows the text.
                WidgetEffect::ScrollToEnd => std::io::stdout().flush()?,
                WidgetEffect::FocusInput { .. } => {}
            }
        }
        Ok(())
    }

    fn show_toasts(&mut self) {
        for toast in self.widget.toasts() {
            if toast.id <= self.last_toast {
                continue;
            }
            self.last_toast = toast.id;
            match toast.kind {
                ToastKind::Error => eprintln!("! {}", toast.message),
                ToastKind::Success => println!("* {}", toast.message),
            }
        }
    }
}

fn prompt() -> std::io::Result<()> {
    print!("you> ");
    std::io::stdout().flush()
}
