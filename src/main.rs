use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use switchboard::Host;
use switchboard::model::config::AppConfig;
use switchboard::msg::Msg;
use switchboard::plugin::envelope::CompilationReport;
use switchboard::plugin::{ChannelEndpoint, InboundMessage, PluginDescriptor, PluginId, Posted};

/// One line of host input on stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum HostEvent {
    Register { title: String, url: String },
    Unregister { title: String },
    TabChanged { tab: String },
    CompilationFinished {
        success: bool,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        source: Value,
    },
    Message { source: String, origin: String, data: String },
    Quit,
}

impl From<HostEvent> for Msg {
    fn from(event: HostEvent) -> Self {
        match event {
            HostEvent::Register { title, url } => Msg::Register(PluginDescriptor::new(title, url)),
            HostEvent::Unregister { title } => Msg::Unregister(PluginId::new(title)),
            HostEvent::TabChanged { tab } => Msg::TabChanged(tab),
            HostEvent::CompilationFinished {
                success,
                data,
                source,
            } => Msg::CompilationFinished(CompilationReport {
                success,
                data,
                source,
            }),
            HostEvent::Message {
                source,
                origin,
                data,
            } => Msg::Inbound(InboundMessage {
                source: PluginId::new(source),
                origin,
                data,
            }),
            HostEvent::Quit => Msg::Quit,
        }
    }
}

fn main() -> Result<()> {
    let config = AppConfig::load()?;

    // Initialize logging to file (never stdout)
    let log_dir = directories::ProjectDirs::from("", "", "switchboard")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "switchboard.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_filter));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .init();

    tracing::info!("switchboard starting");

    let result = run(config);
    if let Err(e) = &result {
        tracing::error!("switchboard error: {e:?}");
    }
    result
}

fn run(config: AppConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel::<Msg>();
    let (post_tx, post_rx) = mpsc::channel::<Posted>();
    let mut host = Host::new(&config, tx.clone(), ChannelEndpoint::connector(post_tx))?;

    // Input thread — reads host events from stdin and forwards as Msg
    let tx_input = tx.clone();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HostEvent>(&line) {
                Ok(event) => {
                    if tx_input.send(event.into()).is_err() {
                        return;
                    }
                }
                Err(err) => tracing::warn!("ignoring input line: {err}"),
            }
        }
        let _ = tx_input.send(Msg::Quit);
    });

    // Output thread — one line per post: plugin, target origin, payload
    let printer = thread::spawn(move || -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for posted in post_rx {
            writeln!(out, "{}\t{}\t{}", posted.to, posted.target_origin, posted.message)?;
            out.flush()?;
        }
        Ok(())
    });

    // ── Main event loop ──
    loop {
        // Batch-drain all pending messages
        let first = rx.recv()?;
        host.update(first)?;

        while let Ok(msg) = rx.try_recv() {
            host.update(msg)?;
        }

        if host.should_quit {
            break;
        }
    }

    tracing::info!(
        "switchboard stopping, {} calls still in flight",
        host.broker().pending_count()
    );

    // Dropping the host closes the outbound channel so the printer can finish.
    drop(host);
    match printer.join() {
        Ok(result) => result?,
        Err(_) => tracing::error!("output thread panicked"),
    }

    Ok(())
}
