use playbook_core::config::ExecutorConfig;
use playbook_runner::{
    CancellationToken, OutputEvent, OutputSubscription, PlaybookExecutor, Received,
};
use std::path::Path;

pub fn run(
    config: &ExecutorConfig,
    playbook: &Path,
    inventory: &Path,
    run_id: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut book = super::load_playbook(playbook, run_id)?;
    if let Some(id) = run_id {
        book.id = id.to_string();
    }
    let inventory = super::load_inventory(inventory)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let executor = PlaybookExecutor::from_config(config);
        let subscription = executor.subscribe_run(book.id.clone());
        let printer = tokio::spawn(print_output(subscription, json));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });

        let result = executor.execute(&cancel, &book, &inventory).await;

        // Runs that fail before the runner starts are never marked finished;
        // dropping the executor drops the hub and ends the subscription.
        drop(executor);
        if let Err(e) = printer.await {
            tracing::warn!(error = %e, "output printer failed");
        }

        result.map_err(anyhow::Error::from)
    })
}

async fn print_output(mut subscription: OutputSubscription, json: bool) {
    while let Some(received) = subscription.recv().await {
        match received {
            Received::Event(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode output event"),
            },
            Received::Event(OutputEvent::Line(line)) => {
                println!("[{}] {}", line.source.as_str(), line.line);
            }
            Received::Event(OutputEvent::Closed { .. }) => {}
            Received::Lagged { source, skipped } => {
                eprintln!("[{}] ... {skipped} lines dropped", source.as_str());
            }
        }
    }
}
