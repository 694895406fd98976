//! Subcommand handlers

use std::io::Write;

use futures_util::StreamExt;
use sage_config::Vendor;
use sage_llm::provider::local::{LOCAL_PREFIX, local_model_id};
use sage_llm::{Message, Orchestrator, PartialRequest, estimate_tokens};
use tokio_util::sync::CancellationToken;

use crate::args::CompleteArgs;

pub async fn complete(orchestrator: &Orchestrator, args: CompleteArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.prompt.join(" ")));

    tracing::debug!(estimated_tokens = estimate_tokens(&messages), "prepared prompt");

    let mut request = PartialRequest::new(messages);
    request.model = args.model;
    request.params.temperature = args.temperature;
    request.params.max_tokens = args.max_tokens;

    // Local models are loaded explicitly before use
    if let Some(ref model) = request.model
        && model.starts_with(LOCAL_PREFIX)
    {
        let local = orchestrator
            .local()
            .ok_or_else(|| anyhow::anyhow!("no local models are configured"))?;
        local.load_model(local_model_id(model)).await?;
    }

    if args.stream {
        let mut stream = orchestrator.complete_stream(request).await?;
        let mut stdout = std::io::stdout();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    stream.close();
                    break;
                }
                item = stream.next() => {
                    let Some(item) = item else { break };
                    if let Some(content) = item?.delta.content {
                        write!(stdout, "{content}")?;
                        stdout.flush()?;
                    }
                }
            }
        }
        writeln!(stdout)?;
        return Ok(());
    }

    let completion = orchestrator.complete_with_attempts(request).await?;
    if args.verbose {
        for failed in &completion.failed_attempts {
            eprintln!("failed: {} {} ({})", failed.provider, failed.model, failed.message);
        }
        eprintln!(
            "served by {} {} ({} prompt / {} completion tokens)",
            completion.provider,
            completion.model,
            completion.response.usage.prompt_tokens,
            completion.response.usage.completion_tokens
        );
    }
    println!("{}", completion.response.text());
    Ok(())
}

pub async fn models(orchestrator: &Orchestrator, provider: Option<Vendor>) -> anyhow::Result<()> {
    if let Some(vendor) = provider {
        for model in orchestrator.list_models(vendor).await? {
            println!("{model}");
        }
        return Ok(());
    }

    let report = orchestrator.list_all_models().await;
    for (vendor, models) in &report.models {
        for model in models {
            println!("{vendor}\t{model}");
        }
    }
    for (vendor, message) in &report.failures {
        eprintln!("{vendor}: {message}");
    }
    Ok(())
}

pub async fn validate(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let results = orchestrator.validate_credentials().await;
    if results.is_empty() {
        anyhow::bail!("no providers are configured");
    }

    for (vendor, valid) in &results {
        println!("{vendor}\t{}", if *valid { "ok" } else { "invalid" });
    }

    if results.values().any(|valid| !valid) {
        anyhow::bail!("one or more credentials were rejected");
    }
    Ok(())
}

pub fn providers(orchestrator: &Orchestrator) {
    let default = orchestrator.registry().default_provider();
    for info in orchestrator.providers() {
        let marker = if Some(info.vendor) == default { "*" } else { " " };
        println!("{marker} {}\t{}\t{}", info.vendor, info.display_name, info.endpoint);
    }
}

pub async fn local(orchestrator: &Orchestrator, check: bool) -> anyhow::Result<()> {
    let local = orchestrator
        .local()
        .ok_or_else(|| anyhow::anyhow!("no local models are configured"))?;

    let ids: Vec<String> = local.configured_models().map(ToOwned::to_owned).collect();
    for id in ids {
        if !check {
            println!("{LOCAL_PREFIX}{id}");
            continue;
        }

        match local.load_model(&id).await {
            Ok(()) => {
                println!("{LOCAL_PREFIX}{id}\tok");
                local.unload_model(&id).await?;
            }
            Err(e) => println!("{LOCAL_PREFIX}{id}\t{e}"),
        }
    }
    Ok(())
}
