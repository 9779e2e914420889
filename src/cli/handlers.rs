use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analysis::Analysis;
use crate::cli::commands::{parse_measurement, Measurement};
use crate::config::Settings;
use crate::error::Error;
use crate::storage::{FileSystem, LocalFileSystem, RecordStore};
use crate::worker::RecorderHandle;

fn local() -> Arc<dyn FileSystem> {
    Arc::new(LocalFileSystem)
}

async fn open(settings: &Settings) -> Result<RecorderHandle> {
    let directory = &settings.store.directory;
    RecorderHandle::load_store(local(), settings.worker.clone(), directory.clone())
        .await
        .with_context(|| format!("Failed to open store at {}", directory.display()))
}

pub async fn handle_init(settings: &Settings) -> Result<()> {
    let store = &settings.store;
    let handle = RecorderHandle::create_store(
        local(),
        settings.worker.clone(),
        store.directory.clone(),
        store.group_size,
        &store.windows,
    )
    .await
    .with_context(|| format!("Failed to create store at {}", store.directory.display()))?;
    handle.shutdown().await?;

    println!("Created store at {}", store.directory.display());
    Ok(())
}

pub async fn handle_append(settings: &Settings, value: &str) -> Result<()> {
    let measurement = match parse_measurement(value) {
        Some(m) => m,
        None => bail!("'{}' is neither a time nor DNF", value),
    };

    let handle = open(settings).await?;
    let appended = match measurement {
        Measurement::Time(time) => handle.append(time).await,
        Measurement::Dnf => handle.append_dnf().await,
    };
    let sequence = match appended {
        Ok(sequence) => sequence,
        Err(e) if e.is_not_durable() => {
            warn!("{}", e);
            handle.sync().await.context("Failed to persist the appended sample")?;
            handle.statistics().total.saturating_sub(1)
        }
        Err(e) => return Err(e).context("Failed to append sample"),
    };

    let stats = handle.statistics();
    handle.shutdown().await?;

    println!("#{} recorded", sequence);
    println!("{}", serde_json::to_string_pretty(&*stats)?);
    Ok(())
}

pub async fn handle_stats(settings: &Settings) -> Result<()> {
    let handle = open(settings).await?;
    let stats = handle.statistics();
    handle.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&*stats)?);
    Ok(())
}

pub async fn handle_export(settings: &Settings, output: Option<&Path>) -> Result<()> {
    let handle = open(settings).await?;
    let document = handle.export().await.context("Failed to export store")?;
    handle.shutdown().await?;

    let text = serde_json::to_string_pretty(&document)?;
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Exported store");
        }
        None => println!("{}", text),
    }
    Ok(())
}

pub async fn handle_analyse(settings: &Settings) -> Result<()> {
    let handle = open(settings).await?;
    let windows: Vec<_> = handle.statistics().windows.keys().copied().collect();
    let samples = handle.samples().await.context("Failed to read samples")?;
    handle.shutdown().await?;

    let analysis = Analysis::from_samples(&samples, &windows);
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

pub async fn handle_delete(settings: &Settings) -> Result<()> {
    let directory = &settings.store.directory;
    let deleted = match open(settings).await {
        Ok(handle) => {
            let deleted = handle.delete().await.context("Failed to delete store")?;
            handle.shutdown().await?;
            deleted
        }
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::StoreFormat(_))) => {
            warn!("Store is unreadable, removing directory: {:#}", e);
            RecordStore::destroy(local().as_ref(), directory)?
        }
        Err(e) => return Err(e),
    };

    if deleted {
        println!("Deleted {}", directory.display());
    } else {
        println!("Nothing to delete at {}", directory.display());
    }
    Ok(())
}
