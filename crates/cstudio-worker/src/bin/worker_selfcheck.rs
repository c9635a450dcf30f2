use std::path::Path;
use std::process::Command;

use cstudio_media::check_encoder;
use cstudio_queue::{BackendKind, QueueConfig};
use cstudio_worker::{EncoderConfig, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    let encoder = EncoderConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_encoder(&encoder.ffmpeg_path)?;

    let queue = QueueConfig::from_env()?;
    config.check_lease(queue.lease)?;
    if queue.backend == BackendKind::Redis {
        ensure_env_present(&["REDIS_URL"])?;
    }
    if let Some(path) = &config.catalog_path {
        if !path.is_file() {
            return Err(anyhow::anyhow!("clip catalog not found: {}", path.display()));
        }
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_encoder(program: &Path) -> anyhow::Result<()> {
    let resolved = check_encoder(program)?;
    let output = Command::new(&resolved)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", resolved.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            resolved.display(),
            output.status
        ));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
