//! Upload-url command - mint an upload grant from the command line.
//!
//! Grants live in the process that issued them. With `--upload` the grant
//! is redeemed right away and the file runs through the pipeline; browser
//! uploads go through `idp serve` instead.

use std::path::PathBuf;

use clap::Args;
use console::style;

use idp_core::storage::ObjectStore;

use super::LocalContext;

/// Arguments for the upload-url command.
#[derive(Args)]
pub struct UploadUrlArgs {
    /// Name of the file to be uploaded
    filename: String,

    /// Content type the upload will carry
    #[arg(long)]
    content_type: Option<String>,

    /// Print the grant as JSON
    #[arg(long)]
    json: bool,

    /// Redeem the grant with this file and run the pipeline
    #[arg(long)]
    upload: Option<PathBuf>,
}

pub async fn run(args: UploadUrlArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ctx = LocalContext::load(config_path)?;
    let grant = ctx
        .facade()
        .request_upload_grant(Some(&args.filename), args.content_type.as_deref())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&grant)?);
    } else {
        println!("{} {}", style("key:").bold(), grant.key);
        println!("{} {}", style("url:").bold(), grant.upload_url);
        println!("{} {}", style("expires:").bold(), grant.expires_at.to_rfc3339());
    }

    if let Some(path) = &args.upload {
        let token = grant
            .upload_url
            .split_once("?token=")
            .and_then(|(_, rest)| rest.split('&').next())
            .ok_or_else(|| anyhow::anyhow!("Upload URL carries no token: {}", grant.upload_url))?;

        let pipeline = ctx.pipeline();
        ctx.objects
            .put_with_grant(&grant.key, token, std::fs::read(path)?)
            .await?;
        pipeline.document_stored(&grant.key).await?;

        let reports = pipeline.settle().await;
        let failed = reports.iter().filter(|r| !r.is_delivered()).count();
        if failed > 0 {
            anyhow::bail!("{} of {} deliveries failed for {}", failed, reports.len(), grant.key);
        }
        eprintln!(
            "{} Uploaded {} as {}",
            style("✓").green(),
            path.display(),
            grant.key
        );
    }

    Ok(())
}
