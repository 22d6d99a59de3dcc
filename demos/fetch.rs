use std::time::Duration;

use reqwest::Url;
use xfer_retry::{OperationContext, RetryOptions, RetryPolicy, TransferRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url: Url = std::env::var("XFER_URL")?.parse()?;

    // Policy knobs come from XFER_RETRY_* variables; unset ones use defaults.
    let config = RetryOptions::from_env()?.validate()?;
    let policy = RetryPolicy::new(config);

    let ctx = OperationContext::new().with_timeout(Duration::from_secs(300));
    let response = policy.execute(&ctx, TransferRequest::get(url)).await?;

    println!(
        "{} from {:?} after {} attempt(s)",
        response.status(),
        response.endpoint(),
        response.attempts()
    );
    let body = response.bytes().await?;
    println!("{} bytes", body.len());

    Ok(())
}
