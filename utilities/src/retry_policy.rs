use crate::result::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Runs `f` until it succeeds or `max_retries` attempts failed, sleeping
/// `base_delay * 2^attempt` between attempts.
pub async fn retry_with_backoff<F, Fut, R>(mut f: F, max_retries: u8, base_delay: Duration) -> Result<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let mut curr_try: u32 = 1;
    loop {
        match f().await {
            Ok(v) => {
                return Ok(v);
            }
            Err(e) => {
                error!(error=%e,retry=%curr_try,"Error happened while running closure");
                if curr_try >= max_retries as u32 {
                    error!("Reached max retries return error");
                    return Err(e);
                }
            }
        }
        let sleep_duration = base_delay * 2u32.pow(curr_try);
        curr_try += 1;
        info!(?sleep_duration, "Waiting before retry");
        sleep(sleep_duration).await;
    }
}
