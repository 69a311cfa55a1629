use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use surge_client::Connection;
use surge_common::{Result, SurgeError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::Scenario;

pub const NAVIGATOR_PAGES: &[&str] = &["/", "/counter", "/fetchdata"];
pub const ORDER_FLOW: &[&str] = &["/", "/specials", "/configure/1", "/checkout", "/myorders/1"];
pub const ROGUE_PAGES: &[&str] = &["/", "/counter", "/fetchdata", "/specials"];

/// Every connection cycles through the app's main pages.
pub struct Navigator;

/// Every connection opens the counter page and keeps pressing its button.
pub struct Clicker;

/// Every connection requests random pages in bursts of irregular size.
pub struct Rogue;

/// Every connection repeats the pizza order flow from home page to order status.
pub struct BlazingPizza;

/// Every connection repeatedly drops and re-opens its session.
pub struct Reconnects;

#[async_trait]
impl Scenario for Navigator {
    async fn run(&self, connections: &[Arc<dyn Connection>], cancel: CancellationToken) -> Result<()> {
        drive(connections, &cancel, |conn, cancel| cycle(conn, cancel, NAVIGATOR_PAGES)).await
    }
}

#[async_trait]
impl Scenario for Clicker {
    async fn run(&self, connections: &[Arc<dyn Connection>], cancel: CancellationToken) -> Result<()> {
        drive(connections, &cancel, click).await
    }
}

#[async_trait]
impl Scenario for Rogue {
    async fn run(&self, connections: &[Arc<dyn Connection>], cancel: CancellationToken) -> Result<()> {
        drive(connections, &cancel, roam).await
    }
}

#[async_trait]
impl Scenario for BlazingPizza {
    async fn run(&self, connections: &[Arc<dyn Connection>], cancel: CancellationToken) -> Result<()> {
        drive(connections, &cancel, |conn, cancel| cycle(conn, cancel, ORDER_FLOW)).await
    }
}

#[async_trait]
impl Scenario for Reconnects {
    async fn run(&self, connections: &[Arc<dyn Connection>], cancel: CancellationToken) -> Result<()> {
        drive(connections, &cancel, reconnect).await
    }
}

/// Run `per_connection` on its own task for every connection.
///
/// The first failure cancels the remaining connections through a child
/// token and is returned once every task has finished.
async fn drive<F, Fut>(
    connections: &[Arc<dyn Connection>],
    cancel: &CancellationToken,
    per_connection: F,
) -> Result<()>
where
    F: Fn(Arc<dyn Connection>, CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let siblings = cancel.child_token();
    let mut tasks = JoinSet::new();
    for conn in connections {
        tasks.spawn(per_connection(Arc::clone(conn), siblings.clone()));
    }

    let mut first_failure = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(SurgeError::ScenarioRuntime(e.to_string())));
        if let Err(e) = outcome {
            siblings.cancel();
            first_failure.get_or_insert(e);
        }
    }
    first_failure.map_or(Ok(()), Err)
}

/// Request `path`, giving up if `cancel` fires first.
/// Returns `Ok(false)` when cancelled; the in-flight request is abandoned.
async fn visit(conn: &Arc<dyn Connection>, cancel: &CancellationToken, path: &str) -> Result<bool> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(false),
        sent = conn.send(path) => sent.map(|_| true),
    }
}

async fn cycle(conn: Arc<dyn Connection>, cancel: CancellationToken, pages: &'static [&'static str]) -> Result<()> {
    for page in pages.iter().cycle() {
        if !visit(&conn, &cancel, page).await? {
            break;
        }
    }
    Ok(())
}

async fn click(conn: Arc<dyn Connection>, cancel: CancellationToken) -> Result<()> {
    if !visit(&conn, &cancel, "/counter").await? {
        return Ok(());
    }
    while visit(&conn, &cancel, "/counter/increment").await? {}
    Ok(())
}

async fn roam(conn: Arc<dyn Connection>, cancel: CancellationToken) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    loop {
        let burst: usize = rng.gen_range(1..=8);
        for _ in 0..burst {
            let page = ROGUE_PAGES[rng.gen_range(0..ROGUE_PAGES.len())];
            if !visit(&conn, &cancel, page).await? {
                return Ok(());
            }
        }
        let idle = Duration::from_millis(rng.gen_range(0..50));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(idle) => {}
        }
    }
}

async fn reconnect(conn: Arc<dyn Connection>, cancel: CancellationToken) -> Result<()> {
    while !cancel.is_cancelled() {
        conn.dispose().await?;
        match conn.initialize(&cancel).await {
            Err(_) if cancel.is_cancelled() => return Ok(()),
            outcome => outcome?,
        }
        if !visit(&conn, &cancel, "/").await? {
            return Ok(());
        }
    }
    Ok(())
}
