//! `network:fix`: best-effort host network repair

use anyhow::Result;
use dapp_bk_core::network_fix::fix_network;
use dapp_bk_core::{OsFamily, SystemRunner};

use super::{spawn_printer, title};

/// Entry point for `dapp-bk network:fix`. Always succeeds; failed steps are
/// reported inline.
pub async fn network_fix() -> Result<()> {
    title("Docker Network Fix");

    let (tx, printer) = spawn_printer();
    let reports = fix_network(&SystemRunner, OsFamily::current(), Some(&tx)).await;
    drop(tx);
    let _ = printer.await;

    let failed = reports.iter().filter(|r| !r.success).count();
    if failed > 0 {
        tracing::debug!("{} of {} network fix steps failed", failed, reports.len());
    }

    Ok(())
}
