// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `beacon work` and `beacon run-once`.

use beacon_core::BeaconError;
use tracing::info;

use crate::app::App;
use crate::shutdown;

/// Process the queue until SIGINT or SIGTERM.
pub async fn run_work(app: &App) -> Result<(), BeaconError> {
    let cancel = shutdown::install_signal_handler();
    app.worker().run(cancel).await;
    app.shutdown().await?;
    info!("shutdown complete");
    Ok(())
}

/// One worker pass, for cron-style scheduling.
pub async fn run_once(app: &App) -> Result<(), BeaconError> {
    let report = app.worker().run_once().await?;
    println!(
        "claimed {} | sent {} | requeued {} | dead {} | recovered {} | lapsed {} | errors {}",
        report.claimed,
        report.sent,
        report.requeued,
        report.dead,
        report.recovered,
        report.lapsed,
        report.errors
    );
    if report.errors > 0 {
        return Err(BeaconError::Internal(format!(
            "{} outcomes could not be recorded",
            report.errors
        )));
    }
    Ok(())
}
