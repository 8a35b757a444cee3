mod jobs;
mod stores;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use remit_custodial::CustodialClient;
use remit_db::{PgPoolOpener, PgTenantDirectory, PoolConfig, TenantDirectory, TenantPoolRouter};
use remit_dispatch::{
    CustodialDispatcher, DispatchSelector, DistributionBackendResolver, LedgerDispatcher,
    PaymentStore, TenantBackendResolver,
};
use remit_scheduler::{ChannelReporter, Scheduler, SchedulerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::stores::{PgPaymentStore, PgSubmissionQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(remit_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(env = %config.env, "starting remit-server");

    let pool_config = PoolConfig::from_app_config(&config);
    let admin_pool = remit_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("connecting to the admin database")?;
    let submitter_pool = remit_db::connect_pool(&config.submitter_database_url, pool_config)
        .await
        .context("connecting to the submitter database")?;

    let tenants: Arc<dyn TenantDirectory> = Arc::new(PgTenantDirectory::new(
        admin_pool.clone(),
        config.database_url.clone(),
    ));
    let router = Arc::new(TenantPoolRouter::new(
        Arc::clone(&tenants),
        PgPoolOpener::new(pool_config),
    ));
    let resolver: Arc<dyn DistributionBackendResolver> = Arc::new(TenantBackendResolver::new(
        Arc::clone(&tenants),
        config.host_distribution_account.clone(),
    )?);

    let payments: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(Arc::clone(&router)));
    let ledger = LedgerDispatcher::new(
        Arc::clone(&payments),
        Arc::new(PgSubmissionQueue::new(submitter_pool.clone())),
    );
    let custodial = match &config.custodial {
        Some(custodial_config) => {
            let client = CustodialClient::from_config(custodial_config)?;
            Some(CustodialDispatcher::new(
                Arc::clone(&payments),
                Arc::new(client),
            ))
        }
        None => {
            tracing::info!("CUSTODIAL_API_KEY not set; custodial backend disabled");
            None
        }
    };
    let selector = Arc::new(DispatchSelector::new(ledger, custodial));

    let registry = jobs::build_registry(&config, Arc::clone(&router), &resolver, &selector)
        .context("registering jobs")?;
    let (reporter, report_sink) = ChannelReporter::spawn_sink();
    let mut scheduler = Scheduler::new(
        registry,
        tenants,
        Box::new(reporter),
        SchedulerConfig::from_app_config(&config),
    )?;

    let root = CancellationToken::new();
    scheduler.start(&root);

    shutdown_signal().await;

    scheduler.stop();
    scheduler
        .wait(Duration::from_secs(config.shutdown_grace_secs))
        .await;
    router.close_all().await;
    submitter_pool.close().await;
    admin_pool.close().await;

    // The sink finishes once the last reporter is gone.
    drop(scheduler);
    match tokio::time::timeout(Duration::from_secs(1), report_sink).await {
        Ok(Ok(totals)) => tracing::info!(
            errors = totals.errors,
            panics = totals.panics,
            "scheduler: failure totals for this run"
        ),
        Ok(Err(e)) => tracing::warn!(error = %e, "scheduler: report sink ended abnormally"),
        Err(_) => tracing::warn!("scheduler: report sink still busy at exit"),
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
