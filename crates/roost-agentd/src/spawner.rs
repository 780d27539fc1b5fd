use std::{sync::Arc, time::Duration};

use roost_api::{HttpClient, HttpMasterLink, WorkerApi, discover_public_ip};
use roost_exec::SpawnerController;
use tokio::{net::TcpListener, time};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SpawnerFile;

pub async fn run(mut file: SpawnerFile, shutdown: CancellationToken) -> anyhow::Result<()> {
    file.api.validate()?;
    let retry = file.register_retry();

    if file.spawner.use_public_ip {
        let timeout = Duration::from_millis(file.api.request_timeout_ms);
        let ip = discover_public_ip(&file.spawner.public_ip_url, timeout).await?;
        file.spawner.machine_ip = ip.to_string();
    }

    let client = HttpClient::new(&file.api)?;
    let master = Arc::new(HttpMasterLink::new(client, &file.master_url, &file.endpoint)?);
    let controller = SpawnerController::new(file.spawner, master)?;

    // serve before registering: the master may dispatch right away
    let api = Arc::new(file.api);
    let router = WorkerApi::new(controller.clone(), api.clone()).router();
    let listener = TcpListener::bind(&api.listen).await?;
    info!(listen = %api.listen, endpoint = %file.endpoint, "spawner listening");
    let server_stop = CancellationToken::new();
    let server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(server_stop.clone().cancelled_owned())
            .into_future(),
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = controller.register() => match res {
                Ok(_) => {
                    controller.run_reporter(shutdown.clone()).await;
                    break;
                }
                Err(e) => {
                    warn!(master = %file.master_url, error = %e, "registration failed; retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = time::sleep(retry) => {}
                    }
                }
            },
        }
    }

    info!(running = controller.running(), "stopping spawned processes");
    controller.kill_all().await;
    server_stop.cancel();
    match server.await {
        Ok(res) => res?,
        Err(e) => warn!(error = %e, "http server ended abnormally"),
    }
    info!("spawner stopped");
    Ok(())
}
