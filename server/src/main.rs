use std::error::Error as _;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use campi_core::{
    CameraController, ChunkPathAllocator, MockCamera, MockPanel, PanelButton, PanelObserver,
    SensorPanel,
};
use campi_server::{create_app, AppContext, DEFAULT_TOGGLE_TOKEN};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tower::Service;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let recordings_dir = std::env::var("CAMPI_RECORDINGS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./recordings"));
    let chunk_secs: u64 = std::env::var("CAMPI_CHUNK_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);
    let listen_addr =
        std::env::var("CAMPI_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let toggle_token =
        std::env::var("CAMPI_TOGGLE_TOKEN").unwrap_or_else(|_| DEFAULT_TOGGLE_TOKEN.to_string());

    let allocator = Arc::new(
        ChunkPathAllocator::new(vec![recordings_dir]).expect("no writable recording location"),
    );

    // The real hardware driver is swapped in here on devices that have
    // one; the stub keeps the full surface usable everywhere else.
    let device = Arc::new(MockCamera::new());
    let controller = CameraController::new(device, allocator, Duration::from_secs(chunk_secs));
    controller
        .open()
        .await
        .expect("failed to open capture device");

    let panel: Arc<dyn SensorPanel> = Arc::new(MockPanel::new());
    controller.attach_observer(Arc::new(PanelObserver::new(panel.clone())));

    // Joystick control mirrors the web controls.
    let button_controller = controller.clone();
    panel.register_buttons(Box::new(move |button| match button {
        PanelButton::StartRecording => button_controller.start_recording(),
        PanelButton::StopRecording => {
            button_controller.stop_recording();
        }
        PanelButton::StartStreaming => button_controller.set_output_allowed(true),
        PanelButton::StopStreaming => button_controller.set_output_allowed(false),
    }));

    let state = Arc::new(AppContext {
        controller: controller.clone(),
        panel,
        toggle_token,
    });
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await.unwrap();
    info!("campi server listening on http://{}", listen_addr);
    info!(
        "recordings base: {}",
        controller.recordings_base().display()
    );

    // Auto-negotiating server so MJPEG/SSE connections work over both
    // HTTP/1.1 and HTTP/2; each accepted connection gets its own task.
    let conn_builder = ConnBuilder::new(hyper_util::rt::TokioExecutor::new());

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("accept failed: {}", e);
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                controller.close().await;
                break;
            }
        };
        debug!("new connection from {}", addr);
        let io = TokioIo::new(stream);
        let app_clone = app.clone();
        let conn_builder = conn_builder.clone();

        tokio::spawn(async move {
            if let Err(err) = conn_builder
                .serve_connection_with_upgrades(
                    io,
                    hyper::service::service_fn(move |req| app_clone.clone().call(req)),
                )
                .await
            {
                // A client dropping its stream mid-flight is a normal end
                // of that connection, not a server fault.
                let is_normal_close = err
                    .source()
                    .and_then(|e| e.downcast_ref::<io::Error>())
                    .map(|io_err| {
                        matches!(
                            io_err.kind(),
                            io::ErrorKind::ConnectionReset
                                | io::ErrorKind::BrokenPipe
                                | io::ErrorKind::UnexpectedEof
                        )
                    })
                    .unwrap_or(false);

                if is_normal_close {
                    debug!("connection from {} closed normally", addr);
                } else {
                    error!("error serving connection from {}: {}", addr, err);
                }
            }
        });
    }
}
