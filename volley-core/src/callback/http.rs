use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use rustls::crypto::CryptoProvider;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use volley_contracts::{CallbackRequest, CallbackResponse};
use volley_model::{ServerKind, TlsPaths};

use super::{CallbackError, CallbackHandle, CallbackState, bind_error, dispatch};

const TLS_DRAIN: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct Listener {
    state: Arc<CallbackState>,
    kind: ServerKind,
}

fn router(state: CallbackState, kind: ServerKind) -> Router {
    Router::new().fallback(handle).with_state(Listener {
        state: Arc::new(state),
        kind,
    })
}

async fn handle(
    State(listener): State<Listener>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = CallbackRequest {
        peer,
        kind: listener.kind,
        method: Some(method.as_str().to_string()),
        path: Some(uri.path().to_string()),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect(),
        body: body.to_vec(),
    };

    into_http(dispatch(listener.state, request).await)
}

fn into_http(response: CallbackResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, response.body).into_response();
    for (name, value) in &response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().append(name, value);
            }
            _ => tracing::debug!(target: "volley::callback", header = %name, "dropping invalid response header"),
        }
    }
    out
}

pub(super) async fn serve_plain(
    state: CallbackState,
    host: &str,
    port: u16,
) -> Result<CallbackHandle, CallbackError> {
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|err| bind_error(host, port, err))?;
    let local_addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let app = router(state, ServerKind::Http).into_make_service_with_connect_info::<SocketAddr>();

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(err) = result {
            tracing::warn!(target: "volley::callback", error = %err, "http callback server exited with error");
        }
    });

    Ok(CallbackHandle::new(ServerKind::Http, host, local_addr, shutdown, task))
}

fn ensure_crypto_provider() {
    if CryptoProvider::get_default().is_none() {
        // Another thread may win the race; either provider works.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

pub(super) async fn serve_tls(
    state: CallbackState,
    host: &str,
    port: u16,
    tls: &TlsPaths,
) -> Result<CallbackHandle, CallbackError> {
    ensure_crypto_provider();
    let config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
        .await
        .map_err(|err| {
            CallbackError::Tls(format!(
                "failed to load {} / {}: {err}",
                tls.cert.display(),
                tls.key.display()
            ))
        })?;

    let addr = tokio::net::lookup_host((host, port))
        .await
        .map_err(|err| bind_error(host, port, err))?
        .next()
        .ok_or_else(|| {
            bind_error(
                host,
                port,
                io::Error::new(io::ErrorKind::AddrNotAvailable, "host did not resolve"),
            )
        })?;

    let handle: Handle<SocketAddr> = Handle::new();
    let app = router(state, ServerKind::Https).into_make_service_with_connect_info::<SocketAddr>();
    let server = axum_server::bind_rustls(addr, config).handle(handle.clone());
    let mut serving = tokio::spawn(async move { server.serve(app).await });

    let Some(local_addr) = handle.listening().await else {
        let source = match serving.await {
            Ok(Err(err)) => err,
            Ok(Ok(())) => io::Error::other("server exited before listening"),
            Err(err) => io::Error::other(err.to_string()),
        };
        return Err(bind_error(host, port, source));
    };

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        let result = tokio::select! {
            result = &mut serving => result,
            _ = token.cancelled() => {
                handle.graceful_shutdown(Some(TLS_DRAIN));
                serving.await
            }
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(target: "volley::callback", error = %err, "https callback server exited with error")
            }
            Err(err) => {
                tracing::warn!(target: "volley::callback", error = %err, "https callback server task failed")
            }
        }
    });

    Ok(CallbackHandle::new(ServerKind::Https, host, local_addr, shutdown, task))
}
