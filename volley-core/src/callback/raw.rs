use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use volley_contracts::CallbackRequest;
use volley_model::ServerKind;

use super::{CallbackError, CallbackHandle, CallbackState, bind_error, dispatch};

/// Upper bound on the initial payload handed to the module.
const MAX_INITIAL_PAYLOAD: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw TCP transport behind the `smb` kind. No SMB framing: the module sees
/// the first bytes a peer sends and its response body is written back.
pub(super) async fn serve(
    state: CallbackState,
    host: &str,
    port: u16,
) -> Result<CallbackHandle, CallbackError> {
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|err| bind_error(host, port, err))?;
    let local_addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(accept_loop(listener, Arc::new(state), shutdown.clone()));

    Ok(CallbackHandle::new(ServerKind::Smb, host, local_addr, shutdown, task))
}

async fn accept_loop(listener: TcpListener, state: Arc<CallbackState>, shutdown: CancellationToken) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(stream, peer, Arc::clone(&state)));
                }
                Err(err) => {
                    tracing::warn!(target: "volley::callback", error = %err, "accept failed");
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    connections.shutdown().await;
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, state: Arc<CallbackState>) {
    let mut payload = vec![0u8; MAX_INITIAL_PAYLOAD];
    let read = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut payload)).await {
        Ok(Ok(read)) => read,
        Ok(Err(err)) => {
            tracing::debug!(target: "volley::callback", peer = %peer, error = %err, "read failed");
            return;
        }
        // Peers that connect and wait still reach the module, with an empty payload.
        Err(_) => 0,
    };
    payload.truncate(read);

    let request = CallbackRequest {
        peer,
        kind: ServerKind::Smb,
        method: None,
        path: None,
        query: None,
        headers: Vec::new(),
        body: payload,
    };
    let response = dispatch(state, request).await;

    if !response.body.is_empty()
        && let Err(err) = stream.write_all(&response.body).await
    {
        tracing::debug!(target: "volley::callback", peer = %peer, error = %err, "write failed");
    }
    let _ = stream.shutdown().await;
}
