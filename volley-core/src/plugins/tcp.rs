use std::{
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use serde_json::json;
use volley_contracts::{JobContext, PluginError, ProtocolPlugin};

pub(super) const NAME: &str = "tcp";
pub const DEFAULT_PORT: u16 = 80;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect probe: a target is up when `target:port` accepts a TCP connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl ProtocolPlugin for TcpProbe {
    fn name(&self) -> &str {
        NAME
    }

    fn execute(&self, ctx: &JobContext<'_>) -> Result<(), PluginError> {
        let port = ctx.config().port.unwrap_or(DEFAULT_PORT);
        let connect_timeout = ctx
            .config()
            .timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        let mut last_error = None;
        for addr in (ctx.target().as_str(), port).to_socket_addrs()? {
            ctx.checkpoint()?;
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    let _ = stream.shutdown(Shutdown::Both);
                    tracing::debug!(target: "volley::tcp", host = %ctx.target(), addr = %addr, "port open");
                    ctx.record("reachable", json!({ "address": addr.to_string(), "port": port }));
                    return ctx.run_module();
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(match last_error {
            Some(err) => err.into(),
            None => PluginError::failed(format!("{} did not resolve", ctx.target())),
        })
    }
}
