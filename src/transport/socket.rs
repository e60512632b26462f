//! Per-socket option configuration.

use super::TransportOptions;
use crate::{KEEPALIVE_IDLE, KEEPALIVE_INTERVAL};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tracing::warn;

/// Apply keep-alive and user-timeout hints to a freshly connected stream.
///
/// These are advisory: a refusal by the OS is logged and otherwise
/// ignored, the connection proceeds without the option.
pub(crate) fn configure(stream: &TcpStream, options: &TransportOptions) {
    let sock = SockRef::from(stream);

    if options.keepalive {
        let mut keepalive = TcpKeepalive::new()
            .with_time(KEEPALIVE_IDLE)
            .with_interval(KEEPALIVE_INTERVAL);
        #[cfg(not(windows))]
        {
            keepalive = keepalive.with_retries(crate::KEEPALIVE_PROBES);
        }
        if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
            warn!("failed to configure TCP keep-alive: {e}");
        }
    }

    if options.user_timeout {
        #[cfg(target_os = "linux")]
        if let Err(e) = sock.set_tcp_user_timeout(Some(crate::USER_TIMEOUT)) {
            warn!("failed to configure TCP user timeout: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn configure_accepts_all_flag_combinations() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        for (keepalive, user_timeout) in [(true, true), (true, false), (false, true), (false, false)]
        {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut options = TransportOptions::new(addr.ip().to_string(), addr.port());
            options.keepalive = keepalive;
            options.user_timeout = user_timeout;
            configure(&stream, &options);
        }
    }
}
