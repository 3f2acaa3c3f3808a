use crate::resolver::QueryResolver;
use crate::session::SessionPolicy;
use crate::websocket::handle_connection;
use std::error::Error;
use std::sync::Arc;
use std::num::NonZeroU32;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ ErrorResponse, Request, Response };
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use log::{ info, warn, error, debug };

const CREDENTIAL_HEADER: &str = "X-Completion-Key";
const CREDENTIAL_QUERY_PARAM: &str = "credential";

pub struct Server {
    addr: String,
    resolver: Arc<QueryResolver>,
    policy: SessionPolicy,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

/// Credential offered by the client during the handshake, header first.
fn presented_credential(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get(CREDENTIAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    from_header
        .or_else(|| {
            req.uri()
                .query()
                .and_then(|q| {
                    url::form_urlencoded
                        ::parse(q.as_bytes())
                        .find(|(k, _)| k == CREDENTIAL_QUERY_PARAM)
                        .map(|(_, v)| v.into_owned())
                })
        })
        .filter(|k| !k.trim().is_empty())
}

impl Server {
    pub fn new(
        addr: String,
        resolver: Arc<QueryResolver>,
        policy: SessionPolicy,
        connections_per_second: u32
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let rate = NonZeroU32::new(connections_per_second).ok_or(
            "connections per second must be greater than zero"
        )?;

        if policy.preset_credential.is_some() {
            info!("Sessions start with the operator-supplied completion credential.");
        } else if policy.skip_prompt {
            warn!("No completion credential configured. Sessions use rule-based replies unless clients supply one.");
        } else {
            info!("Sessions will ask clients for a completion credential.");
        }

        Ok(Self {
            addr,
            resolver,
            policy,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!("WS server listening on: {}", self.addr);

        loop {
            let (stream, peer) = listener.accept().await?;

            if self.limiter.check().is_err() {
                warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
                continue;
            }

            info!("Incoming connection from: {}", peer);
            let resolver = Arc::clone(&self.resolver);
            let policy = self.policy.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::process_connection(peer, stream, resolver, policy).await {
                    error!("Failed to process connection for {}: {}", peer, e);
                }
            });
        }
    }

    async fn process_connection<S>(
        peer: SocketAddr,
        stream: S,
        resolver: Arc<QueryResolver>,
        policy: SessionPolicy
    ) -> Result<(), Box<dyn Error + Send + Sync>>
        where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
    {
        let mut presented: Option<String> = None;
        let capture_credential = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            debug!("Handshake from {}", peer);
            presented = presented_credential(req);
            if presented.is_some() {
                info!("{} presented a completion credential at handshake", peer);
            }
            Ok(response)
        };

        let handshake = accept_hdr_async(stream, capture_credential).await;
        match handshake {
            Ok(ws) => {
                let session = policy.open(&resolver.prompts().greeting, presented.as_deref());
                handle_connection(peer, ws, resolver, session).await;
                Ok(())
            }
            Err(e) => {
                error!("Handshake failed for {}: {}", peer, e);
                Err(Box::new(e) as _)
            }
        }
    }
}
