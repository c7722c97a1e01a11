/// Session protocol server
use crate::{
    config::SessionConfig,
    error::{AuthError, AuthResult},
    login::{LoginOutcome, RefreshOutcome},
    wire::{
        decode_request, encode_response, read_frame, write_frame, DecodeError, ErrorCode,
        FrameError, RequestBody, RequestEnvelope, ResponseBody, ResponseCache, ResponseEnvelope,
    },
};
use async_trait::async_trait;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

static CONN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Business operations reachable over the session protocol
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn login(
        &self,
        provider: &str,
        id_token: Option<&str>,
        device_id: Option<&str>,
    ) -> AuthResult<LoginOutcome>;

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshOutcome>;

    async fn logout(&self, refresh_token: &str) -> AuthResult<()>;
}

/// Serves session protocol connections. Cheap to clone; holds no
/// per-connection state.
#[derive(Clone)]
pub struct SessionService {
    handler: Arc<dyn RequestHandler>,
    cache_capacity: usize,
    max_frame_len: u32,
}

impl SessionService {
    pub fn new(handler: Arc<dyn RequestHandler>, config: &SessionConfig) -> Self {
        Self {
            handler,
            cache_capacity: config.cache_capacity,
            max_frame_len: config.max_frame_len,
        }
    }

    /// Run one connection until the peer hangs up or the transport fails.
    ///
    /// Request-level failures are answered in-band; only framing and IO
    /// errors end the connection.
    pub async fn serve<S>(&self, mut stream: S) -> Result<(), FrameError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut cache = ResponseCache::new(self.cache_capacity);

        while let Some(payload) = read_frame(&mut stream, self.max_frame_len).await? {
            let response = self.respond(&payload, &mut cache).await?;
            write_frame(&mut stream, &response).await?;
        }

        Ok(())
    }

    /// Produce the encoded response for one request payload
    async fn respond(
        &self,
        payload: &[u8],
        cache: &mut ResponseCache,
    ) -> Result<Vec<u8>, FrameError> {
        let started = Instant::now();

        let (req_id, kind, envelope) = match decode_request(payload) {
            Ok(request) => {
                let req_id = request.req_id;
                if let Some(cached) = cache.get(req_id) {
                    debug!(req_id, len = cached.len(), "duplicate request, resending cached response");
                    return Ok(cached.to_vec());
                }
                let kind = request.body.kind().to_string();
                (req_id, kind, self.dispatch(request).await)
            }
            Err(DecodeError::Envelope(reason)) => {
                // No usable request id, so nothing to cache under
                warn!(len = payload.len(), "undecodable payload: {}", reason);
                let envelope =
                    ResponseEnvelope::error(0, ErrorCode::InvalidArgument, "Malformed envelope");
                return encode(&envelope);
            }
            Err(DecodeError::Body {
                req_id,
                kind,
                message,
                detail,
            }) => {
                if let Some(cached) = cache.get(req_id) {
                    debug!(req_id, "duplicate request, resending cached response");
                    return Ok(cached.to_vec());
                }
                warn!(req_id, kind = %kind, "rejected request: {}", detail);
                let envelope = ResponseEnvelope::error(req_id, ErrorCode::InvalidArgument, message);
                (req_id, kind, envelope)
            }
        };

        let bytes = encode(&envelope)?;
        cache.insert(req_id, bytes.clone());

        info!(
            req_id,
            kind = %kind,
            code = ?envelope.result.code,
            dur_ms = started.elapsed().as_secs_f64() * 1000.0,
            "request handled"
        );

        Ok(bytes)
    }

    async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let req_id = request.req_id;
        let result = match request.body {
            RequestBody::Login {
                provider,
                id_token,
                device_id,
            } => self
                .handler
                .login(&provider, id_token.as_deref(), device_id.as_deref())
                .await
                .map(|outcome| ResponseBody::Login {
                    user_id: outcome.account.id.to_string(),
                    display_name: outcome.account.display_name_or_default().to_string(),
                    access_token: outcome.access.token,
                    refresh_token: outcome.refresh_token,
                    expires_in: outcome.access.expires_in,
                }),
            RequestBody::Refresh { refresh_token } => self
                .handler
                .refresh(&refresh_token)
                .await
                .map(|outcome| ResponseBody::Refresh {
                    access_token: outcome.access.token,
                    refresh_token: outcome.refresh_token,
                    expires_in: outcome.access.expires_in,
                }),
            RequestBody::Logout { refresh_token } => self
                .handler
                .logout(&refresh_token)
                .await
                .map(|_| ResponseBody::Logout {}),
        };

        match result {
            Ok(body) => ResponseEnvelope::ok(req_id, body),
            Err(e) => {
                if e.wire_code() == ErrorCode::Internal {
                    error!(req_id, "request failed: {}", e);
                } else {
                    debug!(req_id, "request refused: {}", e);
                }
                ResponseEnvelope::error(req_id, e.wire_code(), e.public_message())
            }
        }
    }
}

fn encode(envelope: &ResponseEnvelope) -> Result<Vec<u8>, FrameError> {
    encode_response(envelope).map_err(|e| {
        FrameError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("failed to encode response: {}", e),
        ))
    })
}

/// TCP listener for the session protocol
pub struct SessionServer {
    listener: TcpListener,
    service: SessionService,
}

impl SessionServer {
    /// Bind the listener. Fails if the address is unavailable.
    pub async fn bind(addr: &str, service: SessionService) -> AuthResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::Config(format!("Failed to bind session listener {}: {}", addr, e)))?;

        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> AuthResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task each
    pub async fn run(self) -> AuthResult<()> {
        info!("Session server listening on {}", self.local_addr()?);

        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };

            if let Err(e) = socket.set_nodelay(true) {
                debug!("failed to set TCP_NODELAY for {}: {}", peer, e);
            }

            let service = self.service.clone();
            let conn_id = CONN_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            let span = info_span!("session", conn_id, peer = %peer);

            tokio::spawn(
                async move {
                    info!("connection accepted");
                    match service.serve(socket).await {
                        Ok(()) => info!("connection closed"),
                        Err(e) => warn!("connection closed: {}", e),
                    }
                }
                .instrument(span),
            );
        }
    }
}
