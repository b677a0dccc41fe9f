use async_trait::async_trait;
use authguard_admin::SharedStateType;
use authguard_rate_limit::{GuardOutcome, Rejection};
use bytes::Bytes;
use pingora_core::prelude::*;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};
use std::net::IpAddr;
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::upstream::UpstreamSelector;

/// Reverse proxy that runs every request through the auth endpoint limiter
/// before forwarding it to the auth service.
pub struct AuthGuardProxy {
    pub state: SharedStateType,
    pub upstream: UpstreamSelector,
}

impl AuthGuardProxy {
    pub fn new(state: SharedStateType) -> Self {
        let upstream = UpstreamSelector::from_config(&state.config.upstream);
        info!(
            upstream = %upstream.name,
            servers = upstream.server_count(),
            "upstream configured"
        );

        if state.config.auth_limit.enabled {
            info!(
                policies = state.limiter.registry().len(),
                "auth endpoint limiter enabled"
            );
        } else {
            info!("auth endpoint limiter disabled, forwarding all requests");
        }

        Self { state, upstream }
    }

    /// Run the limiter for the current request.
    fn guard(&self, session: &Session, ctx: &RequestContext) -> GuardOutcome {
        if !self.state.config.auth_limit.enabled {
            return GuardOutcome::Bypass;
        }

        let peer: Option<IpAddr> = session
            .client_addr()
            .and_then(|addr| addr.as_inet())
            .map(|addr| addr.ip());

        self.state.limiter.check(
            &ctx.method,
            &ctx.path,
            &session.req_header().headers,
            peer,
        )
    }
}

/// Write a composed 429 to the client and finish the response.
async fn write_rejection(session: &mut Session, rejection: &Rejection) -> Result<()> {
    let body = Bytes::from(rejection.body_bytes());

    let mut resp = ResponseHeader::build(rejection.status, Some(rejection.headers.len() + 1))?;
    for (name, value) in &rejection.headers {
        resp.insert_header(*name, value.as_str())?;
    }
    resp.insert_header("Content-Length", body.len().to_string())?;

    session.set_keepalive(None);
    session
        .write_response_header(Box::new(resp), false)
        .await?;
    session.write_response_body(Some(body), true).await?;
    Ok(())
}

#[async_trait]
impl ProxyHttp for AuthGuardProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        self.state.metrics.requests_total.inc();

        let header = session.req_header();
        ctx.method = header.method.as_str().to_string();
        ctx.path = header.uri.path().to_string();

        let outcome = self.guard(session, ctx);
        self.state.observe(&outcome);
        ctx.endpoint = outcome.endpoint().map(str::to_string);

        match outcome {
            GuardOutcome::Rejected { rejection, .. } => {
                ctx.rate_limited = true;
                ctx.response_status = rejection.status.as_u16();
                write_rejection(session, &rejection).await?;
                Ok(true)
            }
            GuardOutcome::Admitted { remaining, .. } => {
                debug!(path = %ctx.path, remaining, "auth attempt admitted");
                Ok(false)
            }
            GuardOutcome::Bypass => Ok(false),
        }
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let addr = self
            .upstream
            .select()
            .ok_or_else(|| Error::new(ErrorType::ConnectProxyFailure))?;

        debug!(upstream = %self.upstream.name, addr, "selected upstream peer");

        let peer = HttpPeer::new(addr, self.upstream.tls, self.upstream.sni.clone());
        Ok(Box::new(peer))
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        ctx.response_status = upstream_response.status.as_u16();
        Ok(())
    }

    async fn logging(&self, _session: &mut Session, _error: Option<&pingora_core::Error>, ctx: &mut Self::CTX) {
        let duration = ctx.request_start.elapsed();

        self.state
            .metrics
            .request_duration
            .with_label_values(&[ctx.response_status.to_string().as_str()])
            .observe(duration.as_secs_f64());

        info!(
            method = %ctx.method,
            path = %ctx.path,
            status = ctx.response_status,
            duration_ms = duration.as_millis() as u64,
            endpoint = ?ctx.endpoint,
            rate_limited = ctx.rate_limited,
            "request completed"
        );
    }
}
